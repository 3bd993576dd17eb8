//! Typed fixture objects and the binaries that lay them out in the heap.
//!
//! Each binary under `src/bin` populates one scenario from
//! [`scenarios::CATALOG`], verifies the census, prints the readiness
//! sentinel, and then sleeps so a core can be captured.

pub mod dispatch;
pub mod driver;
pub mod objects;
pub mod scenarios;

pub use driver::{FixtureRun, run_fixture};
pub use scenarios::{CATALOG, Scenario};
