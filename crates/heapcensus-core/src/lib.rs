//! Deterministic memory-population engine for coredump analyzer fixtures.
//!
//! This crate provides:
//! - Population generation: exact counts of raw blocks and in-place typed objects
//! - Churn scheduling: randomized concurrent alloc/free traffic that converges
//!   to an exact per-size census
//! - Retained collection: process-scoped ownership of every census address
//! - Verification: achieved-vs-expected census checks
//! - Allocator introspection: optional, runtime-probed allocator statistics
//! - Reporting: the stdout readiness protocol and a JSON expectation report

pub mod alloc;
pub mod census;
pub mod churn;
pub mod config;
pub mod error;
pub mod introspect;
pub mod object;
pub mod population;
pub mod protocol;
pub mod report;
pub mod retained;
pub mod size_class;
pub mod structured_log;
pub mod verify;

pub use alloc::{CountingMalloc, RawAllocator, SystemMalloc};
pub use census::CensusKey;
pub use churn::{
    AllocationTask, ChurnObserver, ChurnScheduler, ChurnWorker, JoinPolicy, SizeState,
    WorkerPhase, WorkerReport,
};
pub use config::CensusConfig;
pub use error::{CensusError, Result};
pub use introspect::{AllocatorProbe, Capabilities};
pub use object::TypedObject;
pub use population::{FillPolicy, GroupLayout, PopulationGenerator};
pub use report::ExpectationReport;
pub use retained::RetainedCollection;
pub use size_class::SizeClass;
pub use verify::{CensusVerdict, ClassCheck, Expectation};
