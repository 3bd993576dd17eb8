//! Error taxonomy for census runs.
//!
//! Count mismatches are not errors: they surface as failed checks in a
//! [`CensusVerdict`](crate::verify::CensusVerdict). A missing allocator
//! introspection API is not an error either; it is an absent capability.

use thiserror::Error;

use crate::census::CensusKey;

#[derive(Debug, Error)]
pub enum CensusError {
    #[error("allocation of {size} bytes failed for {key}")]
    AllocationFailure { size: usize, key: CensusKey },
    #[error("size class must have a non-zero byte size")]
    InvalidSizeClass,
    #[error("{type_name} cannot be placed in a malloc block (size {size}, align {align})")]
    InvalidLayout {
        type_name: &'static str,
        size: usize,
        align: usize,
    },
    #[error("group of {per_block} instances does not fit one malloc block")]
    InvalidGroup { per_block: usize },
    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),
    #[error("churn worker {worker} panicked")]
    WorkerPanicked { worker: usize },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CensusError>;
