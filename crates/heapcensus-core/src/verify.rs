//! Achieved-vs-expected census checks.

use serde::{Deserialize, Serialize};

use crate::census::CensusKey;
use crate::retained::RetainedCollection;
use crate::size_class::SizeClass;

/// Expected number of allocations for one census key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    pub key: CensusKey,
    pub expected: usize,
}

impl Expectation {
    #[must_use]
    pub fn new(key: CensusKey, expected: usize) -> Self {
        Self { key, expected }
    }

    #[must_use]
    pub fn for_class(class: &SizeClass) -> Self {
        Self::new(class.key(), class.target())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCheck {
    pub key: CensusKey,
    pub expected: usize,
    pub achieved: usize,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensusVerdict {
    pub checks: Vec<ClassCheck>,
    /// Addresses retained more than once across all buckets.
    pub duplicates: usize,
}

impl CensusVerdict {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.duplicates == 0 && self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ClassCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

/// Compare every expectation with the retained collection. Read-only.
#[must_use]
pub fn verify(expected: &[Expectation], retained: &RetainedCollection) -> CensusVerdict {
    let counts = retained.counts();
    let checks = expected
        .iter()
        .map(|e| {
            let achieved = counts.get(&e.key).copied().unwrap_or(0);
            ClassCheck {
                key: e.key.clone(),
                expected: e.expected,
                achieved,
                passed: achieved == e.expected,
            }
        })
        .collect();
    CensusVerdict {
        checks,
        duplicates: retained.duplicate_addresses(),
    }
}
