//! Tooling around the fixture suite.
//!
//! This crate provides:
//! - Plans: the expectation report of any cataloged scenario, without running it
//! - Analyzer validation: compare an analyzer's per-type result against a report
//! - Log validation: schema checks for structured fixture logs

#![forbid(unsafe_code)]

pub mod validate;

pub use validate::{
    AnalysisItem, AnalysisResult, DEFAULT_TOLERANCE, KeyVerdict, ValidateError, ValidationReport,
    validate_analysis,
};
