//! Compare an analyzer's per-type result with a fixture's expectation report.
//!
//! Raw blocks are matched by untyped `(weak) malloc(..)` rows whose average
//! size equals the block size. Typed keys are matched by substring on the
//! analyzer's type column, summed over every census key of the same type.
//! A key passes when the recovered amount reaches `floor(expected × tolerance)`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use heapcensus_core::{CensusError, CensusKey, ExpectationReport};

pub const DEFAULT_TOLERANCE: f64 = 0.95;

/// Prefix the analyzer gives to allocations it could not type.
const UNTYPED_PREFIX: &str = "(weak) malloc(";

#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("analysis result has no 'items' array")]
    MissingItems,
    #[error("tolerance must be in (0, 1], got {0}")]
    BadTolerance(f64),
    #[error(transparent)]
    Census(#[from] CensusError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisItem {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub amount: u64,
    #[serde(default)]
    pub avg_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub items: Vec<AnalysisItem>,
    #[serde(default)]
    pub summary: serde_json::Value,
}

impl AnalysisResult {
    pub fn from_json(text: &str) -> Result<Self, ValidateError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if !value.get("items").is_some_and(serde_json::Value::is_array) {
            return Err(ValidateError::MissingItems);
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn read_from(path: &Path) -> Result<Self, ValidateError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    fn untyped_amount(&self, size: usize) -> u64 {
        self.items
            .iter()
            .filter(|i| {
                i.type_name.starts_with(UNTYPED_PREFIX)
                    && !i.type_name.contains('{')
                    && i.avg_size == size as u64
            })
            .map(|i| i.amount)
            .sum()
    }

    fn typed_amount(&self, type_name: &str) -> u64 {
        self.items
            .iter()
            .filter(|i| i.type_name.contains(type_name))
            .map(|i| i.amount)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyVerdict {
    pub label: String,
    pub expected: u64,
    pub threshold: u64,
    pub actual: u64,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub fixture: String,
    pub tolerance: f64,
    pub checks: Vec<KeyVerdict>,
    pub passed: bool,
}

impl ValidationReport {
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!(
            "Analyzer validation for {} (tolerance {:.2})\n",
            self.fixture, self.tolerance
        );
        for check in &self.checks {
            out.push_str(&format!(
                "  [{}] {}: {} (expected ~{}, need >= {})\n",
                if check.passed { "PASS" } else { "FAIL" },
                check.label,
                check.actual,
                check.expected,
                check.threshold
            ));
        }
        out.push_str(if self.passed {
            "All checks passed\n"
        } else {
            "Some checks failed\n"
        });
        out
    }
}

fn threshold(expected: u64, tolerance: f64) -> u64 {
    (expected as f64 * tolerance).floor() as u64
}

fn verdict(label: String, expected: u64, actual: u64, tolerance: f64) -> KeyVerdict {
    let threshold = threshold(expected, tolerance);
    KeyVerdict {
        label,
        expected,
        threshold,
        actual,
        passed: actual >= threshold,
    }
}

/// Check every key of `report` against `analysis`.
pub fn validate_analysis(
    report: &ExpectationReport,
    analysis: &AnalysisResult,
    tolerance: f64,
) -> Result<ValidationReport, ValidateError> {
    if !(tolerance > 0.0 && tolerance <= 1.0) {
        return Err(ValidateError::BadTolerance(tolerance));
    }

    let mut checks = Vec::new();
    let mut typed: BTreeMap<String, u64> = BTreeMap::new();
    for expectation in report.expectations() {
        match &expectation.key {
            CensusKey::Block { size } => checks.push(verdict(
                expectation.key.to_string(),
                expectation.expected as u64,
                analysis.untyped_amount(*size),
                tolerance,
            )),
            key => {
                if let Some(name) = key.type_name() {
                    *typed.entry(name.to_string()).or_default() += expectation.expected as u64;
                }
            }
        }
    }
    for (name, expected) in typed {
        let actual = analysis.typed_amount(&name);
        checks.push(verdict(name, expected, actual, tolerance));
    }

    let passed = checks.iter().all(|c| c.passed);
    Ok(ValidationReport {
        fixture: report.fixture.clone(),
        tolerance,
        checks,
        passed,
    })
}
