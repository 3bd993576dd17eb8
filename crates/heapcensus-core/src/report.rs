//! Machine-checkable expectation report.
//!
//! Written as pretty JSON before the ready sentinel when a report path is
//! configured. The harness compares it with analyzer output.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::census::CensusKey;
use crate::error::Result;
use crate::introspect::Capabilities;
use crate::structured_log::now_utc;
use crate::verify::{CensusVerdict, Expectation};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportClass {
    pub key: CensusKey,
    /// Human label, e.g. `malloc(2MB)`.
    pub label: String,
    pub expected: usize,
    /// `None` for a plan-only report that was never run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achieved: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectationReport {
    pub schema_version: u32,
    pub fixture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub generated_utc: String,
    #[serde(default)]
    pub capabilities: Capabilities,
    pub classes: Vec<ReportClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
}

impl ExpectationReport {
    /// Report for a completed run.
    #[must_use]
    pub fn from_verdict(
        fixture: &str,
        pid: u32,
        capabilities: Capabilities,
        verdict: &CensusVerdict,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            fixture: fixture.to_string(),
            pid: Some(pid),
            generated_utc: now_utc(),
            capabilities,
            classes: verdict
                .checks
                .iter()
                .map(|c| ReportClass {
                    label: c.key.to_string(),
                    key: c.key.clone(),
                    expected: c.expected,
                    achieved: Some(c.achieved),
                })
                .collect(),
            passed: Some(verdict.passed()),
        }
    }

    /// Expectations only, without running anything.
    #[must_use]
    pub fn plan_only(fixture: &str, expected: &[Expectation]) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            fixture: fixture.to_string(),
            pid: None,
            generated_utc: now_utc(),
            capabilities: Capabilities::default(),
            classes: expected
                .iter()
                .map(|e| ReportClass {
                    label: e.key.to_string(),
                    key: e.key.clone(),
                    expected: e.expected,
                    achieved: None,
                })
                .collect(),
            passed: None,
        }
    }

    /// Expectations carried by this report.
    #[must_use]
    pub fn expectations(&self) -> Vec<Expectation> {
        self.classes
            .iter()
            .map(|c| Expectation::new(c.key.clone(), c.expected))
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::ClassCheck;

    fn verdict() -> CensusVerdict {
        CensusVerdict {
            checks: vec![
                ClassCheck {
                    key: CensusKey::block(2 * 1024 * 1024),
                    expected: 100,
                    achieved: 100,
                    passed: true,
                },
                ClassCheck {
                    key: CensusKey::object("Cat", 16),
                    expected: 5,
                    achieved: 4,
                    passed: false,
                },
            ],
            duplicates: 0,
        }
    }

    #[test]
    fn verdict_report_records_counts() {
        let report = ExpectationReport::from_verdict("vtable_types", 99, Capabilities::default(), &verdict());
        assert_eq!(report.passed, Some(false));
        assert_eq!(report.classes[0].label, "malloc(2MB)");
        assert_eq!(report.classes[1].achieved, Some(4));
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["schema_version"], 1);
        assert_eq!(json["classes"][1]["key"]["kind"], "object");
        assert_eq!(json["classes"][1]["key"]["type_name"], "Cat");
    }

    #[test]
    fn plan_only_omits_run_fields() {
        let report = ExpectationReport::plan_only(
            "basic_malloc",
            &[Expectation::new(CensusKey::block(16), 80_000)],
        );
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert!(json.get("pid").is_none());
        assert!(json.get("passed").is_none());
        assert!(json["classes"][0].get("achieved").is_none());
        assert_eq!(report.expectations()[0].expected, 80_000);
    }

    #[test]
    fn report_survives_disk() {
        let path = std::env::temp_dir().join(format!("heapcensus-report-{}.json", std::process::id()));
        let report = ExpectationReport::from_verdict("x", 1, Capabilities::default(), &verdict());
        report.write_to(&path).unwrap();
        assert_eq!(ExpectationReport::read_from(&path).unwrap(), report);
        let _ = std::fs::remove_file(&path);
    }
}
