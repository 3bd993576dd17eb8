//! Environment-driven run configuration.
//!
//! Fixtures take no arguments; everything tunable comes from the environment
//! and is read once at startup:
//! - `HEAPCENSUS_JOIN`: `join|blocking` or `idle|detach|park`. Unset or
//!   unrecognized keeps the fixture's own default.
//! - `HEAPCENSUS_WORKERS`: churn worker count (default 8, at least 1).
//! - `HEAPCENSUS_SEED`: partition seed, decimal or `0x` hex.
//! - `HEAPCENSUS_LOG`: path of the structured JSONL log.
//! - `HEAPCENSUS_REPORT`: path of the JSON expectation report.
//! - `HEAPCENSUS_MI_STATS`: `1|true|yes|on` also dumps mimalloc's own
//!   statistics to stderr on fixtures that print allocator statistics.

use std::path::PathBuf;

use crate::churn::JoinPolicy;

pub const ENV_JOIN: &str = "HEAPCENSUS_JOIN";
pub const ENV_WORKERS: &str = "HEAPCENSUS_WORKERS";
pub const ENV_SEED: &str = "HEAPCENSUS_SEED";
pub const ENV_LOG: &str = "HEAPCENSUS_LOG";
pub const ENV_REPORT: &str = "HEAPCENSUS_REPORT";
pub const ENV_MI_STATS: &str = "HEAPCENSUS_MI_STATS";

pub const DEFAULT_WORKERS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CensusConfig {
    pub workers: usize,
    /// `None` lets the fixture pick its default.
    pub join_policy: Option<JoinPolicy>,
    /// `None` means draw a seed from entropy.
    pub seed: Option<u64>,
    pub log_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
    /// Off unless asked for: `mi_stats_print` writes straight to stderr.
    pub mimalloc_stats: bool,
}

impl Default for CensusConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            join_policy: None,
            seed: None,
            log_path: None,
            report_path: None,
            mimalloc_stats: false,
        }
    }
}

impl CensusConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Malformed values fall back to the
    /// defaults rather than failing the run.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            workers: non_empty(ENV_WORKERS)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .map_or(DEFAULT_WORKERS, |n| n.max(1)),
            join_policy: non_empty(ENV_JOIN).and_then(|v| JoinPolicy::from_str_loose(&v)),
            seed: non_empty(ENV_SEED).and_then(|v| parse_seed(&v)),
            log_path: non_empty(ENV_LOG).map(PathBuf::from),
            report_path: non_empty(ENV_REPORT).map(PathBuf::from),
            mimalloc_stats: non_empty(ENV_MI_STATS).is_some_and(|v| parse_flag(&v)),
        }
    }

    #[must_use]
    pub fn join_policy_or(&self, fallback: JoinPolicy) -> JoinPolicy {
        self.join_policy.unwrap_or(fallback)
    }

    /// Configured seed, or a fresh random one.
    #[must_use]
    pub fn seed_or_random(&self) -> u64 {
        self.seed.unwrap_or_else(rand::random)
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Decimal or `0x`-prefixed hexadecimal.
#[must_use]
pub fn parse_seed(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(CensusConfig::from_lookup(|_| None), CensusConfig::default());
    }

    #[test]
    fn every_variable_is_honored() {
        let config = CensusConfig::from_lookup(lookup(&[
            (ENV_JOIN, "Blocking"),
            (ENV_WORKERS, "3"),
            (ENV_SEED, "0xdeadBEEF"),
            (ENV_LOG, "/tmp/run.jsonl"),
            (ENV_REPORT, "/tmp/report.json"),
            (ENV_MI_STATS, "On"),
        ]));
        assert_eq!(config.workers, 3);
        assert_eq!(config.join_policy, Some(JoinPolicy::Join));
        assert_eq!(config.seed, Some(0xdead_beef));
        assert_eq!(config.log_path, Some(PathBuf::from("/tmp/run.jsonl")));
        assert_eq!(config.report_path, Some(PathBuf::from("/tmp/report.json")));
        assert!(config.mimalloc_stats);
    }

    #[test]
    fn malformed_values_fall_back() {
        let config = CensusConfig::from_lookup(lookup(&[
            (ENV_JOIN, "sometimes"),
            (ENV_WORKERS, "many"),
            (ENV_SEED, "0xZZ"),
            (ENV_LOG, "   "),
            (ENV_MI_STATS, "verbose"),
        ]));
        assert_eq!(config, CensusConfig::default());
        assert_eq!(config.join_policy_or(JoinPolicy::Idle), JoinPolicy::Idle);
    }

    #[test]
    fn zero_workers_clamps_to_one() {
        let config = CensusConfig::from_lookup(lookup(&[(ENV_WORKERS, "0")]));
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn seeds_parse_in_both_radixes() {
        assert_eq!(parse_seed("42"), Some(42));
        assert_eq!(parse_seed(" 0X10 "), Some(16));
        assert_eq!(parse_seed("-1"), None);
        assert_eq!(parse_seed("18446744073709551615"), Some(u64::MAX));
    }
}
