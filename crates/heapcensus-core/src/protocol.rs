//! Stdout readiness protocol.
//!
//! Line order: banner, plan, phase progress, summary, optional allocator
//! statistics, then the sentinel block with the capture command. After the
//! sentinel the process only sleeps.

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use crate::census::CensusKey;
use crate::verify::{CensusVerdict, Expectation};

pub const RULE: &str = "============================================================";

/// Line an operator (or script) waits for before capturing the core.
pub const READY_SENTINEL: &str = ">>> READY FOR GCORE <<<";

pub const OK_LINE: &str = "[OK] All counts match expected values!";
pub const MISMATCH_LINE: &str = "[ERROR] Count mismatch detected!";

#[must_use]
pub fn render_banner(title: &str, pid: u32) -> String {
    format!("{RULE}\n{title} - PID: {pid}\n{RULE}\n")
}

#[must_use]
pub fn render_plan(heading: &str, expected: &[Expectation]) -> String {
    let mut out = format!("\n{heading}\n");
    for e in expected {
        out.push_str(&format!("  - {} {}\n", e.expected, e.key));
    }
    out
}

#[must_use]
pub fn render_phase(index: usize, title: &str) -> String {
    format!("\n[Phase {index}] {title}...\n")
}

#[must_use]
pub fn render_progress(done: usize, total: usize) -> String {
    format!("  Progress: {done}/{total}\n")
}

#[must_use]
pub fn render_summary(verdict: &CensusVerdict) -> String {
    let mut out = String::from("\nFinal allocation counts:\n");
    for check in &verdict.checks {
        out.push_str(&format!(
            "  {}: {} (expected: {})\n",
            check.key, check.achieved, check.expected
        ));
    }
    if verdict.duplicates > 0 {
        out.push_str(&format!("  duplicate addresses: {}\n", verdict.duplicates));
    }
    out.push('\n');
    out.push_str(if verdict.passed() { OK_LINE } else { MISMATCH_LINE });
    out.push('\n');
    out
}

/// Address listing for one bucket (used for large blocks).
#[must_use]
pub fn render_addresses(key: &CensusKey, addresses: &[usize]) -> String {
    let mut out = format!("  {key} addresses ({} blocks):\n", addresses.len());
    for (i, addr) in addresses.iter().enumerate() {
        out.push_str(&format!("    [{i}] {addr:#x}\n"));
    }
    out
}

#[must_use]
pub fn render_ready(pid: u32) -> String {
    format!(
        "\n{RULE}\n{READY_SENTINEL}\ngcore {pid}\n{RULE}\n\n\
         Waiting for coredump generation...\n\
         Press Ctrl+C to exit after gcore is done.\n"
    )
}

/// Write a protocol fragment to stdout and flush, so a reader piping the
/// output sees the sentinel before the process goes to sleep.
pub fn emit(text: &str) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()
}

/// Sleep until killed. Nothing is ever released.
pub fn hold_forever() -> ! {
    loop {
        thread::sleep(Duration::from_secs(3600));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::ClassCheck;

    #[test]
    fn rule_is_sixty_wide() {
        assert_eq!(RULE.len(), 60);
        assert!(RULE.chars().all(|c| c == '='));
    }

    #[test]
    fn banner_names_pid() {
        let banner = render_banner("Basic Malloc Test", 4242);
        assert_eq!(banner.lines().nth(1), Some("Basic Malloc Test - PID: 4242"));
    }

    #[test]
    fn plan_lists_every_expectation() {
        let text = render_plan(
            "Target allocations:",
            &[
                Expectation::new(CensusKey::block(16), 80_000),
                Expectation::new(CensusKey::object("Dog", 24), 10_000),
            ],
        );
        assert!(text.contains("  - 80000 malloc(16)\n"));
        assert!(text.contains("  - 10000 Dog (24 bytes)\n"));
    }

    #[test]
    fn summary_ends_with_verdict_line() {
        let mut verdict = CensusVerdict {
            checks: vec![ClassCheck {
                key: CensusKey::block(32),
                expected: 3,
                achieved: 3,
                passed: true,
            }],
            duplicates: 0,
        };
        let ok = render_summary(&verdict);
        assert!(ok.contains("  malloc(32): 3 (expected: 3)\n"));
        assert!(ok.trim_end().ends_with(OK_LINE));

        verdict.checks[0].achieved = 2;
        verdict.checks[0].passed = false;
        assert!(render_summary(&verdict).trim_end().ends_with(MISMATCH_LINE));
    }

    #[test]
    fn sentinel_precedes_gcore_hint() {
        let text = render_ready(77);
        let lines: Vec<&str> = text.lines().collect();
        let at = lines.iter().position(|l| *l == READY_SENTINEL).unwrap();
        assert_eq!(lines[at + 1], "gcore 77");
    }

    #[test]
    fn addresses_are_hex_indexed() {
        let text = render_addresses(&CensusKey::block(1024 * 1024), &[0x7f00_0000_1000]);
        assert!(text.starts_with("  malloc(1MB) addresses (1 blocks):\n"));
        assert!(text.contains("    [0] 0x7f0000001000\n"));
    }
}
