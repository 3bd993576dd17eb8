//! Shared fixture lifecycle.
//!
//! Every fixture binary hands its population phases to [`run_fixture`],
//! which prints the banner and plan, runs the phases, verifies the census,
//! writes the optional report and log, prints the readiness sentinel, and
//! then holds everything alive until the process is killed.

use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::json;

use heapcensus_core::churn::SilentObserver;
use heapcensus_core::introspect::AllocatorProbe;
use heapcensus_core::object::{grouped_key, object_key};
use heapcensus_core::protocol;
use heapcensus_core::structured_log::{LogEmitter, LogLevel, Outcome};
use heapcensus_core::verify::verify;
use heapcensus_core::{
    CensusConfig, CensusError, CensusKey, CensusVerdict, ChurnObserver, ExpectationReport,
    GroupLayout, PopulationGenerator, Result, RetainedCollection, SizeClass, SystemMalloc,
    TypedObject, WorkerReport,
};

use crate::scenarios::{self, Scenario};

/// Shared handle to the run's structured log.
pub type SharedLog = Arc<Mutex<LogEmitter>>;

pub struct FixtureRun {
    scenario: &'static Scenario,
    config: CensusConfig,
    pid: u32,
    allocator: Arc<SystemMalloc>,
    retained: Arc<RetainedCollection>,
    log: SharedLog,
    phase: usize,
}

impl FixtureRun {
    /// Look up `name` in the catalog and open the configured log sink.
    pub fn new(name: &str, config: CensusConfig) -> Result<Self> {
        let scenario =
            scenarios::find(name).ok_or_else(|| CensusError::UnknownScenario(name.to_string()))?;
        let pid = std::process::id();
        let log = match &config.log_path {
            Some(path) => LogEmitter::to_file(path, scenario.name, &pid.to_string())?,
            None => LogEmitter::disabled(scenario.name),
        };
        Ok(Self::with_log(scenario, config, log))
    }

    /// Run with an explicit log sink.
    #[must_use]
    pub fn with_log(scenario: &'static Scenario, config: CensusConfig, log: LogEmitter) -> Self {
        Self {
            scenario,
            config,
            pid: std::process::id(),
            allocator: Arc::new(SystemMalloc),
            retained: Arc::new(RetainedCollection::new()),
            log: Arc::new(Mutex::new(log)),
            phase: 0,
        }
    }

    #[must_use]
    pub fn scenario(&self) -> &'static Scenario {
        self.scenario
    }

    #[must_use]
    pub fn config(&self) -> &CensusConfig {
        &self.config
    }

    #[must_use]
    pub fn allocator(&self) -> &Arc<SystemMalloc> {
        &self.allocator
    }

    #[must_use]
    pub fn retained(&self) -> &Arc<RetainedCollection> {
        &self.retained
    }

    #[must_use]
    pub fn log(&self) -> SharedLog {
        Arc::clone(&self.log)
    }

    /// Banner and allocation plan.
    pub fn announce(&mut self) -> Result<()> {
        let expected = self.scenario.expectations();
        protocol::emit(&protocol::render_banner(self.scenario.title, self.pid))?;
        protocol::emit(&protocol::render_plan("Allocating memory...", &expected))?;
        let mut log = self.log.lock();
        let entry = log.entry(LogLevel::Info, "plan").with_details(json!({
            "pid": self.pid,
            "classes": expected.len(),
            "expected_user_bytes": self.scenario.expected_user_bytes(),
        }));
        log.emit_entry(entry)?;
        Ok(())
    }

    /// Print the next phase header.
    pub fn phase(&mut self, title: &str) -> Result<()> {
        self.phase += 1;
        protocol::emit(&protocol::render_phase(self.phase, title))?;
        Ok(())
    }

    /// Generator over the run's allocator and retained collection, printing
    /// progress every `every` instances.
    #[must_use]
    pub fn generator(&self, every: usize) -> PopulationGenerator<'_, SystemMalloc> {
        PopulationGenerator::new(self.allocator.as_ref(), &self.retained).with_progress_every(every)
    }

    /// `count` instances of `T`, one allocation each, with progress lines.
    pub fn objects<T: TypedObject>(&self, count: usize) -> Result<Vec<NonNull<T>>> {
        let started = Instant::now();
        let mut progress = print_progress;
        let placed = self
            .generator(progress_interval(count))
            .objects::<T>(count, Some(&mut progress))?;
        self.record_class(&object_key::<T>(), started)?;
        Ok(placed)
    }

    /// `count` blocks holding `per_block` instances of `T` each.
    pub fn grouped<T: TypedObject>(
        &self,
        per_block: usize,
        count: usize,
        layout: GroupLayout,
    ) -> Result<Vec<NonNull<T>>> {
        let started = Instant::now();
        let mut progress = print_progress;
        let placed = self.generator(progress_interval(count)).grouped::<T>(
            per_block,
            count,
            layout,
            Some(&mut progress),
        )?;
        self.record_class(&grouped_key::<T>(per_block), started)?;
        Ok(placed)
    }

    /// Raw blocks for every class, interleaved round-robin.
    pub fn blocks(&self, classes: &[SizeClass]) -> Result<usize> {
        let started = Instant::now();
        let rounds = classes.iter().map(SizeClass::target).max().unwrap_or(0);
        let mut progress = print_progress;
        let made = self
            .generator(progress_interval(rounds))
            .interleaved_blocks(classes, Some(&mut progress))?;
        for class in classes {
            self.record_class(&class.key(), started)?;
        }
        Ok(made)
    }

    /// Record that `key` was populated.
    pub fn record_class(&self, key: &CensusKey, started: Instant) -> Result<()> {
        let count = self.retained.count(key);
        let expected = self
            .scenario
            .expectations()
            .iter()
            .find(|e| &e.key == key)
            .map_or(count, |e| e.expected);
        let mut log = self.log.lock();
        let entry = log
            .entry(LogLevel::Debug, "generate_class")
            .with_size_class(key.to_string())
            .with_counts(count, expected)
            .with_latency_ns(elapsed_ns(started));
        log.emit_entry(entry)?;
        Ok(())
    }

    /// Churn observer that writes worker events to this run's log.
    #[must_use]
    pub fn churn_observer(&self) -> Arc<dyn ChurnObserver> {
        if self.log.lock().is_enabled() {
            Arc::new(LoggingObserver {
                log: self.log(),
                started: Instant::now(),
            })
        } else {
            Arc::new(SilentObserver)
        }
    }

    fn record_failure(&self, err: &CensusError) {
        let mut log = self.log.lock();
        let mut entry = log
            .entry(LogLevel::Error, "allocation_failure")
            .with_outcome(Outcome::Error)
            .with_details(json!({ "error": err.to_string() }));
        if let CensusError::AllocationFailure { key, .. } = err {
            entry = entry.with_size_class(key.to_string());
        }
        // The original error is what the caller sees.
        let _ = log.emit_entry(entry);
        let _ = log.flush();
    }

    /// Verify, print the summary and optional statistics, write the report,
    /// and print the sentinel. Returns the verdict.
    pub fn finish(&mut self) -> Result<CensusVerdict> {
        let expected = self.scenario.expectations();
        let verdict = verify(&expected, &self.retained);
        protocol::emit(&protocol::render_summary(&verdict))?;

        let probe = if self.scenario.allocator_stats {
            AllocatorProbe::detect()
        } else {
            AllocatorProbe::none()
        };
        if self.scenario.allocator_stats {
            protocol::emit(&probe.render(self.scenario.expected_user_bytes()))?;
            if self.config.mimalloc_stats {
                probe.dump_mimalloc_stats();
            }
        }

        if let Some(path) = &self.config.report_path {
            ExpectationReport::from_verdict(self.scenario.name, self.pid, probe.capabilities(), &verdict)
                .write_to(path)?;
        }

        {
            let mut log = self.log.lock();
            for check in &verdict.checks {
                let outcome = if check.passed { Outcome::Pass } else { Outcome::Fail };
                let entry = log
                    .entry(LogLevel::Info, "verify")
                    .with_size_class(check.key.to_string())
                    .with_counts(check.achieved, check.expected)
                    .with_outcome(outcome);
                log.emit_entry(entry)?;
            }
            let entry = log
                .entry(LogLevel::Info, "ready")
                .with_outcome(if verdict.passed() { Outcome::Pass } else { Outcome::Fail })
                .with_details(json!({
                    "pid": self.pid,
                    "retained": self.retained.total(),
                    "duplicates": verdict.duplicates,
                }));
            log.emit_entry(entry)?;
            log.flush()?;
        }

        protocol::emit(&protocol::render_ready(self.pid))?;
        Ok(verdict)
    }
}

/// Progress printer for [`PopulationGenerator`] callbacks.
pub fn print_progress(done: usize, total: usize) {
    // Progress lines are advisory; a closed stdout surfaces at the sentinel.
    let _ = protocol::emit(&protocol::render_progress(done, total));
}

/// Four progress lines per phase.
fn progress_interval(count: usize) -> usize {
    (count / 4).max(1)
}

fn elapsed_ns(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

struct LoggingObserver {
    log: SharedLog,
    started: Instant,
}

impl ChurnObserver for LoggingObserver {
    fn on_worker_start(&self, worker: usize, tasks: &[heapcensus_core::AllocationTask]) {
        let mut log = self.log.lock();
        let entry = log
            .entry(LogLevel::Debug, "worker_start")
            .with_worker(worker)
            .with_details(json!({
                "tasks": tasks.iter().map(|t| json!({ "size": t.size, "share": t.share })).collect::<Vec<_>>(),
            }));
        let _ = log.emit_entry(entry);
    }

    fn on_worker_published(&self, report: &WorkerReport) {
        let mut log = self.log.lock();
        let entry = log
            .entry(LogLevel::Info, "worker_published")
            .with_worker(report.worker)
            .with_counts(report.published, report.published)
            .with_latency_ns(elapsed_ns(self.started))
            .with_details(json!({
                "operations": report.operations,
                "allocations": report.allocations,
                "frees": report.frees,
                "corrections": report.corrections,
            }));
        let _ = log.emit_entry(entry);
    }
}

/// Fixture entry point: announce, run `body`, finish, then sleep forever
/// holding whatever `body` returned.
///
/// An error from `body` is logged as `allocation_failure` and returned, so
/// `main` exits non-zero before the sentinel.
pub fn run_fixture<H, F>(name: &str, body: F) -> Result<()>
where
    F: FnOnce(&mut FixtureRun) -> Result<H>,
{
    let mut run = FixtureRun::new(name, CensusConfig::from_env())?;
    run.announce()?;
    let _held = match body(&mut run) {
        Ok(held) => held,
        Err(err) => {
            run.record_failure(&err);
            return Err(err);
        }
    };
    run.finish()?;
    protocol::hold_forever()
}
