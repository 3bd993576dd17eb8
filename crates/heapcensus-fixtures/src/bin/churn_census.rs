//! Concurrent alloc/free churn that converges to an exact per-size census.
//!
//! Workers default to idling after they publish (their threads stay alive in
//! the core); `HEAPCENSUS_JOIN=join` joins them instead.

use std::sync::Arc;

use heapcensus_core::protocol;
use heapcensus_core::size_class::MIB;
use heapcensus_core::{ChurnScheduler, JoinPolicy, Result};
use heapcensus_fixtures::run_fixture;
use heapcensus_fixtures::scenarios::{self, CHURN_BLOCKS};

fn main() -> Result<()> {
    run_fixture("churn_census", |run| {
        let config = run.config().clone();
        let policy = config.join_policy_or(JoinPolicy::Idle);
        let seed = config.seed_or_random();
        let classes = scenarios::classes(&CHURN_BLOCKS)?;
        let scheduler = ChurnScheduler::new(Arc::clone(run.allocator()), config.workers, policy, seed);

        run.phase(&format!(
            "Churning with {} workers (policy: {}, seed: {seed:#x})",
            scheduler.workers(),
            policy.as_str()
        ))?;
        let started = std::time::Instant::now();
        let reports = scheduler.run(&classes, Arc::clone(run.retained()), run.churn_observer())?;
        for report in &reports {
            protocol::emit(&format!(
                "  Worker {}: {} ops, {} allocs, {} frees, {} corrections, {} retained\n",
                report.worker,
                report.operations,
                report.allocations,
                report.frees,
                report.corrections,
                report.published
            ))?;
        }
        for class in &classes {
            run.record_class(&class.key(), started)?;
        }

        run.phase("Listing large block addresses")?;
        for class in classes.iter().filter(|c| c.size() >= MIB) {
            let key = class.key();
            protocol::emit(&protocol::render_addresses(&key, &run.retained().addresses(&key)))?;
        }
        Ok(scheduler)
    })
}
