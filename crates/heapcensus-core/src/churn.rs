//! Churn scheduler: concurrent randomized allocate/free traffic that still
//! lands on an exact per-size census.
//!
//! Every class total is split into random per-worker shares. Each worker runs
//! a long random walk over its classes, corrects the residue, and hands its
//! blocks to the [`RetainedCollection`] in one locked publish.

#![allow(unsafe_code)]

use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::alloc::RawAllocator;
use crate::census::CensusKey;
use crate::error::{CensusError, Result};
use crate::retained::RetainedCollection;
use crate::size_class::{SizeClass, fill_block, fill_pattern};

/// Interval at which the idle-policy driver polls the completion counter.
pub const COMPLETION_POLL: Duration = Duration::from_millis(100);

/// Per-class headroom used by the convergence test in [`ChurnWorker::step`].
const CONVERGENCE_SLACK: usize = 10;

/// RNG seed for a worker. Fixed so that a given worker walks the same path
/// on every run.
#[must_use]
pub const fn worker_seed(worker: usize) -> u64 {
    (worker as u64)
        .wrapping_mul(12_345)
        .wrapping_add(67_890)
}

/// One worker's share of one size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationTask {
    pub size: usize,
    pub share: usize,
}

/// Split `total` into `workers` random shares that sum exactly to `total`.
///
/// Shares may be zero. Both `total == 0` and `workers == 0` give all-zero
/// shares (an empty vector for zero workers).
pub fn partition_shares<R: Rng + ?Sized>(total: usize, workers: usize, rng: &mut R) -> Vec<usize> {
    if workers == 0 {
        return Vec::new();
    }
    if total == 0 {
        return vec![0; workers];
    }
    let mut cuts = Vec::with_capacity(workers + 1);
    cuts.push(0);
    cuts.push(total);
    for _ in 1..workers {
        cuts.push(rng.gen_range(0..=total));
    }
    cuts.sort_unstable();
    let mut shares: Vec<usize> = cuts.windows(2).map(|w| w[1] - w[0]).collect();
    shares.shuffle(rng);
    shares
}

/// Partition every class across `workers`. Zero shares are not assigned.
pub fn distribute<R: Rng + ?Sized>(
    classes: &[SizeClass],
    workers: usize,
    rng: &mut R,
) -> Vec<Vec<AllocationTask>> {
    let mut plan = vec![Vec::new(); workers];
    for class in classes {
        for (worker, share) in partition_shares(class.target(), workers, rng)
            .into_iter()
            .enumerate()
        {
            if share > 0 {
                plan[worker].push(AllocationTask {
                    size: class.size(),
                    share,
                });
            }
        }
    }
    plan
}

/// Worker-local bookkeeping for one class. The current count is the number
/// of owned addresses, so the two cannot drift apart.
#[derive(Debug, Clone)]
pub struct SizeState {
    size: usize,
    target: usize,
    pattern: u8,
    owned: Vec<usize>,
}

impl SizeState {
    #[must_use]
    pub fn new(task: AllocationTask) -> Self {
        Self {
            size: task.size,
            target: task.share,
            pattern: fill_pattern(task.size),
            owned: Vec::with_capacity(task.share),
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn target(&self) -> usize {
        self.target
    }

    #[must_use]
    pub fn current(&self) -> usize {
        self.owned.len()
    }

    #[must_use]
    pub fn owned(&self) -> &[usize] {
        &self.owned
    }

    fn distance(&self) -> usize {
        self.target.abs_diff(self.current())
    }

    /// Probability of allocating on a free random step: biased toward the
    /// target, never below 0.2 or above 0.8.
    fn alloc_probability(&self) -> f64 {
        let pull = 0.3 * self.distance() as f64 / self.target.max(1) as f64;
        let p = if self.current() < self.target {
            0.5 + pull
        } else {
            0.5 - pull
        };
        p.clamp(0.2, 0.8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    Running,
    Published,
    Idling,
}

/// What a worker did, recorded at publish time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub worker: usize,
    pub operations: usize,
    pub allocations: u64,
    pub frees: u64,
    pub corrections: u64,
    pub published: usize,
    pub phase: WorkerPhase,
}

pub struct ChurnWorker<'a, A: RawAllocator + ?Sized> {
    id: usize,
    allocator: &'a A,
    states: Vec<SizeState>,
    rng: StdRng,
    phase: WorkerPhase,
    operations: usize,
    allocations: u64,
    frees: u64,
    corrections: u64,
}

impl<'a, A: RawAllocator + ?Sized> ChurnWorker<'a, A> {
    #[must_use]
    pub fn new(id: usize, allocator: &'a A, tasks: &[AllocationTask]) -> Self {
        Self {
            id,
            allocator,
            states: tasks.iter().copied().map(SizeState::new).collect(),
            rng: StdRng::seed_from_u64(worker_seed(id)),
            phase: WorkerPhase::Running,
            operations: 0,
            allocations: 0,
            frees: 0,
            corrections: 0,
        }
    }

    /// Replace the per-worker seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }

    #[must_use]
    pub fn states(&self) -> &[SizeState] {
        &self.states
    }

    /// Sum of this worker's shares.
    #[must_use]
    pub fn assigned(&self) -> usize {
        self.states.iter().map(SizeState::target).sum()
    }

    /// Random-walk length: ten times the assigned total plus up to twice
    /// the assigned total again.
    pub fn draw_budget(&mut self) -> usize {
        let sum = self.assigned();
        10 * sum + self.rng.gen_range(0..=2 * sum)
    }

    fn alloc_into(&mut self, idx: usize) -> Result<()> {
        let state = &mut self.states[idx];
        let ptr = self
            .allocator
            .allocate(state.size)
            .ok_or_else(|| CensusError::AllocationFailure {
                size: state.size,
                key: CensusKey::block(state.size),
            })?;
        // SAFETY: fresh block of `state.size` bytes.
        unsafe { fill_block(ptr, state.size, state.pattern) };
        state.owned.push(ptr.as_ptr() as usize);
        self.allocations += 1;
        Ok(())
    }

    fn release_at(&mut self, idx: usize, slot: usize) {
        let state = &mut self.states[idx];
        let addr = state.owned.swap_remove(slot);
        if let Some(ptr) = NonNull::new(addr as *mut u8) {
            // SAFETY: `addr` was allocated by this worker with `state.size`
            // bytes and has just left the owned set.
            unsafe { self.allocator.release(ptr, state.size) };
        }
        self.frees += 1;
    }

    /// One random operation. `remaining` is the number of operations left in
    /// the budget, this one included.
    pub fn step(&mut self, remaining: usize) -> Result<()> {
        if self.states.is_empty() {
            return Ok(());
        }
        let classes = self.states.len();
        let idx = self.rng.gen_range(0..classes);
        let state = &self.states[idx];

        let allocate = if state.current() == 0 {
            true
        } else if remaining <= classes * (state.distance() + CONVERGENCE_SLACK) {
            state.current() < state.target()
        } else {
            let p = state.alloc_probability();
            self.rng.gen_bool(p)
        };

        self.operations += 1;
        if allocate {
            self.alloc_into(idx)
        } else {
            let slot = self.rng.gen_range(0..self.states[idx].current());
            self.release_at(idx, slot);
            Ok(())
        }
    }

    /// Bring every class to its exact target: allocate when short, free from
    /// the back when over.
    pub fn correct(&mut self) -> Result<()> {
        for idx in 0..self.states.len() {
            while self.states[idx].current() < self.states[idx].target() {
                self.alloc_into(idx)?;
                self.corrections += 1;
            }
            while self.states[idx].current() > self.states[idx].target() {
                let last = self.states[idx].current() - 1;
                self.release_at(idx, last);
                self.corrections += 1;
            }
        }
        Ok(())
    }

    /// Full walk: draw a budget, run it, correct.
    pub fn run(&mut self) -> Result<()> {
        let budget = self.draw_budget();
        for done in 0..budget {
            self.step(budget - done)?;
        }
        self.correct()
    }

    /// Move every owned address into `retained` with a single lock
    /// acquisition and mark the worker published.
    pub fn publish(&mut self, retained: &RetainedCollection) -> WorkerReport {
        let batches: Vec<(CensusKey, Vec<usize>)> = self
            .states
            .iter_mut()
            .map(|s| (CensusKey::block(s.size), std::mem::take(&mut s.owned)))
            .collect();
        let published = batches.iter().map(|(_, v)| v.len()).sum();
        retained.publish_batch(batches);
        self.phase = WorkerPhase::Published;
        WorkerReport {
            worker: self.id,
            operations: self.operations,
            allocations: self.allocations,
            frees: self.frees,
            corrections: self.corrections,
            published,
            phase: self.phase,
        }
    }
}

/// How the driver waits for spawned workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    /// Blocking join; threads exit after publishing.
    Join,
    /// Poll a completion counter; threads stay alive after publishing so
    /// their allocator-local state is never abandoned.
    Idle,
}

impl JoinPolicy {
    #[must_use]
    pub fn from_str_loose(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "join" | "blocking" => Some(Self::Join),
            "idle" | "detach" | "park" => Some(Self::Idle),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Idle => "idle",
        }
    }
}

/// Hooks fired from worker threads. Defaults do nothing.
pub trait ChurnObserver: Send + Sync {
    fn on_worker_start(&self, _worker: usize, _tasks: &[AllocationTask]) {}
    fn on_worker_published(&self, _report: &WorkerReport) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl ChurnObserver for SilentObserver {}

/// State shared between the driver and spawned workers.
#[derive(Default)]
struct Shared {
    completed: AtomicUsize,
    first_error: Mutex<Option<CensusError>>,
    reports: Mutex<Vec<WorkerReport>>,
}

impl Shared {
    fn record_error(&self, err: CensusError) {
        let mut slot = self.first_error.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }
}

/// Counts a worker as complete when dropped, including on unwind, so the
/// idle-policy barrier cannot wait on a dead thread.
struct CompletionGuard<'s> {
    shared: &'s Shared,
    worker: usize,
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.shared.record_error(CensusError::WorkerPanicked {
                worker: self.worker,
            });
        }
        self.shared.completed.fetch_add(1, Ordering::Release);
    }
}

pub struct ChurnScheduler<A: RawAllocator + 'static> {
    allocator: Arc<A>,
    workers: usize,
    policy: JoinPolicy,
    seed: u64,
    keep_running: Arc<AtomicBool>,
}

impl<A: RawAllocator + 'static> ChurnScheduler<A> {
    /// `workers` is clamped to at least one. `seed` drives the partition only;
    /// per-worker walks use [`worker_seed`].
    #[must_use]
    pub fn new(allocator: Arc<A>, workers: usize, policy: JoinPolicy, seed: u64) -> Self {
        Self {
            allocator,
            workers: workers.max(1),
            policy,
            seed,
            keep_running: Arc::new(AtomicBool::new(true)),
        }
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    #[must_use]
    pub fn policy(&self) -> JoinPolicy {
        self.policy
    }

    /// The partition this scheduler will run for `classes`.
    #[must_use]
    pub fn plan(&self, classes: &[SizeClass]) -> Vec<Vec<AllocationTask>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        distribute(classes, self.workers, &mut rng)
    }

    /// Let idle-policy workers return. Fixtures never call this.
    pub fn release_idle_workers(&self) {
        self.keep_running.store(false, Ordering::Release);
    }

    /// Partition, run every worker, wait for all of them, and return their
    /// reports ordered by worker id. The first worker error wins.
    pub fn run(
        &self,
        classes: &[SizeClass],
        retained: Arc<RetainedCollection>,
        observer: Arc<dyn ChurnObserver>,
    ) -> Result<Vec<WorkerReport>> {
        let mut plan = self.plan(classes);
        for class in classes {
            retained.reserve(&class.key(), class.target());
        }

        let shared = Arc::new(Shared::default());
        let mut handles = Vec::with_capacity(self.workers.saturating_sub(1));
        let local_tasks = std::mem::take(&mut plan[0]);

        for (offset, tasks) in plan.into_iter().skip(1).enumerate() {
            let worker = offset + 1;
            let allocator = Arc::clone(&self.allocator);
            let retained = Arc::clone(&retained);
            let observer = Arc::clone(&observer);
            let shared_w = Arc::clone(&shared);
            let keep_running = Arc::clone(&self.keep_running);
            let idle = self.policy == JoinPolicy::Idle;
            let spawned = thread::Builder::new()
                .name(format!("churn-worker-{worker}"))
                .spawn(move || {
                    {
                        let _done = CompletionGuard {
                            shared: &shared_w,
                            worker,
                        };
                        run_worker(
                            worker,
                            allocator.as_ref(),
                            &tasks,
                            &retained,
                            observer.as_ref(),
                            &shared_w,
                            idle,
                        );
                    }
                    if idle {
                        while keep_running.load(Ordering::Acquire) {
                            thread::sleep(COMPLETION_POLL);
                        }
                    }
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    // Account for the workers that will never start.
                    shared.record_error(err.into());
                    shared
                        .completed
                        .fetch_add(self.workers - worker, Ordering::Release);
                    break;
                }
            }
        }

        {
            let _done = CompletionGuard {
                shared: &shared,
                worker: 0,
            };
            run_worker(
                0,
                self.allocator.as_ref(),
                &local_tasks,
                &retained,
                observer.as_ref(),
                &shared,
                false,
            );
        }

        match self.policy {
            JoinPolicy::Join => {
                for (offset, handle) in handles.into_iter().enumerate() {
                    if handle.join().is_err() {
                        shared.record_error(CensusError::WorkerPanicked { worker: offset + 1 });
                    }
                }
            }
            JoinPolicy::Idle => {
                while shared.completed.load(Ordering::Acquire) < self.workers {
                    thread::sleep(COMPLETION_POLL);
                }
                drop(handles);
            }
        }

        if let Some(err) = shared.first_error.lock().take() {
            return Err(err);
        }
        let mut reports = std::mem::take(&mut *shared.reports.lock());
        reports.sort_by_key(|r| r.worker);
        Ok(reports)
    }
}

fn run_worker<A: RawAllocator + ?Sized>(
    id: usize,
    allocator: &A,
    tasks: &[AllocationTask],
    retained: &RetainedCollection,
    observer: &dyn ChurnObserver,
    shared: &Shared,
    idle_after: bool,
) {
    observer.on_worker_start(id, tasks);
    let mut worker = ChurnWorker::new(id, allocator, tasks);
    if let Err(err) = worker.run() {
        shared.record_error(err);
        return;
    }
    let mut report = worker.publish(retained);
    observer.on_worker_published(&report);
    if idle_after {
        report.phase = WorkerPhase::Idling;
    }
    shared.reports.lock().push(report);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::CountingMalloc;

    fn classes(spec: &[(usize, usize)]) -> Vec<SizeClass> {
        spec.iter()
            .map(|&(size, target)| SizeClass::new(size, target).unwrap())
            .collect()
    }

    #[test]
    fn shares_sum_to_total() {
        let mut rng = StdRng::seed_from_u64(7);
        for total in [0, 1, 7, 100, 20_000] {
            for workers in [1, 2, 8, 33] {
                let shares = partition_shares(total, workers, &mut rng);
                assert_eq!(shares.len(), workers);
                assert_eq!(shares.iter().sum::<usize>(), total);
            }
        }
        assert!(partition_shares(10, 0, &mut rng).is_empty());
    }

    #[test]
    fn small_totals_produce_zero_shares() {
        let mut rng = StdRng::seed_from_u64(1);
        let shares = partition_shares(3, 16, &mut rng);
        assert!(shares.iter().filter(|&&s| s == 0).count() >= 13);
    }

    #[test]
    fn distribute_skips_zero_shares() {
        let mut rng = StdRng::seed_from_u64(3);
        let plan = distribute(&classes(&[(16, 2), (32, 0)]), 8, &mut rng);
        assert_eq!(plan.len(), 8);
        let tasks: Vec<_> = plan.iter().flatten().collect();
        assert!(tasks.iter().all(|t| t.share > 0 && t.size == 16));
        assert_eq!(tasks.iter().map(|t| t.share).sum::<usize>(), 2);
    }

    #[test]
    fn worker_seed_formula() {
        assert_eq!(worker_seed(0), 67_890);
        assert_eq!(worker_seed(3), 3 * 12_345 + 67_890);
    }

    #[test]
    fn empty_class_always_allocates_next() {
        let alloc = CountingMalloc::new();
        let task = AllocationTask { size: 64, share: 5 };
        let mut worker = ChurnWorker::new(0, &alloc, &[task]);
        worker.step(1_000).unwrap();
        assert_eq!(worker.states()[0].current(), 1);
        let retained = RetainedCollection::new();
        worker.publish(&retained);
        unsafe { retained.release_all(&alloc) };
    }

    #[test]
    fn near_budget_end_moves_toward_target() {
        let alloc = CountingMalloc::new();
        let task = AllocationTask { size: 16, share: 2 };
        let mut worker = ChurnWorker::new(0, &alloc, &[task]);
        worker.correct().unwrap();
        worker.alloc_into(0).unwrap();
        worker.alloc_into(0).unwrap();
        assert_eq!(worker.states()[0].current(), 4);
        // remaining <= 1 * (2 + 10): must free.
        worker.step(5).unwrap();
        assert_eq!(worker.states()[0].current(), 3);
        let retained = RetainedCollection::new();
        worker.publish(&retained);
        unsafe { retained.release_all(&alloc) };
    }

    #[test]
    fn probability_is_clamped_and_biased() {
        let mut state = SizeState::new(AllocationTask { size: 16, share: 10 });
        assert!((state.alloc_probability() - 0.8).abs() < 1e-9);
        state.owned = vec![1; 10];
        assert!((state.alloc_probability() - 0.5).abs() < 1e-9);
        state.owned = vec![1; 40];
        assert!((state.alloc_probability() - 0.2).abs() < 1e-9);
        state.owned = vec![1; 11];
        assert!(state.alloc_probability() < 0.5);
    }

    #[test]
    fn worker_run_converges_and_publishes_once() {
        let alloc = CountingMalloc::new();
        let tasks = [
            AllocationTask { size: 16, share: 300 },
            AllocationTask { size: 128, share: 50 },
        ];
        let mut worker = ChurnWorker::new(2, &alloc, &tasks);
        worker.run().unwrap();
        assert!(worker.states().iter().all(|s| s.current() == s.target()));
        let retained = RetainedCollection::new();
        let report = worker.publish(&retained);
        assert_eq!(report.published, 350);
        assert_eq!(report.phase, WorkerPhase::Published);
        assert_eq!(report.allocations - report.frees, 350);
        assert!(report.operations >= 3_500);
        assert_eq!(retained.count(&CensusKey::block(16)), 300);
        assert_eq!(retained.count(&CensusKey::block(128)), 50);
        assert_eq!(alloc.live(), 350);
        unsafe { retained.release_all(&alloc) };
    }

    #[test]
    fn join_policy_parsing() {
        assert_eq!(JoinPolicy::from_str_loose(" Join "), Some(JoinPolicy::Join));
        assert_eq!(JoinPolicy::from_str_loose("blocking"), Some(JoinPolicy::Join));
        assert_eq!(JoinPolicy::from_str_loose("park"), Some(JoinPolicy::Idle));
        assert_eq!(JoinPolicy::from_str_loose("whenever"), None);
    }

    #[test]
    fn scheduler_join_reaches_exact_census() {
        let alloc = Arc::new(CountingMalloc::new());
        let retained = Arc::new(RetainedCollection::new());
        let scheduler = ChurnScheduler::new(Arc::clone(&alloc), 4, JoinPolicy::Join, 11);
        let reports = scheduler
            .run(
                &classes(&[(16, 2_000), (64, 500)]),
                Arc::clone(&retained),
                Arc::new(SilentObserver),
            )
            .unwrap();
        assert_eq!(reports.len(), 4);
        assert_eq!(
            reports.iter().map(|r| r.worker).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert_eq!(retained.count(&CensusKey::block(16)), 2_000);
        assert_eq!(retained.count(&CensusKey::block(64)), 500);
        assert_eq!(retained.duplicate_addresses(), 0);
        unsafe { retained.release_all(alloc.as_ref()) };
    }

    #[test]
    fn scheduler_surfaces_allocation_failure() {
        let alloc = Arc::new(CountingMalloc::new().failing_after(100));
        let retained = Arc::new(RetainedCollection::new());
        let scheduler = ChurnScheduler::new(alloc, 2, JoinPolicy::Join, 5);
        let err = scheduler
            .run(
                &classes(&[(32, 5_000)]),
                retained,
                Arc::new(SilentObserver),
            )
            .unwrap_err();
        assert!(matches!(err, CensusError::AllocationFailure { size: 32, .. }));
    }
}
