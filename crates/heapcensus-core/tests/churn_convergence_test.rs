use heapcensus_core::churn::{SilentObserver, distribute, partition_shares};
use heapcensus_core::verify::verify;
use heapcensus_core::{
    AllocationTask, CensusKey, ChurnObserver, ChurnScheduler, ChurnWorker, CountingMalloc,
    Expectation, JoinPolicy, RetainedCollection, SizeClass, WorkerPhase, WorkerReport,
};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;

fn classes(spec: &[(usize, usize)]) -> Vec<SizeClass> {
    spec.iter()
        .map(|&(size, target)| SizeClass::new(size, target).unwrap())
        .collect()
}

#[derive(Default)]
struct Recorder {
    started: Mutex<Vec<usize>>,
    published: Mutex<Vec<WorkerReport>>,
}

impl ChurnObserver for Recorder {
    fn on_worker_start(&self, worker: usize, _tasks: &[AllocationTask]) {
        self.started.lock().push(worker);
    }

    fn on_worker_published(&self, report: &WorkerReport) {
        self.published.lock().push(report.clone());
    }
}

#[test]
fn partition_sums_hold_across_seeds() {
    for seed in 0..200u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let total = (seed as usize * 7_919) % 50_000;
        let workers = 1 + (seed as usize % 12);
        let shares = partition_shares(total, workers, &mut rng);
        assert_eq!(shares.len(), workers);
        assert_eq!(shares.iter().sum::<usize>(), total, "seed {seed}");
    }
}

#[test]
fn distribution_conserves_each_class() {
    let plan_classes = classes(&[(16, 20_000), (128, 10_000), (1024 * 1024, 100), (64, 0)]);
    let mut rng = StdRng::seed_from_u64(0xfeed);
    let plan = distribute(&plan_classes, 8, &mut rng);
    for class in &plan_classes {
        let assigned: usize = plan
            .iter()
            .flatten()
            .filter(|t| t.size == class.size())
            .map(|t| t.share)
            .sum();
        assert_eq!(assigned, class.target());
    }
}

#[test]
fn worker_converges_for_edge_seeds() {
    let tasks = [
        AllocationTask { size: 16, share: 400 },
        AllocationTask { size: 256, share: 120 },
        AllocationTask { size: 1024 * 1024, share: 3 },
    ];
    for seed in [0, 1, u64::MAX] {
        let alloc = CountingMalloc::new();
        let mut worker = ChurnWorker::new(5, &alloc, &tasks).with_seed(seed);
        worker.run().unwrap();
        for state in worker.states() {
            assert_eq!(state.current(), state.target(), "seed {seed}");
            assert_eq!(state.owned().len(), state.current());
        }
        let retained = RetainedCollection::new();
        let report = worker.publish(&retained);
        assert_eq!(report.published, 523);
        assert_eq!(worker.phase(), WorkerPhase::Published);
        unsafe { retained.release_all(&alloc) };
        assert_eq!(alloc.live(), 0);
    }
}

#[test]
fn empty_class_gets_an_allocation_first() {
    let alloc = CountingMalloc::new();
    let tasks = [
        AllocationTask { size: 32, share: 10 },
        AllocationTask { size: 64, share: 10 },
    ];
    let mut worker = ChurnWorker::new(0, &alloc, &tasks);
    // Both classes start empty, so the first two steps can only allocate.
    worker.step(usize::MAX).unwrap();
    worker.step(usize::MAX).unwrap();
    let total: usize = worker.states().iter().map(|s| s.current()).sum();
    assert_eq!(total, 2);
    assert_eq!(alloc.allocations(), 2);
    let retained = RetainedCollection::new();
    worker.publish(&retained);
    unsafe { retained.release_all(&alloc) };
}

#[test]
fn eight_workers_land_exactly_twenty_thousand() {
    let alloc = Arc::new(CountingMalloc::new());
    let retained = Arc::new(RetainedCollection::new());
    let recorder = Arc::new(Recorder::default());
    let scheduler = ChurnScheduler::new(Arc::clone(&alloc), 8, JoinPolicy::Join, 0);
    let plan = classes(&[(16, 20_000)]);

    let reports = scheduler
        .run(&plan, Arc::clone(&retained), recorder.clone())
        .unwrap();

    assert_eq!(retained.count(&CensusKey::block(16)), 20_000);
    assert_eq!(retained.duplicate_addresses(), 0);
    assert_eq!(reports.iter().map(|r| r.published).sum::<usize>(), 20_000);
    assert_eq!(recorder.started.lock().len(), 8);
    assert_eq!(recorder.published.lock().len(), 8);
    assert_eq!(alloc.live(), 20_000);
    unsafe { retained.release_all(alloc.as_ref()) };
}

#[test]
fn idle_policy_waits_on_the_counter() {
    let alloc = Arc::new(CountingMalloc::new());
    let retained = Arc::new(RetainedCollection::new());
    let scheduler = ChurnScheduler::new(Arc::clone(&alloc), 4, JoinPolicy::Idle, 1);
    let plan = classes(&[(16, 1_000), (512, 200)]);

    let reports = scheduler
        .run(&plan, Arc::clone(&retained), Arc::new(SilentObserver))
        .unwrap();
    scheduler.release_idle_workers();

    let verdict = verify(
        &plan.iter().map(Expectation::for_class).collect::<Vec<_>>(),
        &retained,
    );
    assert!(verdict.passed());
    assert_eq!(reports[0].phase, WorkerPhase::Published);
    assert!(reports[1..].iter().all(|r| r.phase == WorkerPhase::Idling));
    unsafe { retained.release_all(alloc.as_ref()) };
}

#[test]
fn zero_target_churn_makes_no_allocator_calls() {
    let alloc = Arc::new(CountingMalloc::new());
    let retained = Arc::new(RetainedCollection::new());
    let scheduler = ChurnScheduler::new(Arc::clone(&alloc), 3, JoinPolicy::Join, 9);
    let reports = scheduler
        .run(
            &classes(&[(16, 0), (32, 0)]),
            Arc::clone(&retained),
            Arc::new(SilentObserver),
        )
        .unwrap();
    assert_eq!(reports.len(), 3);
    assert_eq!(alloc.allocations(), 0);
    assert_eq!(retained.total(), 0);
}

#[test]
fn large_partition_seed_still_converges() {
    let alloc = Arc::new(CountingMalloc::new());
    let retained = Arc::new(RetainedCollection::new());
    let scheduler = ChurnScheduler::new(Arc::clone(&alloc), 8, JoinPolicy::Join, u64::MAX);
    let plan = classes(&[(16, 3_000), (64, 1_000), (1024 * 1024, 10)]);
    scheduler
        .run(&plan, Arc::clone(&retained), Arc::new(SilentObserver))
        .unwrap();
    for class in &plan {
        assert_eq!(retained.count(&class.key()), class.target());
    }
    unsafe { retained.release_all(alloc.as_ref()) };
}
