use heapcensus_core::population::Progress;
use heapcensus_core::size_class::block_has_pattern;
use heapcensus_core::verify::verify;
use heapcensus_core::{
    CensusKey, CountingMalloc, Expectation, PopulationGenerator, RetainedCollection, SizeClass,
    TypedObject,
};
use std::collections::HashSet;
use std::ptr::NonNull;

#[repr(C)]
struct Marker {
    dispatch: &'static MarkerVtable,
}

struct MarkerVtable {
    name: fn() -> &'static str,
}

fn marker_name() -> &'static str {
    "Marker"
}

static MARKER_VTABLE: MarkerVtable = MarkerVtable { name: marker_name };

impl TypedObject for Marker {
    const TYPE_NAME: &'static str = "Marker";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    fn build(_: usize) -> Self {
        Self {
            dispatch: &MARKER_VTABLE,
        }
    }
}

#[test]
fn eighty_thousand_sixteen_byte_blocks_are_unique_and_filled() {
    let alloc = CountingMalloc::new();
    let retained = RetainedCollection::new();
    let generator = PopulationGenerator::new(&alloc, &retained);
    let class = SizeClass::new(16, 80_000).unwrap();

    generator.blocks(class, None).unwrap();

    let addresses = retained.addresses(&class.key());
    assert_eq!(addresses.len(), 80_000);
    let unique: HashSet<usize> = addresses.iter().copied().collect();
    assert_eq!(unique.len(), 80_000);
    for addr in &addresses {
        let ptr = NonNull::new(*addr as *mut u8).unwrap();
        assert!(unsafe { block_has_pattern(ptr, 16, 0x11) });
    }

    let verdict = verify(&[Expectation::for_class(&class)], &retained);
    assert!(verdict.passed());
    unsafe { retained.release_all(&alloc) };
    assert_eq!(alloc.live(), 0);
}

#[test]
fn mixed_plan_matches_expectations_exactly() {
    let alloc = CountingMalloc::new();
    let retained = RetainedCollection::new();
    let generator = PopulationGenerator::new(&alloc, &retained);
    let classes = [
        SizeClass::new(16, 2_000).unwrap(),
        SizeClass::new(32, 2_000).unwrap(),
        SizeClass::new(64, 2_000).unwrap(),
        SizeClass::new(2 * 1024 * 1024, 3).unwrap(),
    ];

    let markers = generator.objects::<Marker>(1_500, None).unwrap();
    generator.interleaved_blocks(&classes, None).unwrap();

    assert_eq!((unsafe { markers[0].as_ref() }.dispatch.name)(), "Marker");
    let mut expected: Vec<Expectation> = classes.iter().map(Expectation::for_class).collect();
    expected.push(Expectation::new(CensusKey::object("Marker", 8), 1_500));
    let verdict = verify(&expected, &retained);
    assert!(verdict.passed(), "{:?}", verdict.failures().collect::<Vec<_>>());
    assert_eq!(verdict.duplicates, 0);
    assert_eq!(alloc.allocations(), 6_000 + 3 + 1_500);

    // Verification does not mutate anything.
    assert_eq!(verify(&expected, &retained), verdict);
    unsafe { retained.release_all(&alloc) };
}

#[test]
fn zero_targets_touch_nothing() {
    let alloc = CountingMalloc::new();
    let retained = RetainedCollection::new();
    let generator = PopulationGenerator::new(&alloc, &retained);
    let classes = [SizeClass::new(16, 0).unwrap(), SizeClass::new(1024, 0).unwrap()];
    assert_eq!(generator.interleaved_blocks(&classes, None).unwrap(), 0);
    assert!(generator.objects::<Marker>(0, None).unwrap().is_empty());
    assert_eq!(alloc.allocations(), 0);
    assert_eq!(retained.total(), 0);

    let verdict = verify(&[Expectation::for_class(&classes[0])], &retained);
    assert!(verdict.passed());
}

#[test]
fn progress_hook_sees_every_interval() {
    let alloc = CountingMalloc::new();
    let retained = RetainedCollection::new();
    let generator = PopulationGenerator::new(&alloc, &retained).with_progress_every(1_000);
    let mut ticks = 0usize;
    let mut hook = |done: usize, total: usize| {
        assert!(done <= total);
        ticks += 1;
    };
    let progress: Progress<'_> = &mut hook;
    generator.objects::<Marker>(5_000, Some(progress)).unwrap();
    assert_eq!(ticks, 5);
    unsafe { retained.release_all(&alloc) };
}

#[test]
fn mid_run_failure_reports_the_class() {
    let alloc = CountingMalloc::new().failing_after(10);
    let retained = RetainedCollection::new();
    let generator = PopulationGenerator::new(&alloc, &retained);
    generator.blocks(SizeClass::new(16, 5).unwrap(), None).unwrap();
    let err = generator
        .blocks(SizeClass::new(3 * 1024 * 1024, 10).unwrap(), None)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "allocation of 3145728 bytes failed for malloc(3MB)"
    );
    unsafe { retained.release_all(&alloc) };
}
