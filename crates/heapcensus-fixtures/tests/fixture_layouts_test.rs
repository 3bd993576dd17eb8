//! Layout and census checks for the fixture object types.

use std::mem::offset_of;
use std::ptr::NonNull;

use heapcensus_core::object::{grouped_key, object_key};
use heapcensus_core::verify::verify;
use heapcensus_core::{
    CensusKey, CountingMalloc, Expectation, GroupLayout, PopulationGenerator, RetainedCollection,
    TypedObject,
};
use heapcensus_fixtures::dispatch::{top_of, vptr_at};
use heapcensus_fixtures::objects::animals::{Cat, Dog, GoldFish};
use heapcensus_fixtures::objects::entities::{GameObject, NetworkEntity, SimpleNpc};
use heapcensus_fixtures::objects::globals::{self, Node, Point3D, Record, chain_len, link_nodes};
use heapcensus_fixtures::objects::widget::{SPLIT_GROUPS, Widget};
use heapcensus_fixtures::scenarios;

#[test]
fn grouped_widgets_are_keyed_by_block_size() {
    let alloc = CountingMalloc::new();
    let retained = RetainedCollection::new();
    let generator = PopulationGenerator::new(&alloc, &retained);
    let mut expected = Vec::new();
    for (per_block, count, _) in SPLIT_GROUPS {
        // Smaller counts keep the test quick; the keys are what matter.
        let count = count / 100;
        let firsts = generator
            .grouped::<Widget>(per_block, count, GroupLayout::Leading, None)
            .unwrap();
        assert_eq!(firsts.len(), count);
        let key = grouped_key::<Widget>(per_block);
        assert_eq!(key.size(), per_block * size_of::<Widget>());
        expected.push(Expectation::new(key, count));

        for first in &firsts {
            let widget = unsafe { first.as_ref() };
            assert_eq!(widget.vptr().type_name(), "Widget");
            // Trailing slots stay zeroed.
            let tail = unsafe {
                std::slice::from_raw_parts(
                    first.as_ptr().cast::<u8>().add(size_of::<Widget>()),
                    (per_block - 1) * size_of::<Widget>(),
                )
            };
            assert!(tail.iter().all(|&b| b == 0));
        }
    }
    let verdict = verify(&expected, &retained);
    assert!(verdict.passed(), "{verdict:?}");
    assert_eq!(alloc.allocations(), 30 + 30 + 20 + 10);
    unsafe { retained.release_all(&alloc) };
}

#[test]
fn dispatch_offsets_match_field_offsets() {
    assert_eq!(
        GameObject::DISPATCH_OFFSETS,
        &[offset_of!(GameObject, renderable), offset_of!(GameObject, collidable)]
    );
    assert_eq!(
        NetworkEntity::DISPATCH_OFFSETS,
        &[
            offset_of!(NetworkEntity, renderable),
            offset_of!(NetworkEntity, collidable),
            offset_of!(NetworkEntity, serializable),
        ]
    );
    assert_eq!(SimpleNpc::DISPATCH_OFFSETS, &[0]);
}

#[test]
fn heap_entities_resolve_every_base_to_the_object() {
    let alloc = CountingMalloc::new();
    let retained = RetainedCollection::new();
    let generator = PopulationGenerator::new(&alloc, &retained);
    let entities = generator.objects::<NetworkEntity>(16, None).unwrap();
    for entity in &entities {
        let top = entity.cast::<u8>();
        for &offset in NetworkEntity::DISPATCH_OFFSETS {
            let sub = unsafe { NonNull::new_unchecked(top.as_ptr().add(offset)) };
            let vptr = unsafe { vptr_at(top, offset) };
            assert_eq!(vptr.type_name(), "NetworkEntity");
            assert_eq!(vptr.offset_to_top(), -(offset as isize));
            assert_eq!(unsafe { top_of(sub) }, top);
        }
    }
    assert_eq!(retained.count(&object_key::<NetworkEntity>()), 16);
    unsafe { retained.release_all(&alloc) };
}

#[test]
fn animals_share_tables_per_type() {
    let alloc = CountingMalloc::new();
    let retained = RetainedCollection::new();
    let generator = PopulationGenerator::new(&alloc, &retained);
    let dogs = generator.objects::<Dog>(8, None).unwrap();
    let cats = generator.objects::<Cat>(4, None).unwrap();
    let fish = generator.objects::<GoldFish>(2, None).unwrap();

    let table = |p: NonNull<u8>| unsafe { vptr_at(p, 0) }.as_usize();
    let dog_tables: Vec<usize> = dogs.iter().map(|d| table(d.cast())).collect();
    assert!(dog_tables.windows(2).all(|w| w[0] == w[1]));
    assert_ne!(dog_tables[0], table(cats[0].cast()));
    assert_ne!(table(cats[0].cast()), table(fish[0].cast()));
    unsafe { retained.release_all(&alloc) };
}

#[test]
fn every_scenario_has_a_plan() {
    assert_eq!(scenarios::CATALOG.len(), 13);
    for scenario in &scenarios::CATALOG {
        let expected = scenario.expectations();
        assert!(!expected.is_empty(), "{}", scenario.name);
        assert!(expected.iter().all(|e| e.expected > 0), "{}", scenario.name);
        assert!(scenario.expected_user_bytes() > 0);
    }
}

#[test]
fn deque_boundary_counts_popped_tasks() {
    let scenario = scenarios::find("deque_boundary").unwrap();
    let expected = scenario.expectations();
    assert_eq!(expected.len(), 1);
    assert_eq!(expected[0].expected, 20_000);
}

#[test]
fn globals_weak_population_matches_its_plan() {
    let alloc = CountingMalloc::new();
    let retained = RetainedCollection::new();
    let generator = PopulationGenerator::new(&alloc, &retained);
    let records = generator.objects::<Record>(50, None).unwrap();
    let points = generator.objects::<Point3D>(50, None).unwrap();
    let nodes = generator.objects::<Node>(10, None).unwrap();

    let registry = unsafe { globals::registry(&records) };
    assert_eq!(registry.len(), 50);
    let head = unsafe { link_nodes(&nodes) };
    assert_eq!(unsafe { chain_len(head) }, 10);
    assert_eq!(unsafe { points[7].as_ref() }.y, 7.0 * 0.2);

    let plan = [
        Expectation::new(object_key::<Record>(), 50),
        Expectation::new(CensusKey::block(24), 50),
        Expectation::new(CensusKey::block(16), 10),
    ];
    let verdict = verify(&plan, &retained);
    assert!(verdict.passed(), "{verdict:?}");
    assert_eq!(alloc.allocations(), 110);
    unsafe { retained.release_all(&alloc) };
}
