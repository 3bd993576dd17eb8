//! Catalog of fixture scenarios and the census each one promises.
//!
//! The fixture binaries verify against these expectations, and the harness
//! prints them as a plan without running anything.

use heapcensus_core::object::{grouped_key, object_key};
use heapcensus_core::size_class::MIB;
use heapcensus_core::{CensusKey, Expectation, Result, SizeClass, TypedObject};

use crate::objects::animals::{Cat, Dog, GoldFish};
use crate::objects::containers::{Gadget, Session, TaskQueue};
use crate::objects::entities::{GameObject, NetworkEntity, SimpleNpc};
use crate::objects::globals::{Node, Point3D, Record};
use crate::objects::hashed::{Enemy, Item};
use crate::objects::marker::Marker;
use crate::objects::ordered::{Monster, Weapon};
use crate::objects::smart::{Bullet, Effect, Player, boxed_key, shared_key};
use crate::objects::strings::{BIO_LEN, LogRecord, MESSAGE_LEN, RAW_LEN, UserProfile};
use crate::objects::tasks::{PUSHED_PER_QUEUE, QUEUES, Task};
use crate::objects::widget::{SPLIT_GROUPS, Widget};

pub const MARKERS: usize = 80_000;
/// Small classes shared by `basic_malloc` and `allocator_census`.
pub const SMALL_BLOCKS: [(usize, usize); 3] = [(16, 80_000), (32, 80_000), (64, 80_000)];
pub const MEDIUM_BLOCKS: [(usize, usize); 4] =
    [(128, 10_000), (256, 10_000), (512, 10_000), (1024, 10_000)];
pub const LARGE_BLOCKS: [(usize, usize); 3] = [(MIB, 1_000), (2 * MIB, 1_000), (3 * MIB, 1_000)];

/// Per-size totals for the churn fixture.
pub const CHURN_BLOCKS: [(usize, usize); 10] = [
    (16, 20_000),
    (32, 20_000),
    (64, 20_000),
    (128, 10_000),
    (256, 10_000),
    (512, 10_000),
    (1024, 10_000),
    (MIB, 100),
    (2 * MIB, 100),
    (3 * MIB, 100),
];

pub const DOGS: usize = 10_000;
pub const CATS: usize = 5_000;
pub const FISH: usize = 3_000;
pub const DOG_ARRAY_LEN: usize = 200;

pub const GAME_OBJECTS: usize = 4_000;
pub const NETWORK_ENTITIES: usize = 3_000;
pub const SIMPLE_NPCS: usize = 5_000;

pub const GADGETS: usize = 5_000;
pub const SESSIONS: usize = 2_000;
pub const TASK_QUEUES: usize = 1_000;

pub const PLAYERS: usize = 3_000;
pub const BULLETS: usize = 5_000;
pub const EFFECTS: usize = 4_000;

pub const PROFILES: usize = 3_000;
pub const LOG_RECORDS: usize = 4_000;
pub const RAW_STRINGS: usize = 5_000;

pub const MONSTERS: usize = 5_000;
pub const WEAPONS: usize = 3_000;
pub const CONFIG_ENTRIES: usize = 2_000;

pub const ENEMIES: usize = 4_000;
pub const ITEMS: usize = 3_000;

pub const RECORDS: usize = 5_000;
pub const POINTS: usize = 5_000;
pub const NODES: usize = 1_000;

pub struct Scenario {
    pub name: &'static str,
    pub title: &'static str,
    /// Print allocator statistics before the sentinel.
    pub allocator_stats: bool,
    expectations: fn() -> Vec<Expectation>,
}

impl Scenario {
    #[must_use]
    pub fn expectations(&self) -> Vec<Expectation> {
        (self.expectations)()
    }

    /// Sum of `expected × size` over every key.
    #[must_use]
    pub fn expected_user_bytes(&self) -> usize {
        self.expectations()
            .iter()
            .map(|e| e.expected * e.key.size())
            .sum()
    }
}

/// Size classes for a `(size, count)` table.
pub fn classes(table: &[(usize, usize)]) -> Result<Vec<SizeClass>> {
    table
        .iter()
        .map(|&(size, count)| SizeClass::new(size, count))
        .collect()
}

fn blocks(table: &[(usize, usize)]) -> impl Iterator<Item = Expectation> + '_ {
    table
        .iter()
        .map(|&(size, count)| Expectation::new(CensusKey::block(size), count))
}

fn objects<T: TypedObject>(count: usize) -> Expectation {
    Expectation::new(object_key::<T>(), count)
}

fn basic_malloc() -> Vec<Expectation> {
    let mut out = vec![objects::<Marker>(MARKERS)];
    out.extend(blocks(&SMALL_BLOCKS));
    out
}

fn allocator_census() -> Vec<Expectation> {
    let mut out = basic_malloc();
    out.extend(blocks(&MEDIUM_BLOCKS));
    out.extend(blocks(&LARGE_BLOCKS));
    out
}

fn churn_census() -> Vec<Expectation> {
    blocks(&CHURN_BLOCKS).collect()
}

fn vtable_types() -> Vec<Expectation> {
    vec![
        objects::<Dog>(DOGS),
        objects::<Cat>(CATS),
        objects::<GoldFish>(FISH),
        Expectation::new(grouped_key::<Dog>(DOG_ARRAY_LEN), 1),
    ]
}

fn multi_inherit() -> Vec<Expectation> {
    vec![
        objects::<GameObject>(GAME_OBJECTS),
        objects::<NetworkEntity>(NETWORK_ENTITIES),
        objects::<SimpleNpc>(SIMPLE_NPCS),
    ]
}

fn split_n_threshold() -> Vec<Expectation> {
    SPLIT_GROUPS
        .iter()
        .map(|&(per_block, count, _)| Expectation::new(grouped_key::<Widget>(per_block), count))
        .collect()
}

fn containers() -> Vec<Expectation> {
    vec![
        objects::<Gadget>(GADGETS),
        objects::<Session>(SESSIONS),
        objects::<TaskQueue>(TASK_QUEUES),
    ]
}

fn deque_boundary() -> Vec<Expectation> {
    vec![objects::<Task>(QUEUES * PUSHED_PER_QUEUE)]
}

fn smart_ptr() -> Vec<Expectation> {
    vec![
        Expectation::new(shared_key::<Player>(), PLAYERS),
        Expectation::new(boxed_key::<Bullet>(), BULLETS),
        Expectation::new(shared_key::<Effect>(), EFFECTS),
    ]
}

/// Key for the boxed `String` headers of the raw-string phase.
#[must_use]
pub fn string_header_key() -> CensusKey {
    CensusKey::object("String", size_of::<String>())
}

fn strings() -> Vec<Expectation> {
    vec![
        objects::<UserProfile>(PROFILES),
        Expectation::new(CensusKey::block(BIO_LEN), PROFILES),
        objects::<LogRecord>(LOG_RECORDS),
        Expectation::new(CensusKey::block(MESSAGE_LEN), LOG_RECORDS),
        Expectation::new(string_header_key(), RAW_STRINGS),
        Expectation::new(CensusKey::block(RAW_LEN), RAW_STRINGS),
    ]
}

fn ordered_maps() -> Vec<Expectation> {
    vec![objects::<Monster>(MONSTERS), objects::<Weapon>(WEAPONS)]
}

fn hash_sets() -> Vec<Expectation> {
    vec![objects::<Enemy>(ENEMIES), objects::<Item>(ITEMS)]
}

/// Plain-data objects carry no type name and are expected as raw blocks.
fn globals_weak() -> Vec<Expectation> {
    vec![
        objects::<Record>(RECORDS),
        objects::<Point3D>(POINTS),
        objects::<Node>(NODES),
    ]
}

pub static CATALOG: [Scenario; 13] = [
    Scenario {
        name: "basic_malloc",
        title: "Basic Malloc Census",
        allocator_stats: false,
        expectations: basic_malloc,
    },
    Scenario {
        name: "allocator_census",
        title: "Allocator Size-Class Census",
        allocator_stats: true,
        expectations: allocator_census,
    },
    Scenario {
        name: "churn_census",
        title: "Multithreaded Churn Census",
        allocator_stats: true,
        expectations: churn_census,
    },
    Scenario {
        name: "vtable_types",
        title: "Dispatch Table Types",
        allocator_stats: false,
        expectations: vtable_types,
    },
    Scenario {
        name: "multi_inherit",
        title: "Multiple Inheritance Layouts",
        allocator_stats: false,
        expectations: multi_inherit,
    },
    Scenario {
        name: "split_n_threshold",
        title: "Split-N Grouped Instances",
        allocator_stats: false,
        expectations: split_n_threshold,
    },
    Scenario {
        name: "containers",
        title: "Container-Owning Objects",
        allocator_stats: false,
        expectations: containers,
    },
    Scenario {
        name: "deque_boundary",
        title: "Ring Buffer Boundary",
        allocator_stats: false,
        expectations: deque_boundary,
    },
    Scenario {
        name: "smart_ptr",
        title: "Smart Pointer Ownership",
        allocator_stats: false,
        expectations: smart_ptr,
    },
    Scenario {
        name: "strings",
        title: "Inline and Heap Strings",
        allocator_stats: false,
        expectations: strings,
    },
    Scenario {
        name: "ordered_maps",
        title: "Ordered Map and Set Members",
        allocator_stats: false,
        expectations: ordered_maps,
    },
    Scenario {
        name: "hash_sets",
        title: "Hash Set and Map Members",
        allocator_stats: false,
        expectations: hash_sets,
    },
    Scenario {
        name: "globals_weak",
        title: "Globals and Weak Classification",
        allocator_stats: false,
        expectations: globals_weak,
    },
];

#[must_use]
pub fn find(name: &str) -> Option<&'static Scenario> {
    CATALOG.iter().find(|s| s.name == name)
}
