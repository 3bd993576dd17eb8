//! Process-scoped globals pointing into the heap, plus dispatch-free objects
//! an analyzer can only classify by size and pointer chains.

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::OnceLock;

use heapcensus_core::TypedObject;

use crate::dispatch::VPtr;
use crate::vtable;

fn config_drop() -> &'static str {
    "~Config"
}

fn record_drop() -> &'static str {
    "~Record"
}

vtable!(_ZTV6Config, _ZTI6Config, "Config", [config_drop]);
vtable!(_ZTV6Record, _ZTI6Record, "Record", [record_drop]);

pub const SERVERS: usize = 100;
pub const ID_POOL: usize = 10_000;

#[repr(C)]
pub struct Config {
    vptr: VPtr,
    pub max_connections: i32,
    pub timeout_ms: i32,
    pub server_list: Vec<String>,
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self {
            vptr: _ZTV6Config.vptr(),
            max_connections: 1024,
            timeout_ms: 30_000,
            server_list: (0..SERVERS)
                .map(|i| format!("server_{i:03}.example.com:8080"))
                .collect(),
        }
    }

    #[must_use]
    pub fn vptr(&self) -> VPtr {
        self.vptr
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[repr(C)]
pub struct Record {
    vptr: VPtr,
    pub id: i32,
    pub score: f64,
    pub label: String,
}

impl Record {
    #[must_use]
    pub fn vptr(&self) -> VPtr {
        self.vptr
    }
}

impl TypedObject for Record {
    const TYPE_NAME: &'static str = "Record";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    fn build(index: usize) -> Self {
        Self {
            vptr: _ZTV6Record.vptr(),
            id: index as i32,
            score: index as f64 * 1.5,
            label: format!("record_label_{index:05}_padding"),
        }
    }
}

/// Plain coordinates with no dispatch pointer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl TypedObject for Point3D {
    const TYPE_NAME: &'static str = "Point3D";

    fn build(index: usize) -> Self {
        let i = index as f64;
        Self {
            x: i * 0.1,
            y: i * 0.2,
            z: i * 0.3,
        }
    }
}

/// Singly linked node with no dispatch pointer.
#[repr(C)]
pub struct Node {
    pub value: i32,
    pub next: *const Node,
}

impl TypedObject for Node {
    const TYPE_NAME: &'static str = "Node";

    fn build(index: usize) -> Self {
        Self {
            value: index as i32,
            next: std::ptr::null(),
        }
    }
}

/// Chain `nodes` so each one points at its predecessor, and return the last
/// as the head.
///
/// # Safety
///
/// Every pointer must reference a live `Node` not borrowed elsewhere.
pub unsafe fn link_nodes(nodes: &[NonNull<Node>]) -> Option<NonNull<Node>> {
    let mut head: Option<NonNull<Node>> = None;
    for &node in nodes {
        let next = head.map_or(std::ptr::null(), |h| h.as_ptr().cast_const());
        // SAFETY: forwarded caller contract.
        unsafe { (*node.as_ptr()).next = next };
        head = Some(node);
    }
    head
}

/// Number of nodes reachable from `head`.
///
/// # Safety
///
/// The chain from `head` must consist of live nodes and end in null.
#[must_use]
pub unsafe fn chain_len(head: Option<NonNull<Node>>) -> usize {
    let mut len = 0;
    let mut cur = head.map_or(std::ptr::null(), |h| h.as_ptr().cast_const());
    while !cur.is_null() {
        len += 1;
        // SAFETY: forwarded caller contract.
        cur = unsafe { (*cur).next };
    }
    len
}

/// Heap pointer stored in a process-scoped global.
pub struct Pinned<T>(NonNull<T>);

// SAFETY: a pinned pointee is never freed and never written after it is
// published, so sharing the address across threads only permits reads.
#[allow(unsafe_code)]
unsafe impl<T> Send for Pinned<T> {}
#[allow(unsafe_code)]
unsafe impl<T> Sync for Pinned<T> {}

impl<T> Pinned<T> {
    /// # Safety
    ///
    /// `ptr` must reference a live `T` that is never freed or mutated again.
    #[must_use]
    pub unsafe fn new(ptr: NonNull<T>) -> Self {
        Self(ptr)
    }

    #[must_use]
    pub fn as_ptr(&self) -> NonNull<T> {
        self.0
    }
}

/// Everything the globals fixture reaches from static storage.
pub struct Globals {
    pub config: Config,
    pub id_pool: Vec<i32>,
    pub registry: HashMap<i32, Pinned<Record>>,
    pub points: Vec<Pinned<Point3D>>,
    pub list_head: Option<Pinned<Node>>,
}

impl Globals {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Config::new(),
            id_pool: (0..ID_POOL as i32).collect(),
            registry: HashMap::new(),
            points: Vec::new(),
            list_head: None,
        }
    }
}

impl Default for Globals {
    fn default() -> Self {
        Self::new()
    }
}

/// Installed once, after population, and never dropped.
pub static GLOBALS: OnceLock<Globals> = OnceLock::new();

/// # Safety
///
/// Every pointer must reference a live `Record` that is never freed.
#[must_use]
pub unsafe fn registry(records: &[NonNull<Record>]) -> HashMap<i32, Pinned<Record>> {
    records
        .iter()
        // SAFETY: forwarded caller contract.
        .map(|&r| (unsafe { r.as_ref() }.id, unsafe { Pinned::new(r) }))
        .collect()
}
