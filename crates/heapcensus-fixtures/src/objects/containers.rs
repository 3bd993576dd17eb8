//! Objects that own standard containers, so their heap graph has interior
//! allocations hanging off a typed root.

use std::collections::{HashMap, LinkedList, VecDeque};

use heapcensus_core::TypedObject;

use crate::dispatch::VPtr;
use crate::vtable;

fn gadget_drop() -> &'static str {
    "~Gadget"
}

fn session_drop() -> &'static str {
    "~Session"
}

fn task_queue_drop() -> &'static str {
    "~TaskQueue"
}

vtable!(_ZTV6Gadget, _ZTI6Gadget, "Gadget", [gadget_drop]);
vtable!(_ZTV7Session, _ZTI7Session, "Session", [session_drop]);
vtable!(_ZTV9TaskQueue, _ZTI9TaskQueue, "TaskQueue", [task_queue_drop]);

pub const GADGET_ITEMS: usize = 10;
pub const SESSION_ENTRIES: usize = 20;
pub const QUEUE_PENDING: usize = 15;
pub const QUEUE_COMPLETED: usize = 10;

/// A vector of boxed ints plus a name long enough to live on the heap.
#[repr(C)]
pub struct Gadget {
    vptr: VPtr,
    pub id: i32,
    pub items: Vec<Box<i32>>,
    pub name: String,
}

#[repr(C)]
pub struct Session {
    vptr: VPtr,
    pub session_id: i32,
    pub data: HashMap<i32, String>,
}

#[repr(C)]
pub struct TaskQueue {
    vptr: VPtr,
    pub pending: VecDeque<Box<i32>>,
    pub completed: LinkedList<Box<i32>>,
}

impl Gadget {
    #[must_use]
    pub fn vptr(&self) -> VPtr {
        self.vptr
    }
}

impl Session {
    #[must_use]
    pub fn vptr(&self) -> VPtr {
        self.vptr
    }
}

impl TaskQueue {
    #[must_use]
    pub fn vptr(&self) -> VPtr {
        self.vptr
    }
}

impl TypedObject for Gadget {
    const TYPE_NAME: &'static str = "Gadget";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    fn build(index: usize) -> Self {
        let base = index as i32 * 100;
        Self {
            vptr: _ZTV6Gadget.vptr(),
            id: index as i32,
            items: (0..GADGET_ITEMS as i32).map(|j| Box::new(base + j)).collect(),
            name: format!("gadget_{index:05}_name_padding_xxxxx"),
        }
    }
}

impl TypedObject for Session {
    const TYPE_NAME: &'static str = "Session";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    fn build(index: usize) -> Self {
        let data = (0..SESSION_ENTRIES as i32)
            .map(|j| (j, format!("session_{index}_value_{j}_padding_xx")))
            .collect();
        Self {
            vptr: _ZTV7Session.vptr(),
            session_id: index as i32,
            data,
        }
    }
}

impl TypedObject for TaskQueue {
    const TYPE_NAME: &'static str = "TaskQueue";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    fn build(index: usize) -> Self {
        let base = index as i32 * 1000;
        Self {
            vptr: _ZTV9TaskQueue.vptr(),
            pending: (0..QUEUE_PENDING as i32).map(|j| Box::new(base + j)).collect(),
            completed: (0..QUEUE_COMPLETED as i32)
                .map(|j| Box::new(base + 100 + j))
                .collect(),
        }
    }
}
