//! Task pointers queued in per-queue ring buffers.
//!
//! Each queue pushes a batch and then pops from the front, leaving dead
//! slots ahead of the live window. Popped tasks stay allocated and retained;
//! an analyzer walking only the live window will miss them.

use std::collections::VecDeque;
use std::ptr::NonNull;

use heapcensus_core::TypedObject;

use crate::dispatch::VPtr;
use crate::vtable;

fn task_drop() -> &'static str {
    "~Task"
}

vtable!(_ZTV4Task, _ZTI4Task, "Task", [task_drop]);

pub const QUEUES: usize = 200;
pub const PUSHED_PER_QUEUE: usize = 100;
pub const POPPED_PER_QUEUE: usize = 30;

#[repr(C)]
pub struct Task {
    vptr: VPtr,
    pub task_id: i32,
    pub priority: f64,
    pub callback: *const u8,
}

impl Task {
    #[must_use]
    pub fn vptr(&self) -> VPtr {
        self.vptr
    }
}

impl TypedObject for Task {
    const TYPE_NAME: &'static str = "Task";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    /// `index` runs over every task in queue order; queue `q`, position `j`
    /// gets id `q * 1000 + j`.
    fn build(index: usize) -> Self {
        let (queue, pos) = (index / PUSHED_PER_QUEUE, index % PUSHED_PER_QUEUE);
        Self {
            vptr: _ZTV4Task.vptr(),
            task_id: (queue * 1000 + pos) as i32,
            priority: pos as f64 * 0.1,
            callback: std::ptr::null(),
        }
    }
}

/// Split `tasks` into queues of [`PUSHED_PER_QUEUE`] and pop
/// [`POPPED_PER_QUEUE`] from the front of each. Returns the queues in
/// creation order.
#[must_use]
pub fn fill_queues(tasks: &[NonNull<Task>]) -> Vec<VecDeque<NonNull<Task>>> {
    tasks
        .chunks(PUSHED_PER_QUEUE)
        .map(|batch| {
            let mut queue: VecDeque<NonNull<Task>> = batch.iter().copied().collect();
            for _ in 0..POPPED_PER_QUEUE.min(queue.len()) {
                queue.pop_front();
            }
            queue
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_queue_position() {
        let t = Task::build(2 * PUSHED_PER_QUEUE + 17);
        assert_eq!(t.task_id, 2017);
        assert!((t.priority - 1.7).abs() < 1e-9);
        assert_eq!(size_of::<Task>(), 32);
    }

    #[test]
    fn queues_keep_the_live_window() {
        let mut storage: Vec<Task> = (0..2 * PUSHED_PER_QUEUE).map(Task::build).collect();
        let ptrs: Vec<NonNull<Task>> = storage.iter_mut().map(NonNull::from).collect();
        let queues = fill_queues(&ptrs);
        assert_eq!(queues.len(), 2);
        for (q, queue) in queues.iter().enumerate() {
            assert_eq!(queue.len(), PUSHED_PER_QUEUE - POPPED_PER_QUEUE);
            let front = unsafe { queue[0].as_ref() };
            assert_eq!(front.task_id as usize, q * 1000 + POPPED_PER_QUEUE);
        }
    }
}
