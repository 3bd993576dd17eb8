//! Ring buffers of task pointers with popped slots ahead of the live window.

use heapcensus_core::{Result, protocol};
use heapcensus_fixtures::objects::tasks::{
    POPPED_PER_QUEUE, PUSHED_PER_QUEUE, QUEUES, Task, fill_queues,
};
use heapcensus_fixtures::run_fixture;

fn main() -> Result<()> {
    run_fixture("deque_boundary", |run| {
        run.phase(&format!(
            "Allocating {QUEUES} queues: push {PUSHED_PER_QUEUE}, pop_front {POPPED_PER_QUEUE}"
        ))?;
        let tasks = run.objects::<Task>(QUEUES * PUSHED_PER_QUEUE)?;
        let queues = fill_queues(&tasks);
        let live: usize = queues.iter().map(|q| q.len()).sum();
        protocol::emit(&format!(
            "  Queues: {}, tasks in live windows: {live}, tasks allocated: {}\n",
            queues.len(),
            tasks.len()
        ))?;
        Ok(queues)
    })
}
