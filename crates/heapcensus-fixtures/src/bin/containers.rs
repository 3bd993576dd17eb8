//! Objects owning a vector, a hash map, a ring buffer and a linked list.

use heapcensus_core::Result;
use heapcensus_fixtures::objects::containers::{Gadget, Session, TaskQueue};
use heapcensus_fixtures::run_fixture;
use heapcensus_fixtures::scenarios::{GADGETS, SESSIONS, TASK_QUEUES};

fn main() -> Result<()> {
    run_fixture("containers", |run| {
        run.phase("Allocating Gadget instances (Vec<Box<i32>> + String)")?;
        run.objects::<Gadget>(GADGETS)?;

        run.phase("Allocating Session instances (HashMap<i32, String>)")?;
        run.objects::<Session>(SESSIONS)?;

        run.phase("Allocating TaskQueue instances (VecDeque + LinkedList)")?;
        run.objects::<TaskQueue>(TASK_QUEUES)?;
        Ok(())
    })
}
