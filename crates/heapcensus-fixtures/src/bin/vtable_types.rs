//! Single-inheritance objects with distinct dispatch tables, plus one
//! contiguous array of 200 dogs in a single allocation.

use heapcensus_core::{GroupLayout, Result, protocol};
use heapcensus_fixtures::objects::animals::{Cat, Dog, GoldFish};
use heapcensus_fixtures::run_fixture;
use heapcensus_fixtures::scenarios::{CATS, DOG_ARRAY_LEN, DOGS, FISH};

fn main() -> Result<()> {
    run_fixture("vtable_types", |run| {
        run.phase("Allocating Dog instances")?;
        run.objects::<Dog>(DOGS)?;

        run.phase("Allocating Cat instances")?;
        run.objects::<Cat>(CATS)?;

        run.phase("Allocating GoldFish instances")?;
        run.objects::<GoldFish>(FISH)?;

        run.phase(&format!("Allocating Dog[{DOG_ARRAY_LEN}] array"))?;
        let arrays = run.grouped::<Dog>(DOG_ARRAY_LEN, 1, GroupLayout::Full)?;
        for first in &arrays {
            for slot in 0..DOG_ARRAY_LEN {
                // SAFETY: the block holds DOG_ARRAY_LEN constructed dogs and
                // `Dog` has no drop glue.
                unsafe { first.as_ptr().add(slot).write(Dog::array_element(slot)) };
            }
        }

        protocol::emit(&format!(
            "\n  sizeof(Dog)      = {}\n  sizeof(Cat)      = {}\n  sizeof(GoldFish) = {}\n",
            size_of::<Dog>(),
            size_of::<Cat>(),
            size_of::<GoldFish>()
        ))?;
        Ok(())
    })
}
