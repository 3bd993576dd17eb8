//! Objects with one, two and three dispatch pointers at fixed offsets.

use heapcensus_core::{Result, TypedObject, protocol};
use heapcensus_fixtures::objects::entities::{GameObject, NetworkEntity, SimpleNpc};
use heapcensus_fixtures::run_fixture;
use heapcensus_fixtures::scenarios::{GAME_OBJECTS, NETWORK_ENTITIES, SIMPLE_NPCS};

fn layout_line<T: TypedObject>() -> String {
    format!(
        "  {:<14} {:>3} bytes, dispatch pointers at {:?}\n",
        T::TYPE_NAME,
        size_of::<T>(),
        T::DISPATCH_OFFSETS
    )
}

fn main() -> Result<()> {
    run_fixture("multi_inherit", |run| {
        run.phase("Allocating GameObject instances (2 bases)")?;
        run.objects::<GameObject>(GAME_OBJECTS)?;

        run.phase("Allocating NetworkEntity instances (3 bases)")?;
        run.objects::<NetworkEntity>(NETWORK_ENTITIES)?;

        run.phase("Allocating SimpleNpc instances (1 base)")?;
        run.objects::<SimpleNpc>(SIMPLE_NPCS)?;

        protocol::emit("\nObject layouts:\n")?;
        protocol::emit(&layout_line::<GameObject>())?;
        protocol::emit(&layout_line::<NetworkEntity>())?;
        protocol::emit(&layout_line::<SimpleNpc>())?;
        Ok(())
    })
}
