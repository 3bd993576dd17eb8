//! Every allocator size-class family: small, medium and large blocks with
//! their fill patterns, followed by allocator statistics.

use heapcensus_core::Result;
use heapcensus_fixtures::objects::marker::Marker;
use heapcensus_fixtures::run_fixture;
use heapcensus_fixtures::scenarios::{self, LARGE_BLOCKS, MARKERS, MEDIUM_BLOCKS, SMALL_BLOCKS};

fn main() -> Result<()> {
    run_fixture("allocator_census", |run| {
        run.phase("Allocating Marker instances")?;
        run.objects::<Marker>(MARKERS)?;

        run.phase("Allocating small blocks (16/32/64 bytes)")?;
        run.blocks(&scenarios::classes(&SMALL_BLOCKS)?)?;

        run.phase("Allocating medium blocks (128-1024 bytes)")?;
        run.blocks(&scenarios::classes(&MEDIUM_BLOCKS)?)?;

        run.phase("Allocating large blocks (1-3 MB)")?;
        run.blocks(&scenarios::classes(&LARGE_BLOCKS)?)?;
        Ok(())
    })
}
