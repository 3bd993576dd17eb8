//! 80000 dispatch-only objects plus 80000 blocks each of 16, 32 and 64 bytes.

use heapcensus_core::Result;
use heapcensus_fixtures::objects::marker::Marker;
use heapcensus_fixtures::run_fixture;
use heapcensus_fixtures::scenarios::{self, MARKERS, SMALL_BLOCKS};

fn main() -> Result<()> {
    run_fixture("basic_malloc", |run| {
        run.phase("Allocating Marker instances")?;
        run.objects::<Marker>(MARKERS)?;

        run.phase("Allocating malloc blocks")?;
        run.blocks(&scenarios::classes(&SMALL_BLOCKS)?)?;
        Ok(())
    })
}
