//! Objects stored in a `HashSet` hashed by id and a `HashMap<i32, *Item>`.

use heapcensus_core::{Result, protocol};
use heapcensus_fixtures::objects::hashed::{Enemy, Item, enemy_set, item_map};
use heapcensus_fixtures::run_fixture;
use heapcensus_fixtures::scenarios::{ENEMIES, ITEMS};

fn main() -> Result<()> {
    run_fixture("hash_sets", |run| {
        run.phase("Allocating Enemy instances into HashSet")?;
        let enemies = run.objects::<Enemy>(ENEMIES)?;
        // SAFETY: enemies are never freed.
        let set = unsafe { enemy_set(&enemies) };

        run.phase("Allocating Item instances into HashMap<i32, *Item>")?;
        let items = run.objects::<Item>(ITEMS)?;
        // SAFETY: items are never freed.
        let map = unsafe { item_map(&items) };
        protocol::emit(&format!(
            "  Set size: {} (vec: {}), map size: {} (vec: {})\n",
            set.len(),
            enemies.len(),
            map.len(),
            items.len()
        ))?;
        Ok((set, map))
    })
}
