//! Objects indexed by a `BTreeMap`, a `BTreeSet`, and a string-keyed map.

use heapcensus_core::{Result, protocol};
use heapcensus_fixtures::objects::ordered::{
    Monster, Weapon, config_map, monster_index, weapon_set,
};
use heapcensus_fixtures::run_fixture;
use heapcensus_fixtures::scenarios::{CONFIG_ENTRIES, MONSTERS, WEAPONS};

fn main() -> Result<()> {
    run_fixture("ordered_maps", |run| {
        run.phase("Allocating Monster instances into BTreeMap<i32, *Monster>")?;
        let monsters = run.objects::<Monster>(MONSTERS)?;
        // SAFETY: monsters are never freed.
        let by_id = unsafe { monster_index(&monsters) };

        run.phase("Allocating Weapon instances into BTreeSet<*Weapon>")?;
        let weapons = weapon_set(&run.objects::<Weapon>(WEAPONS)?);

        run.phase("Building BTreeMap<String, i32>")?;
        let config = config_map(CONFIG_ENTRIES);
        protocol::emit(&format!(
            "  Map sizes: monsters={}, weapons={}, config={}\n",
            by_id.len(),
            weapons.len(),
            config.len()
        ))?;
        Ok((by_id, weapons, config))
    })
}
