//! Objects indexed by ordered maps and sets.

use std::collections::{BTreeMap, BTreeSet};
use std::ptr::NonNull;

use heapcensus_core::TypedObject;

use crate::dispatch::VPtr;
use crate::vtable;

fn monster_drop() -> &'static str {
    "~Monster"
}

fn weapon_drop() -> &'static str {
    "~Weapon"
}

vtable!(_ZTV7Monster, _ZTI7Monster, "Monster", [monster_drop]);
vtable!(_ZTV6Weapon, _ZTI6Weapon, "Weapon", [weapon_drop]);

#[repr(C)]
pub struct Monster {
    vptr: VPtr,
    pub id: i32,
    pub hp: f64,
    pub attack: f64,
    pub ai_state: *const u8,
}

#[repr(C)]
pub struct Weapon {
    vptr: VPtr,
    pub weapon_id: i32,
    pub damage: i32,
    pub name: [u8; 32],
}

impl TypedObject for Monster {
    const TYPE_NAME: &'static str = "Monster";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    fn build(index: usize) -> Self {
        Self {
            vptr: _ZTV7Monster.vptr(),
            id: index as i32,
            hp: 100.0 + index as f64,
            attack: 10.0 + index as f64 * 0.5,
            ai_state: std::ptr::null(),
        }
    }
}

impl TypedObject for Weapon {
    const TYPE_NAME: &'static str = "Weapon";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    fn build(index: usize) -> Self {
        let mut name = [0u8; 32];
        let text = format!("weapon_{index:04}");
        name[..text.len()].copy_from_slice(text.as_bytes());
        Self {
            vptr: _ZTV6Weapon.vptr(),
            weapon_id: index as i32,
            damage: 50 + index as i32,
            name,
        }
    }
}

impl Monster {
    #[must_use]
    pub fn vptr(&self) -> VPtr {
        self.vptr
    }
}

/// Monsters keyed by id.
///
/// # Safety
///
/// Every pointer must reference a live `Monster`.
#[must_use]
pub unsafe fn monster_index(monsters: &[NonNull<Monster>]) -> BTreeMap<i32, NonNull<Monster>> {
    monsters
        .iter()
        // SAFETY: forwarded caller contract.
        .map(|&m| (unsafe { m.as_ref() }.id, m))
        .collect()
}

/// Weapons ordered by address.
#[must_use]
pub fn weapon_set(weapons: &[NonNull<Weapon>]) -> BTreeSet<NonNull<Weapon>> {
    weapons.iter().copied().collect()
}

/// String-keyed settings map with heap-allocated keys.
#[must_use]
pub fn config_map(count: usize) -> BTreeMap<String, i32> {
    (0..count)
        .map(|i| (format!("config_key_{i:05}_padding"), i as i32 * 10))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_cover_every_object() {
        let mut monsters: Vec<Monster> = (0..50).map(Monster::build).collect();
        let ptrs: Vec<NonNull<Monster>> = monsters.iter_mut().map(NonNull::from).collect();
        let index = unsafe { monster_index(&ptrs) };
        assert_eq!(index.len(), 50);
        assert_eq!(unsafe { index[&49].as_ref() }.hp, 149.0);

        let mut weapons: Vec<Weapon> = (0..30).map(Weapon::build).collect();
        let wptrs: Vec<NonNull<Weapon>> = weapons.iter_mut().map(NonNull::from).collect();
        assert_eq!(weapon_set(&wptrs).len(), 30);
        assert_eq!(&weapons[7].name[..11], b"weapon_0007");

        let config = config_map(2000);
        assert_eq!(config.len(), 2000);
        assert_eq!(config["config_key_01999_padding"], 19990);
        assert_eq!(size_of::<Monster>(), 40);
        assert_eq!(monsters[0].vptr().type_name(), "Monster");
    }
}
