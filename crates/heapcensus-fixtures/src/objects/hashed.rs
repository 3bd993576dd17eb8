//! Objects stored in hash containers, hashed by their id field rather than
//! by address.

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;

use heapcensus_core::TypedObject;

use crate::dispatch::VPtr;
use crate::vtable;

fn enemy_drop() -> &'static str {
    "~Enemy"
}

fn item_drop() -> &'static str {
    "~Item"
}

vtable!(_ZTV5Enemy, _ZTI5Enemy, "Enemy", [enemy_drop]);
vtable!(_ZTV4Item, _ZTI4Item, "Item", [item_drop]);

#[repr(C)]
pub struct Enemy {
    vptr: VPtr,
    pub enemy_id: i32,
    pub hp: f64,
    pub attack: f64,
}

#[repr(C)]
pub struct Item {
    vptr: VPtr,
    pub item_id: i32,
    pub weight: f64,
    pub name: [u8; 32],
}

impl TypedObject for Enemy {
    const TYPE_NAME: &'static str = "Enemy";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    fn build(index: usize) -> Self {
        Self {
            vptr: _ZTV5Enemy.vptr(),
            enemy_id: index as i32,
            hp: 100.0 + index as f64,
            attack: 10.0 + index as f64 * 0.5,
        }
    }
}

impl TypedObject for Item {
    const TYPE_NAME: &'static str = "Item";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    fn build(index: usize) -> Self {
        let mut name = [0u8; 32];
        let text = format!("item_{index}");
        name[..text.len()].copy_from_slice(text.as_bytes());
        Self {
            vptr: _ZTV4Item.vptr(),
            item_id: index as i32,
            weight: 1.0 + index as f64 * 0.1,
            name,
        }
    }
}

impl Enemy {
    #[must_use]
    pub fn vptr(&self) -> VPtr {
        self.vptr
    }
}

/// Pointer to a live enemy, compared and hashed by `enemy_id`.
#[derive(Clone, Copy)]
pub struct EnemyRef(NonNull<Enemy>);

impl EnemyRef {
    /// # Safety
    ///
    /// `enemy` must stay valid for as long as the handle is used.
    #[must_use]
    pub unsafe fn new(enemy: NonNull<Enemy>) -> Self {
        Self(enemy)
    }

    fn id(self) -> i32 {
        // SAFETY: constructor contract.
        unsafe { self.0.as_ref() }.enemy_id
    }

    #[must_use]
    pub fn as_ptr(self) -> NonNull<Enemy> {
        self.0
    }
}

impl PartialEq for EnemyRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for EnemyRef {}

impl Hash for EnemyRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

/// # Safety
///
/// Every pointer must reference a live `Enemy` that outlives the set.
#[must_use]
pub unsafe fn enemy_set(enemies: &[NonNull<Enemy>]) -> HashSet<EnemyRef> {
    enemies
        .iter()
        // SAFETY: forwarded caller contract.
        .map(|&e| unsafe { EnemyRef::new(e) })
        .collect()
}

/// # Safety
///
/// Every pointer must reference a live `Item`.
#[must_use]
pub unsafe fn item_map(items: &[NonNull<Item>]) -> HashMap<i32, NonNull<Item>> {
    items
        .iter()
        // SAFETY: forwarded caller contract.
        .map(|&i| (unsafe { i.as_ref() }.item_id, i))
        .collect()
}
