//! Reference-counted and uniquely owned heap objects.
//!
//! `Arc` and `Rc` put their counters in front of the value inside a single
//! allocation, so the census key for a shared `T` covers both counter words.

use std::rc::Rc;
use std::sync::Arc;

use heapcensus_core::{CensusKey, TypedObject};

use crate::dispatch::VPtr;
use crate::vtable;

fn player_drop() -> &'static str {
    "~Player"
}

fn bullet_drop() -> &'static str {
    "~Bullet"
}

fn effect_drop() -> &'static str {
    "~Effect"
}

vtable!(_ZTV6Player, _ZTI6Player, "Player", [player_drop]);
vtable!(_ZTV6Bullet, _ZTI6Bullet, "Bullet", [bullet_drop]);
vtable!(_ZTV6Effect, _ZTI6Effect, "Effect", [effect_drop]);

/// Every n-th shared effect gets a second owner.
pub const EFFECT_SHARE_EVERY: usize = 4;

#[repr(C)]
pub struct Player {
    vptr: VPtr,
    pub id: i32,
    pub hp: f64,
    pub mp: f64,
    pub name: [u8; 32],
}

#[repr(C)]
pub struct Bullet {
    vptr: VPtr,
    pub bullet_id: i32,
    pub speed: f64,
    pub damage: f64,
}

#[repr(C)]
pub struct Effect {
    vptr: VPtr,
    pub effect_id: i32,
    pub duration: i32,
    pub power: f64,
}

fn player_name(index: usize) -> [u8; 32] {
    let mut out = [0u8; 32];
    let text = format!("player_{index:05}");
    out[..text.len()].copy_from_slice(text.as_bytes());
    out
}

impl TypedObject for Player {
    const TYPE_NAME: &'static str = "Player";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    fn build(index: usize) -> Self {
        Self {
            vptr: _ZTV6Player.vptr(),
            id: index as i32,
            hp: 100.0 + index as f64,
            mp: 50.0 + index as f64,
            name: player_name(index),
        }
    }
}

impl TypedObject for Bullet {
    const TYPE_NAME: &'static str = "Bullet";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    fn build(index: usize) -> Self {
        Self {
            vptr: _ZTV6Bullet.vptr(),
            bullet_id: index as i32,
            speed: 10.0 + index as f64 * 0.1,
            damage: 5.0 + index as f64 * 0.5,
        }
    }
}

impl TypedObject for Effect {
    const TYPE_NAME: &'static str = "Effect";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    fn build(index: usize) -> Self {
        Self {
            vptr: _ZTV6Effect.vptr(),
            effect_id: index as i32,
            duration: 10 + (index % 100) as i32,
            power: 1.0 + index as f64 * 0.01,
        }
    }
}

impl Player {
    #[must_use]
    pub fn vptr(&self) -> VPtr {
        self.vptr
    }
}

/// Key for a `T` living inside an `Arc`/`Rc` allocation (strong and weak
/// counters precede the value).
#[must_use]
pub fn shared_key<T: TypedObject>() -> CensusKey {
    CensusKey::object(T::TYPE_NAME, 2 * size_of::<usize>() + size_of::<T>())
}

/// Key for a `Box<T>`: the allocation is exactly the value.
#[must_use]
pub fn boxed_key<T: TypedObject>() -> CensusKey {
    CensusKey::object(T::TYPE_NAME, size_of::<T>())
}

#[must_use]
pub fn shared_players(count: usize) -> Vec<Arc<Player>> {
    (0..count).map(|i| Arc::new(Player::build(i))).collect()
}

#[must_use]
pub fn boxed_bullets(count: usize) -> Vec<Box<Bullet>> {
    (0..count).map(|i| Box::new(Bullet::build(i))).collect()
}

/// Build `count` shared effects. The second vector holds the extra owners of
/// every [`EFFECT_SHARE_EVERY`]-th effect.
#[must_use]
pub fn shared_effects(count: usize) -> (Vec<Rc<Effect>>, Vec<Rc<Effect>>) {
    let effects: Vec<Rc<Effect>> = (0..count).map(|i| Rc::new(Effect::build(i))).collect();
    let extra = effects
        .iter()
        .step_by(EFFECT_SHARE_EVERY)
        .map(Rc::clone)
        .collect();
    (effects, extra)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_account_for_counters() {
        assert_eq!(size_of::<Player>(), 64);
        assert_eq!(shared_key::<Player>(), CensusKey::object("Player", 80));
        assert_eq!(boxed_key::<Bullet>(), CensusKey::object("Bullet", 32));
        assert_eq!(shared_key::<Effect>().size(), 40);
    }

    #[test]
    fn effects_share_every_fourth() {
        let (effects, extra) = shared_effects(10);
        assert_eq!(extra.len(), 3);
        assert_eq!(Rc::strong_count(&effects[0]), 2);
        assert_eq!(Rc::strong_count(&effects[1]), 1);
        assert_eq!(Rc::strong_count(&effects[8]), 2);
    }

    #[test]
    fn players_carry_names() {
        let players = shared_players(2);
        assert_eq!(&players[1].name[..12], b"player_00001");
        assert_eq!(players[0].vptr().type_name(), "Player");
        assert_eq!(boxed_bullets(3)[2].bullet_id, 2);
    }
}
