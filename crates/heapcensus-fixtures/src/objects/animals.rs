//! Single-inheritance hierarchy: `Animal` with three concrete kinds.
//!
//! Every concrete type starts with the `Animal` prefix (dispatch pointer,
//! `id`), so a `&Dog` is also a valid `&Animal`.

use heapcensus_core::TypedObject;

use crate::dispatch::VPtr;
use crate::vtable;

fn dog_speak() -> &'static str {
    "woof"
}

fn cat_speak() -> &'static str {
    "meow"
}

fn fish_speak() -> &'static str {
    "blub"
}

fn animal_kind() -> &'static str {
    "animal"
}

vtable!(_ZTV3Dog, _ZTI3Dog, "Dog", [dog_speak, animal_kind]);
vtable!(_ZTV3Cat, _ZTI3Cat, "Cat", [cat_speak, animal_kind]);
vtable!(_ZTV8GoldFish, _ZTI8GoldFish, "GoldFish", [fish_speak, animal_kind]);

/// Common prefix of every animal.
#[repr(C)]
pub struct Animal {
    vptr: VPtr,
    pub id: i32,
}

impl Animal {
    #[must_use]
    pub fn speak(&self) -> &'static str {
        // SAFETY: every animal table has at least two slots.
        unsafe { self.vptr.call(0) }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.vptr.type_name()
    }
}

macro_rules! as_animal {
    ($ty:ty) => {
        impl AsRef<Animal> for $ty {
            fn as_ref(&self) -> &Animal {
                // SAFETY: `repr(C)` types sharing the `Animal` field prefix.
                unsafe { &*std::ptr::from_ref(self).cast::<Animal>() }
            }
        }
    };
}

#[repr(C)]
pub struct Dog {
    vptr: VPtr,
    pub id: i32,
    pub breed: i32,
}

#[repr(C)]
pub struct Cat {
    vptr: VPtr,
    pub id: i32,
    pub color: i32,
}

#[repr(C)]
pub struct GoldFish {
    vptr: VPtr,
    pub id: i32,
    pub tank_id: i32,
    pub weight: f32,
}

as_animal!(Dog);
as_animal!(Cat);
as_animal!(GoldFish);

/// First id handed to cats; dogs use `0..CAT_ID_BASE`.
pub const CAT_ID_BASE: i32 = 10_000;
pub const FISH_ID_BASE: i32 = 15_000;
/// Ids of the contiguous dog array.
pub const DOG_ARRAY_ID_BASE: i32 = 100_000;

impl TypedObject for Dog {
    const TYPE_NAME: &'static str = "Dog";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    fn build(index: usize) -> Self {
        Self {
            vptr: _ZTV3Dog.vptr(),
            id: index as i32,
            breed: (index % 50) as i32,
        }
    }
}

impl Dog {
    /// Element of the contiguous array.
    #[must_use]
    pub fn array_element(slot: usize) -> Self {
        Self {
            vptr: _ZTV3Dog.vptr(),
            id: DOG_ARRAY_ID_BASE + slot as i32,
            breed: (slot % 10) as i32,
        }
    }
}

impl TypedObject for Cat {
    const TYPE_NAME: &'static str = "Cat";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    fn build(index: usize) -> Self {
        Self {
            vptr: _ZTV3Cat.vptr(),
            id: CAT_ID_BASE + index as i32,
            color: (index % 10) as i32,
        }
    }
}

impl TypedObject for GoldFish {
    const TYPE_NAME: &'static str = "GoldFish";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    fn build(index: usize) -> Self {
        Self {
            vptr: _ZTV8GoldFish.vptr(),
            id: FISH_ID_BASE + index as i32,
            tank_id: (index % 100) as i32,
            weight: 0.5 + (index % 20) as f32 * 0.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_the_native_layout() {
        assert_eq!(size_of::<Dog>(), 16);
        assert_eq!(size_of::<Cat>(), 16);
        assert_eq!(size_of::<GoldFish>(), 24);
    }

    #[test]
    fn dispatch_through_the_prefix() {
        let dog = Dog::build(3);
        let cat = Cat::build(1);
        let fish = GoldFish::build(2);
        assert_eq!(AsRef::<Animal>::as_ref(&dog).speak(), "woof");
        assert_eq!(AsRef::<Animal>::as_ref(&cat).speak(), "meow");
        let animal: &Animal = fish.as_ref();
        assert_eq!(animal.speak(), "blub");
        assert_eq!(animal.type_name(), "GoldFish");
        assert_eq!(animal.id, FISH_ID_BASE + 2);
    }

    #[test]
    fn array_elements_use_their_own_ids() {
        let d = Dog::array_element(7);
        assert_eq!((d.id, d.breed), (DOG_ARRAY_ID_BASE + 7, 7));
    }
}
