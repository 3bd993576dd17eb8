//! Typed objects constructed in place over raw allocations.
//!
//! The engine never looks inside an object: a variant declares its name,
//! its layout (through `Self`) and where its dispatch pointers live, and
//! builds its own field values.

use std::alloc::Layout;

use crate::alloc::MALLOC_MIN_ALIGN;
use crate::census::CensusKey;
use crate::error::{CensusError, Result};

pub trait TypedObject: Sized {
    /// Name the analyzer is expected to recover for this type.
    const TYPE_NAME: &'static str;

    /// Byte offsets of dispatch-table pointers inside the object. The
    /// primary one, when present, sits at offset 0. Types without any are
    /// plain data and are censused as untyped blocks of their size.
    const DISPATCH_OFFSETS: &'static [usize] = &[];

    /// Field values for the `index`-th instance.
    fn build(index: usize) -> Self;
}

/// Census key for one-object-per-allocation placement of `T`.
#[must_use]
pub fn object_key<T: TypedObject>() -> CensusKey {
    let size = std::mem::size_of::<T>();
    if T::DISPATCH_OFFSETS.is_empty() {
        return CensusKey::block(size);
    }
    CensusKey::object(T::TYPE_NAME, size)
}

/// Census key for `per_block` instances of `T` in one allocation.
#[must_use]
pub fn grouped_key<T: TypedObject>(per_block: usize) -> CensusKey {
    let size = std::mem::size_of::<T>();
    if T::DISPATCH_OFFSETS.is_empty() {
        return CensusKey::block(per_block.saturating_mul(size));
    }
    CensusKey::grouped(T::TYPE_NAME, per_block, size)
}

/// Layout check: `T` must be non-empty and no stricter than what `malloc`
/// guarantees, and its dispatch offsets must lie inside the object.
pub fn placement_layout<T: TypedObject>() -> Result<Layout> {
    let layout = Layout::new::<T>();
    let pointer = std::mem::size_of::<usize>();
    let offsets_ok = T::DISPATCH_OFFSETS
        .iter()
        .all(|&off| off % pointer == 0 && off + pointer <= layout.size());
    if layout.size() == 0 || layout.align() > MALLOC_MIN_ALIGN || !offsets_ok {
        return Err(CensusError::InvalidLayout {
            type_name: T::TYPE_NAME,
            size: layout.size(),
            align: layout.align(),
        });
    }
    Ok(layout)
}
