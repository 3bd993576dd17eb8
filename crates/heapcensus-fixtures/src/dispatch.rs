//! Itanium-layout dispatch tables for the fixture object types.
//!
//! A table is `[offset_to_top, type_info, slot0, slot1, ..]` and an object's
//! dispatch pointer addresses `slot0`, exactly as a C++ compiler lays it out.
//! Tables and type records are exported under their Itanium mangled names
//! (`_ZTV3Dog`, `_ZTI3Dog`) so that symbol lookup on a dispatch pointer
//! yields "vtable for Dog".

#![allow(unsafe_code)]

use std::ptr::NonNull;

/// Virtual slot. Fixture virtuals are stateless.
pub type Slot = fn() -> &'static str;

/// Minimal `type_info`: the demangled class name.
#[repr(C)]
pub struct TypeInfo {
    pub name: &'static str,
}

#[repr(C)]
pub struct VtableHeader {
    /// Zero for a primary table, minus the subobject offset for a secondary one.
    pub offset_to_top: isize,
    pub type_info: &'static TypeInfo,
}

#[repr(C)]
pub struct Vtable<const N: usize> {
    pub header: VtableHeader,
    pub slots: [Slot; N],
}

impl<const N: usize> Vtable<N> {
    /// Dispatch pointer for this table.
    #[must_use]
    pub const fn vptr(&'static self) -> VPtr {
        VPtr(&self.slots[0])
    }
}

/// Dispatch pointer stored inside an object. Points at the first slot of a
/// [`Vtable`].
#[repr(transparent)]
#[derive(Clone, Copy)]
pub struct VPtr(&'static Slot);

impl VPtr {
    #[must_use]
    pub fn header(self) -> &'static VtableHeader {
        let first = std::ptr::from_ref(self.0).cast::<u8>();
        // SAFETY: every VPtr comes from `Vtable::vptr`, and `slots` directly
        // follows the pointer-aligned header inside the `repr(C)` table.
        unsafe { &*first.sub(size_of::<VtableHeader>()).cast::<VtableHeader>() }
    }

    #[must_use]
    pub fn type_name(self) -> &'static str {
        self.header().type_info.name
    }

    #[must_use]
    pub fn offset_to_top(self) -> isize {
        self.header().offset_to_top
    }

    /// Call slot `index`.
    ///
    /// # Safety
    ///
    /// `index` must be below the slot count of the table this pointer came
    /// from.
    #[must_use]
    pub unsafe fn call(self, index: usize) -> &'static str {
        // SAFETY: caller keeps `index` inside the slot array.
        let slot = unsafe { *std::ptr::from_ref(self.0).add(index) };
        slot()
    }

    #[must_use]
    pub fn as_usize(self) -> usize {
        std::ptr::from_ref(self.0) as usize
    }
}

/// Dispatch pointer stored at `offset` inside an object.
///
/// # Safety
///
/// `object` must point to a live fixture object with a dispatch pointer at
/// `offset` (one of its `DISPATCH_OFFSETS`).
#[must_use]
pub unsafe fn vptr_at(object: NonNull<u8>, offset: usize) -> VPtr {
    // SAFETY: forwarded caller contract; VPtr is a transparent reference.
    unsafe { object.as_ptr().add(offset).cast::<VPtr>().read() }
}

/// Start of the full object that owns the subobject at `sub`, found through
/// its dispatch pointer's `offset_to_top`.
///
/// # Safety
///
/// `sub` must point to a polymorphic subobject whose first field is its
/// dispatch pointer.
#[must_use]
pub unsafe fn top_of(sub: NonNull<u8>) -> NonNull<u8> {
    // SAFETY: forwarded caller contract.
    let offset = unsafe { vptr_at(sub, 0) }.offset_to_top();
    // SAFETY: `offset_to_top` stays within the owning object.
    unsafe { sub.offset(offset) }
}

/// Declare an exported single-inheritance table and its type record.
#[macro_export]
macro_rules! vtable {
    ($vtable:ident, $typeinfo:ident, $name:literal, [$($slot:expr),+ $(,)?]) => {
        #[unsafe(no_mangle)]
        #[allow(non_upper_case_globals)]
        pub static $typeinfo: $crate::dispatch::TypeInfo = $crate::dispatch::TypeInfo { name: $name };

        #[unsafe(no_mangle)]
        #[allow(non_upper_case_globals)]
        pub static $vtable: $crate::dispatch::Vtable<{ [$(stringify!($slot)),+].len() }> =
            $crate::dispatch::Vtable {
                header: $crate::dispatch::VtableHeader {
                    offset_to_top: 0,
                    type_info: &$typeinfo,
                },
                slots: [$($slot),+],
            };
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello() -> &'static str {
        "hello"
    }

    fn bye() -> &'static str {
        "bye"
    }

    static PROBE_INFO: TypeInfo = TypeInfo { name: "Probe" };
    static PROBE_TABLE: Vtable<2> = Vtable {
        header: VtableHeader {
            offset_to_top: -16,
            type_info: &PROBE_INFO,
        },
        slots: [hello, bye],
    };

    #[test]
    fn vptr_points_past_header() {
        let vptr = PROBE_TABLE.vptr();
        let table = std::ptr::from_ref(&PROBE_TABLE) as usize;
        assert_eq!(vptr.as_usize(), table + 2 * size_of::<usize>());
        assert_eq!(vptr.type_name(), "Probe");
        assert_eq!(vptr.offset_to_top(), -16);
        assert_eq!(unsafe { vptr.call(1) }, "bye");
    }

    #[test]
    fn vptr_is_one_word() {
        assert_eq!(size_of::<VPtr>(), size_of::<usize>());
    }
}
