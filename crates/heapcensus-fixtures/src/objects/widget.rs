//! Widget used for N-instances-in-one-block placement.

use heapcensus_core::TypedObject;

use crate::dispatch::VPtr;
use crate::vtable;

fn widget_drop() -> &'static str {
    "~Widget"
}

vtable!(_ZTV6Widget, _ZTI6Widget, "Widget", [widget_drop]);

#[repr(C)]
pub struct Widget {
    vptr: VPtr,
    pub id: i32,
    pub value: f64,
    pub reference: *const u8,
}

impl Widget {
    #[must_use]
    pub fn vptr(&self) -> VPtr {
        self.vptr
    }
}

impl TypedObject for Widget {
    const TYPE_NAME: &'static str = "Widget";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    fn build(index: usize) -> Self {
        Self {
            vptr: _ZTV6Widget.vptr(),
            id: index as i32,
            value: 0.0,
            reference: std::ptr::null(),
        }
    }
}

/// Block sizes (instances per allocation) exercised by the split fixture,
/// with their allocation counts and id bases.
pub const SPLIT_GROUPS: [(usize, usize, i32); 4] = [
    (2, 3_000, 0),
    (3, 3_000, 200_000),
    (5, 2_000, 500_000),
    (8, 1_000, 800_000),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widget_matches_native_size() {
        assert_eq!(size_of::<Widget>(), 32);
    }

    #[test]
    fn split_groups_total_nine_thousand_blocks() {
        assert_eq!(SPLIT_GROUPS.iter().map(|g| g.1).sum::<usize>(), 9_000);
    }
}
