use heapcensus_core::TypedObject;

use crate::dispatch::VPtr;
use crate::vtable;

fn marker_func() -> &'static str {
    "marker"
}

vtable!(_ZTV6Marker, _ZTI6Marker, "Marker", [marker_func]);

/// Smallest polymorphic object: nothing but a dispatch pointer.
#[repr(C)]
pub struct Marker {
    vptr: VPtr,
}

impl Marker {
    #[must_use]
    pub fn vptr(&self) -> VPtr {
        self.vptr
    }
}

impl TypedObject for Marker {
    const TYPE_NAME: &'static str = "Marker";
    const DISPATCH_OFFSETS: &'static [usize] = &[0];

    fn build(_: usize) -> Self {
        Self {
            vptr: _ZTV6Marker.vptr(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_is_one_pointer() {
        assert_eq!(size_of::<Marker>(), size_of::<usize>());
        assert_eq!(Marker::build(0).vptr().type_name(), "Marker");
    }
}
