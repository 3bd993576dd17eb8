//! Size classes and their deterministic fill patterns.

use std::ptr::NonNull;

use serde::{Deserialize, Serialize};

use crate::census::CensusKey;
use crate::error::{CensusError, Result};

pub const KIB: usize = 1024;
pub const MIB: usize = 1024 * KIB;

/// Blocks up to this size are filled end to end; larger blocks only get
/// their first and last byte written.
pub const FULL_FILL_LIMIT: usize = 1024;

/// Pattern used for sizes outside the fixture table.
pub const DEFAULT_FILL: u8 = 0xFF;

/// An immutable (byte size, target count) allocation bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SizeClass {
    size: usize,
    target: usize,
}

impl SizeClass {
    pub fn new(size: usize, target: usize) -> Result<Self> {
        if size == 0 {
            return Err(CensusError::InvalidSizeClass);
        }
        Ok(Self { size, target })
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub const fn target(&self) -> usize {
        self.target
    }

    #[must_use]
    pub fn fill_pattern(&self) -> u8 {
        fill_pattern(self.size)
    }

    #[must_use]
    pub fn key(&self) -> CensusKey {
        CensusKey::block(self.size)
    }

    /// Total user bytes this class pins once fully populated.
    #[must_use]
    pub const fn total_bytes(&self) -> usize {
        self.size * self.target
    }
}

/// Fill byte for a block size. Distinct per fixture size class so that
/// content left behind by the allocator cannot pass for census data.
#[must_use]
pub const fn fill_pattern(size: usize) -> u8 {
    match size {
        16 => 0x11,
        32 => 0x22,
        64 => 0x33,
        128 => 0x44,
        256 => 0x55,
        512 => 0x66,
        1024 => 0x77,
        s if s == MIB => 0xAA,
        s if s == 2 * MIB => 0xBB,
        s if s == 3 * MIB => 0xCC,
        _ => DEFAULT_FILL,
    }
}

/// Human label for a block size (`16`, `1024`, `2MB`).
#[must_use]
pub fn size_label(size: usize) -> String {
    if size >= MIB && size % MIB == 0 {
        format!("{}MB", size / MIB)
    } else {
        size.to_string()
    }
}

/// Write `pattern` into a block.
///
/// # Safety
///
/// `ptr` must be valid for writes of `size` bytes and `size` must be non-zero.
pub unsafe fn fill_block(ptr: NonNull<u8>, size: usize, pattern: u8) {
    debug_assert!(size > 0);
    // SAFETY: caller guarantees `ptr` covers `size` writable bytes.
    unsafe {
        if size <= FULL_FILL_LIMIT {
            std::ptr::write_bytes(ptr.as_ptr(), pattern, size);
        } else {
            ptr.as_ptr().write(pattern);
            ptr.as_ptr().add(size - 1).write(pattern);
        }
    }
}

/// Check that a block still carries the pattern written by [`fill_block`].
///
/// # Safety
///
/// `ptr` must be valid for reads of `size` bytes and `size` must be non-zero.
#[must_use]
pub unsafe fn block_has_pattern(ptr: NonNull<u8>, size: usize, pattern: u8) -> bool {
    // SAFETY: caller guarantees `ptr` covers `size` readable bytes.
    unsafe {
        if size <= FULL_FILL_LIMIT {
            std::slice::from_raw_parts(ptr.as_ptr(), size)
                .iter()
                .all(|&b| b == pattern)
        } else {
            ptr.as_ptr().read() == pattern && ptr.as_ptr().add(size - 1).read() == pattern
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_class_is_rejected() {
        assert!(matches!(
            SizeClass::new(0, 10),
            Err(CensusError::InvalidSizeClass)
        ));
        assert!(SizeClass::new(16, 0).is_ok());
    }

    #[test]
    fn fixture_patterns_are_distinct() {
        let sizes = [16, 32, 64, 128, 256, 512, 1024, MIB, 2 * MIB, 3 * MIB];
        let mut seen: Vec<u8> = sizes.iter().map(|&s| fill_pattern(s)).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), sizes.len());
        assert!(!seen.contains(&DEFAULT_FILL));
        assert_eq!(fill_pattern(48), DEFAULT_FILL);
    }

    #[test]
    fn labels() {
        assert_eq!(size_label(1024), "1024");
        assert_eq!(size_label(MIB), "1MB");
        assert_eq!(size_label(3 * MIB), "3MB");
        assert_eq!(size_label(MIB + 1), "1048577");
    }

    #[test]
    fn small_blocks_fill_completely() {
        let mut buf = [0u8; 64];
        let ptr = NonNull::new(buf.as_mut_ptr()).unwrap();
        unsafe {
            fill_block(ptr, 64, 0x33);
            assert!(block_has_pattern(ptr, 64, 0x33));
        }
        assert!(buf.iter().all(|&b| b == 0x33));
    }

    #[test]
    fn large_blocks_only_mark_edges() {
        let mut buf = vec![0u8; 4096];
        let ptr = NonNull::new(buf.as_mut_ptr()).unwrap();
        unsafe { fill_block(ptr, 4096, 0xAA) };
        assert_eq!(buf[0], 0xAA);
        assert_eq!(buf[4095], 0xAA);
        assert!(buf[1..4095].iter().all(|&b| b == 0));
    }
}
