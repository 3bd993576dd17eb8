//! Raw allocator seam.
//!
//! Census blocks go through `malloc`/`free` so that the backing allocator can
//! be swapped with `LD_PRELOAD`. Nothing here names a specific allocator.

#![allow(unsafe_code)]

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

/// Alignment guaranteed by `malloc` for every request on the supported
/// 64-bit targets (`alignof(max_align_t)`).
pub const MALLOC_MIN_ALIGN: usize = 16;

/// One allocate/release pair of the platform dynamic-allocation entry point.
pub trait RawAllocator: Send + Sync {
    /// Allocate `size` bytes. `None` means the allocator reported failure.
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// Return a block to the allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`RawAllocator::allocate`] on this allocator with
    /// the same `size`, and must not have been released already.
    unsafe fn release(&self, ptr: NonNull<u8>, size: usize);
}

/// `libc::malloc` / `libc::free`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMalloc;

impl RawAllocator for SystemMalloc {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        // SAFETY: malloc has no preconditions; a null return is handled.
        let raw = unsafe { libc::malloc(size) };
        NonNull::new(raw.cast::<u8>())
    }

    unsafe fn release(&self, ptr: NonNull<u8>, _size: usize) {
        // SAFETY: caller guarantees `ptr` is a live malloc block.
        unsafe { libc::free(ptr.as_ptr().cast()) };
    }
}

/// Wraps another allocator and counts calls. Optionally starts failing after
/// a fixed number of successful allocations.
#[derive(Debug, Default)]
pub struct CountingMalloc<A: RawAllocator = SystemMalloc> {
    inner: A,
    allocations: AtomicU64,
    releases: AtomicU64,
    fail_after: Option<u64>,
}

impl CountingMalloc<SystemMalloc> {
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(SystemMalloc)
    }
}

impl<A: RawAllocator> CountingMalloc<A> {
    #[must_use]
    pub fn wrap(inner: A) -> Self {
        Self {
            inner,
            allocations: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            fail_after: None,
        }
    }

    /// Report failure for every allocation after the first `successes`.
    #[must_use]
    pub fn failing_after(mut self, successes: u64) -> Self {
        self.fail_after = Some(successes);
        self
    }

    /// Number of allocator calls made (including failed ones).
    #[must_use]
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::Relaxed)
    }

    /// Allocations not yet released.
    #[must_use]
    pub fn live(&self) -> u64 {
        self.allocations().saturating_sub(self.releases())
    }
}

impl<A: RawAllocator> RawAllocator for CountingMalloc<A> {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let prior = self.allocations.fetch_add(1, Ordering::Relaxed);
        if self.fail_after.is_some_and(|limit| prior >= limit) {
            return None;
        }
        self.inner.allocate(size)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) {
        self.releases.fetch_add(1, Ordering::Relaxed);
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.release(ptr, size) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_malloc_honors_min_alignment() {
        let alloc = SystemMalloc;
        let ptr = alloc.allocate(24).expect("malloc(24)");
        assert_eq!(ptr.as_ptr() as usize % MALLOC_MIN_ALIGN, 0);
        unsafe { alloc.release(ptr, 24) };
    }

    #[test]
    fn counting_tracks_calls() {
        let alloc = CountingMalloc::new();
        let a = alloc.allocate(16).unwrap();
        let b = alloc.allocate(32).unwrap();
        unsafe { alloc.release(a, 16) };
        assert_eq!(alloc.allocations(), 2);
        assert_eq!(alloc.releases(), 1);
        assert_eq!(alloc.live(), 1);
        unsafe { alloc.release(b, 32) };
        assert_eq!(alloc.live(), 0);
    }

    #[test]
    fn failing_after_limit_returns_none() {
        let alloc = CountingMalloc::new().failing_after(2);
        let a = alloc.allocate(16).unwrap();
        let b = alloc.allocate(16).unwrap();
        assert!(alloc.allocate(16).is_none());
        assert!(alloc.allocate(16).is_none());
        assert_eq!(alloc.allocations(), 4);
        unsafe {
            alloc.release(a, 16);
            alloc.release(b, 16);
        }
    }
}
