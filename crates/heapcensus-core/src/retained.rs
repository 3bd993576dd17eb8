//! Process-wide retained collection.
//!
//! Every census address ends up here and stays reachable until the process
//! is killed after coredump capture. Ownership moves in exactly once per
//! producer, under the single lock.

#![allow(unsafe_code)]

use std::collections::{BTreeMap, HashSet};
use std::ptr::NonNull;

use parking_lot::Mutex;

use crate::alloc::RawAllocator;
use crate::census::CensusKey;

#[derive(Debug, Default)]
pub struct RetainedCollection {
    buckets: Mutex<BTreeMap<CensusKey, Vec<usize>>>,
}

impl RetainedCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size a bucket so that publishing does not reallocate the address
    /// vector while producers hand over their blocks.
    pub fn reserve(&self, key: &CensusKey, additional: usize) {
        let mut buckets = self.buckets.lock();
        buckets.entry(key.clone()).or_default().reserve(additional);
    }

    /// Move one producer's addresses into a bucket.
    pub fn publish(&self, key: CensusKey, addresses: Vec<usize>) {
        self.publish_batch([(key, addresses)]);
    }

    /// Move several buckets in with a single lock acquisition.
    pub fn publish_batch<I>(&self, batches: I)
    where
        I: IntoIterator<Item = (CensusKey, Vec<usize>)>,
    {
        let mut buckets = self.buckets.lock();
        for (key, mut addresses) in batches {
            let bucket = buckets.entry(key).or_default();
            if bucket.is_empty() && bucket.capacity() < addresses.len() {
                std::mem::swap(bucket, &mut addresses);
            } else {
                bucket.append(&mut addresses);
            }
        }
    }

    #[must_use]
    pub fn count(&self, key: &CensusKey) -> usize {
        self.buckets.lock().get(key).map_or(0, Vec::len)
    }

    /// Snapshot of per-bucket counts.
    #[must_use]
    pub fn counts(&self) -> BTreeMap<CensusKey, usize> {
        self.buckets
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.len()))
            .collect()
    }

    /// Copy of one bucket's addresses.
    #[must_use]
    pub fn addresses(&self, key: &CensusKey) -> Vec<usize> {
        self.buckets.lock().get(key).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.buckets.lock().values().map(Vec::len).sum()
    }

    /// Total user bytes pinned by all buckets.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.buckets
            .lock()
            .iter()
            .map(|(k, v)| k.size() * v.len())
            .sum()
    }

    /// Number of addresses that appear more than once across all buckets.
    #[must_use]
    pub fn duplicate_addresses(&self) -> usize {
        let buckets = self.buckets.lock();
        let mut seen = HashSet::with_capacity(buckets.values().map(Vec::len).sum());
        buckets
            .values()
            .flatten()
            .filter(|&&addr| !seen.insert(addr))
            .count()
    }

    /// Hand every block back to `allocator` and empty the collection.
    ///
    /// Fixtures never call this; tests and benchmarks do.
    ///
    /// # Safety
    ///
    /// Every retained address must be a live block from `allocator` whose
    /// size equals its bucket's [`CensusKey::size`], and no other owner may
    /// still use it. Typed objects are not dropped.
    pub unsafe fn release_all<A: RawAllocator + ?Sized>(&self, allocator: &A) {
        let drained = std::mem::take(&mut *self.buckets.lock());
        for (key, addresses) in drained {
            for addr in addresses {
                if let Some(ptr) = NonNull::new(addr as *mut u8) {
                    // SAFETY: forwarded caller contract.
                    unsafe { allocator.release(ptr, key.size()) };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_accumulates_per_key() {
        let retained = RetainedCollection::new();
        retained.publish(CensusKey::block(16), vec![0x1000, 0x1010]);
        retained.publish(CensusKey::block(16), vec![0x1020]);
        retained.publish(CensusKey::block(32), vec![0x2000]);
        assert_eq!(retained.count(&CensusKey::block(16)), 3);
        assert_eq!(retained.count(&CensusKey::block(32)), 1);
        assert_eq!(retained.count(&CensusKey::block(64)), 0);
        assert_eq!(retained.total(), 4);
        assert_eq!(retained.total_bytes(), 3 * 16 + 32);
    }

    #[test]
    fn reserved_bucket_keeps_capacity_on_first_publish() {
        let retained = RetainedCollection::new();
        let key = CensusKey::block(64);
        retained.reserve(&key, 100);
        retained.publish(key.clone(), vec![1, 2, 3]);
        assert_eq!(retained.addresses(&key), vec![1, 2, 3]);
        assert!(retained.buckets.lock()[&key].capacity() >= 100);
    }

    #[test]
    fn duplicates_are_detected_across_buckets() {
        let retained = RetainedCollection::new();
        retained.publish(CensusKey::block(16), vec![0x10, 0x20]);
        assert_eq!(retained.duplicate_addresses(), 0);
        retained.publish(CensusKey::object("A", 8), vec![0x20]);
        assert_eq!(retained.duplicate_addresses(), 1);
    }

    #[test]
    fn release_all_returns_every_block() {
        let alloc = crate::alloc::CountingMalloc::new();
        let retained = RetainedCollection::new();
        let addrs: Vec<usize> = (0..10)
            .map(|_| alloc.allocate(48).unwrap().as_ptr() as usize)
            .collect();
        retained.publish(CensusKey::block(48), addrs);
        unsafe { retained.release_all(&alloc) };
        assert_eq!(alloc.live(), 0);
        assert_eq!(retained.total(), 0);
    }
}
