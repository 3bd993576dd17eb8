//! Population generator: reach an exact census with no intermediate frees.
//!
//! One allocator call per instance. The only exception is grouped placement,
//! where several logical instances deliberately share one allocation.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use crate::alloc::RawAllocator;
use crate::census::CensusKey;
use crate::error::{CensusError, Result};
use crate::object::{TypedObject, grouped_key, object_key, placement_layout};
use crate::retained::RetainedCollection;
use crate::size_class::{SizeClass, fill_block};

/// Whether raw blocks get their size-class fill pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FillPolicy {
    /// Leave whatever the allocator handed out.
    Untouched,
    #[default]
    Pattern,
}

/// How a grouped allocation is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupLayout {
    /// Zero the block and construct only the first instance.
    Leading,
    /// Construct every instance (a contiguous array).
    Full,
}

/// Progress callback: `(done, total)`.
pub type Progress<'p> = &'p mut dyn FnMut(usize, usize);

pub struct PopulationGenerator<'a, A: RawAllocator + ?Sized> {
    allocator: &'a A,
    retained: &'a RetainedCollection,
    fill: FillPolicy,
    progress_every: usize,
}

impl<'a, A: RawAllocator + ?Sized> PopulationGenerator<'a, A> {
    #[must_use]
    pub fn new(allocator: &'a A, retained: &'a RetainedCollection) -> Self {
        Self {
            allocator,
            retained,
            fill: FillPolicy::default(),
            progress_every: 0,
        }
    }

    #[must_use]
    pub fn with_fill(mut self, fill: FillPolicy) -> Self {
        self.fill = fill;
        self
    }

    /// Invoke the progress callback every `every` instances (0 disables it).
    #[must_use]
    pub fn with_progress_every(mut self, every: usize) -> Self {
        self.progress_every = every;
        self
    }

    fn allocate(&self, size: usize, key: &CensusKey) -> Result<NonNull<u8>> {
        self.allocator
            .allocate(size)
            .ok_or_else(|| CensusError::AllocationFailure {
                size,
                key: key.clone(),
            })
    }

    fn tick(&self, done: usize, total: usize, progress: &mut Option<Progress<'_>>) {
        if self.progress_every > 0
            && done % self.progress_every == 0
            && let Some(cb) = progress.as_mut()
        {
            cb(done, total);
        }
    }

    fn fill(&self, ptr: NonNull<u8>, class: &SizeClass) {
        if self.fill == FillPolicy::Pattern {
            // SAFETY: `ptr` was just allocated with `class.size()` bytes.
            unsafe { fill_block(ptr, class.size(), class.fill_pattern()) };
        }
    }

    /// Allocate `class.target()` blocks of `class.size()` bytes.
    pub fn blocks(&self, class: SizeClass, mut progress: Option<Progress<'_>>) -> Result<usize> {
        let key = class.key();
        let mut owned = Vec::with_capacity(class.target());
        for i in 0..class.target() {
            let ptr = self.allocate(class.size(), &key)?;
            self.fill(ptr, &class);
            owned.push(ptr.as_ptr() as usize);
            self.tick(i + 1, class.target(), &mut progress);
        }
        let made = owned.len();
        self.retained.publish(key, owned);
        Ok(made)
    }

    /// Allocate several classes round-robin: instance `i` of every class is
    /// allocated before instance `i + 1` of any class, so the classes
    /// interleave in the heap the way a mixed workload would.
    pub fn interleaved_blocks(
        &self,
        classes: &[SizeClass],
        mut progress: Option<Progress<'_>>,
    ) -> Result<usize> {
        let rounds = classes.iter().map(SizeClass::target).max().unwrap_or(0);
        let keys: Vec<CensusKey> = classes.iter().map(SizeClass::key).collect();
        let mut owned: Vec<Vec<usize>> = classes
            .iter()
            .map(|c| Vec::with_capacity(c.target()))
            .collect();

        for round in 0..rounds {
            for (idx, class) in classes.iter().enumerate() {
                if round >= class.target() {
                    continue;
                }
                let ptr = self.allocate(class.size(), &keys[idx])?;
                self.fill(ptr, class);
                owned[idx].push(ptr.as_ptr() as usize);
            }
            self.tick(round + 1, rounds, &mut progress);
        }

        let made = owned.iter().map(Vec::len).sum();
        self.retained.publish_batch(keys.into_iter().zip(owned));
        Ok(made)
    }

    /// Construct `count` instances of `T`, one allocation each.
    ///
    /// Objects are never dropped; the returned pointers stay valid for the
    /// life of the process.
    pub fn objects<T: TypedObject>(
        &self,
        count: usize,
        mut progress: Option<Progress<'_>>,
    ) -> Result<Vec<NonNull<T>>> {
        let layout = placement_layout::<T>()?;
        let key = object_key::<T>();
        let mut placed = Vec::with_capacity(count);
        for i in 0..count {
            let obj = self.allocate(layout.size(), &key)?.cast::<T>();
            debug_assert_eq!(obj.as_ptr() as usize % layout.align(), 0);
            // SAFETY: fresh allocation of `size_of::<T>()` bytes with
            // sufficient alignment (checked by `placement_layout`).
            unsafe { obj.as_ptr().write(T::build(i)) };
            placed.push(obj);
            self.tick(i + 1, count, &mut progress);
        }
        self.retained
            .publish(key, placed.iter().map(|p| p.as_ptr() as usize).collect());
        Ok(placed)
    }

    /// Allocate `count` blocks, each holding room for `per_block` instances
    /// of `T`, initialized according to `layout`. Returns the first instance
    /// of each block.
    pub fn grouped<T: TypedObject>(
        &self,
        per_block: usize,
        count: usize,
        layout: GroupLayout,
        mut progress: Option<Progress<'_>>,
    ) -> Result<Vec<NonNull<T>>> {
        if per_block == 0 {
            return Err(CensusError::InvalidGroup { per_block });
        }
        let elem = placement_layout::<T>()?;
        if elem
            .size()
            .checked_mul(per_block)
            .is_none_or(|size| size > isize::MAX as usize)
        {
            return Err(CensusError::InvalidGroup { per_block });
        }
        let key = grouped_key::<T>(per_block);
        let block_size = key.size();
        let mut placed = Vec::with_capacity(count);
        for i in 0..count {
            let base = self.allocate(block_size, &key)?;
            let first = base.cast::<T>();
            // SAFETY: `base` covers `per_block * size_of::<T>()` bytes; every
            // slot is aligned because the element size is a multiple of its
            // alignment and the base honors `placement_layout`.
            unsafe {
                match layout {
                    GroupLayout::Leading => {
                        std::ptr::write_bytes(base.as_ptr(), 0, block_size);
                        first.as_ptr().write(T::build(i * per_block));
                    }
                    GroupLayout::Full => {
                        for slot in 0..per_block {
                            first.as_ptr().add(slot).write(T::build(i * per_block + slot));
                        }
                    }
                }
            }
            debug_assert_eq!(elem.size() * per_block, block_size);
            placed.push(first);
            self.tick(i + 1, count, &mut progress);
        }
        self.retained
            .publish(key, placed.iter().map(|p| p.as_ptr() as usize).collect());
        Ok(placed)
    }
}
