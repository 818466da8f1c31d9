//! A tracking allocator that counts allocated bytes.
//!
//! Interposing on the global allocation entry point gives native code an
//! equivalent of managed-runtime heap accounting: a process-wide, monotonic
//! counter of bytes handed out by the allocator. The binary installs it
//! explicitly:
//!
//! ```ignore
//! #[global_allocator]
//! static GLOBAL: CountingAllocator = CountingAllocator::new();
//! ```
//!
//! Callers of [`HeapSampler`] must not depend on this particular technique;
//! it is one implementation of the allocation-sampling contract.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicU64, Ordering};

static ALLOCATED_BYTES: AtomicU64 = AtomicU64::new(0);

/// Global allocator wrapper that tracks cumulative allocated bytes.
///
/// Deallocations are not subtracted: the counter measures allocation
/// activity, not live heap size, and stays monotonic.
#[derive(Debug, Default)]
pub struct CountingAllocator;

impl CountingAllocator {
    /// Creates the allocator; `const` so it can back a `#[global_allocator]`
    /// static.
    pub const fn new() -> Self {
        Self
    }
}

// SAFETY: all methods delegate to `System`; the counter update does not
// touch the returned memory.
unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        ALLOCATED_BYTES.fetch_add(layout.size() as u64, Ordering::Relaxed);
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        ALLOCATED_BYTES.fetch_add(layout.size() as u64, Ordering::Relaxed);
        unsafe { System.alloc_zeroed(layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        // Only growth counts as new allocation, keeping the counter monotonic.
        let grown = new_size.saturating_sub(layout.size());
        ALLOCATED_BYTES.fetch_add(grown as u64, Ordering::Relaxed);
        unsafe { System.realloc(ptr, layout, new_size) }
    }
}

/// Reads the [`CountingAllocator`] byte counter.
///
/// Only meaningful when the counting allocator is installed as the global
/// allocator; construct the sampler in the same binary that installs it.
#[derive(Clone, Copy, Debug)]
pub struct HeapSampler(());

impl HeapSampler {
    /// Handle to the process-wide counter.
    pub fn global() -> Self {
        Self(())
    }

    /// Cumulative bytes allocated since process start.
    pub fn sample(&self) -> u64 {
        ALLOCATED_BYTES.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[global_allocator]
    static GLOBAL: CountingAllocator = CountingAllocator::new();

    #[test]
    fn counter_advances_on_allocation() {
        let sampler = HeapSampler::global();
        let before = sampler.sample();

        let buffer = vec![0u8; 1 << 20];
        std::hint::black_box(&buffer);

        let after = sampler.sample();
        assert!(after - before >= 1 << 20);
    }

    #[test]
    fn counter_is_monotonic_across_frees() {
        let sampler = HeapSampler::global();
        let before = sampler.sample();

        drop(vec![0u8; 4096]);

        assert!(sampler.sample() >= before);
    }
}
