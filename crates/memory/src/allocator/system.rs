//! System allocator with usage accounting.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::allocator::{Allocator, ThreadSafeAllocator};
use crate::core::MemoryUsage;
use crate::error::{AllocResult, MemoryError};
use crate::stats::UsageCounters;

/// The process heap (`std::alloc`) exposed through the [`Allocator`]
/// capability, with atomic usage counters so it can be registered with a
/// [`crate::stats::UsageTracker`] alongside the arena allocators.
///
/// This is the default backing store for callers that need plain
/// allocations, and the baseline row in usage reports.
pub struct SystemAllocator {
    counters: UsageCounters,
}

impl SystemAllocator {
    /// Creates a new system allocator handle.
    ///
    /// Every instance counts only its own traffic; two instances do not
    /// share counters even though they draw from the same heap.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: UsageCounters::new(),
        }
    }
}

impl Default for SystemAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: delegates to std::alloc, which satisfies the Allocator contract;
// counter updates are atomic and do not affect the returned memory.
unsafe impl Allocator for SystemAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        if layout.size() == 0 {
            return Err(MemoryError::invalid_layout("zero-size allocation"));
        }

        // SAFETY: layout has non-zero size, checked above.
        let raw = unsafe { std::alloc::alloc(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            return Err(MemoryError::allocation_failed_with_layout(layout));
        };

        self.counters.record_allocation(layout.size());
        Ok(NonNull::slice_from_raw_parts(ptr, layout.size()))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: caller guarantees ptr was allocated by us with layout.
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
        self.counters.record_deallocation(layout.size());
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        if new_layout.size() == 0 {
            return Err(MemoryError::invalid_layout("zero-size reallocation"));
        }

        // SAFETY: caller guarantees ptr/old_layout pairing and matching
        // alignment between the layouts.
        let raw = unsafe { std::alloc::realloc(ptr.as_ptr(), old_layout, new_layout.size()) };
        let Some(new) = NonNull::new(raw) else {
            return Err(MemoryError::allocation_failed_with_layout(new_layout));
        };

        self.counters.record_deallocation(old_layout.size());
        self.counters.record_allocation(new_layout.size());
        Ok(NonNull::slice_from_raw_parts(new, new_layout.size()))
    }
}

// SAFETY: std::alloc is thread-safe and the counters are atomic.
unsafe impl ThreadSafeAllocator for SystemAllocator {}

impl MemoryUsage for SystemAllocator {
    fn name(&self) -> &str {
        "system"
    }

    fn bytes_allocated(&self) -> usize {
        self.counters.bytes_allocated()
    }

    fn allocation_count(&self) -> usize {
        self.counters.allocation_count()
    }
}
