//! Fixed-block pool allocator.
//!
//! Partitions one pre-reserved arena into equal-size, equal-alignment blocks
//! and serves O(1) allocate/free from a free list threaded through the free
//! blocks themselves: each free block's first machine word holds the address
//! of the next free block, so the list costs no storage of its own.
//!
//! # Safety
//!
//! - The arena is owned by the pool and released when it drops
//! - Every free-list operation happens under one busy-wait spinlock
//! - Blocks are recycled in LIFO order; contents are not cleared between
//!   uses unless a fill pattern is configured

mod config;

use core::alloc::Layout;
use core::ptr::NonNull;

use spin::Mutex;

#[cfg(feature = "logging")]
use tracing::debug;

pub use config::PoolConfig;

use crate::allocator::{Allocator, Region, ThreadSafeAllocator};
use crate::core::types::align_up;
use crate::core::{MemoryUsage, Resettable};
use crate::error::{AllocResult, MemoryError};
use crate::stats::UsageCounters;

/// Free-list state guarded by the pool's spinlock.
struct FreeList {
    /// Head of the intrusive free list; null when the pool is exhausted.
    head: *mut u8,
    /// Number of free blocks.
    free: usize,
}

// SAFETY: the raw head pointer is only dereferenced while the spinlock is
// held, and it always points into the pool's own arena.
unsafe impl Send for FreeList {}

/// O(1) fixed-size block allocator over a pre-reserved arena.
///
/// Allocation and deallocation are constant-time list operations under a
/// spinlock; the lock is held for a handful of instructions, which is the
/// only contention profile a busy-wait lock is appropriate for. Never call
/// anything that can block while interacting with the pool.
///
/// Exhaustion is an expected condition: [`PoolAllocator::allocate_block`]
/// returns a retryable error rather than growing the arena.
///
/// # Example
///
/// ```rust
/// use bedrock_memory::allocator::{PoolAllocator, PoolConfig};
///
/// let pool = PoolAllocator::new(64, 16, 128)?;
/// let block = pool.allocate_block()?;
/// pool.deallocate_block(block);
/// # Ok::<(), bedrock_memory::MemoryError>(())
/// ```
pub struct PoolAllocator {
    region: Region,
    /// Distance between consecutive blocks; `>= block_size`, rounded so
    /// every block can hold the free-list word at native alignment.
    stride: usize,
    block_size: usize,
    block_align: usize,
    capacity: usize,
    state: Mutex<FreeList>,
    counters: UsageCounters,
    config: PoolConfig,
}

// SAFETY: all mutable state (the free list and the arena bytes reachable
// from it) is guarded by the spinlock; counters are atomic.
unsafe impl Send for PoolAllocator {}
unsafe impl Sync for PoolAllocator {}

impl PoolAllocator {
    /// Creates a pool of `capacity` blocks of `block_size` bytes at
    /// `block_align` alignment, with the default configuration.
    pub fn new(block_size: usize, block_align: usize, capacity: usize) -> AllocResult<Self> {
        Self::with_config(block_size, block_align, capacity, PoolConfig::default())
    }

    /// Creates the largest pool of `block_size`/`block_align` blocks that
    /// fits in `arena_size` bytes: the block count is derived from the arena
    /// size rather than given explicitly.
    pub fn for_arena_size(
        arena_size: usize,
        block_size: usize,
        block_align: usize,
    ) -> AllocResult<Self> {
        if block_size == 0 {
            return Err(MemoryError::invalid_config("block size must be non-zero"));
        }
        if !block_align.is_power_of_two() {
            return Err(MemoryError::invalid_config(
                "block alignment must be a power of two",
            ));
        }
        let align = block_align.max(align_of::<usize>());
        let stride = align_up(block_size.max(size_of::<usize>()), align);
        let capacity = arena_size / stride;
        if capacity == 0 {
            return Err(MemoryError::invalid_config(
                "arena too small for a single block",
            ));
        }
        Self::with_config(block_size, block_align, capacity, PoolConfig::default())
    }

    /// Creates a pool with an explicit configuration.
    pub fn with_config(
        block_size: usize,
        block_align: usize,
        capacity: usize,
        config: PoolConfig,
    ) -> AllocResult<Self> {
        if block_size == 0 {
            return Err(MemoryError::invalid_config("block size must be non-zero"));
        }
        if capacity == 0 {
            return Err(MemoryError::invalid_config("capacity must be non-zero"));
        }
        if !block_align.is_power_of_two() {
            return Err(MemoryError::invalid_config(
                "block alignment must be a power of two",
            ));
        }

        // The free-list word lives in the first bytes of each free block, so
        // the stride must fit a pointer at native alignment.
        let align = block_align.max(align_of::<usize>());
        let stride = align_up(block_size.max(size_of::<usize>()), align);
        let arena_size = stride
            .checked_mul(capacity)
            .ok_or_else(|| MemoryError::invalid_config("pool arena size overflows"))?;

        let region = Region::new(arena_size, align)?;

        let pool = Self {
            region,
            stride,
            block_size,
            block_align: align,
            capacity,
            state: Mutex::new(FreeList {
                head: core::ptr::null_mut(),
                free: 0,
            }),
            counters: UsageCounters::new(),
            config,
        };
        pool.thread_free_list(&mut pool.state.lock());

        #[cfg(feature = "logging")]
        debug!(block_size, capacity, stride, "pool allocator created");

        Ok(pool)
    }

    /// Threads the free list through every block in arena order.
    fn thread_free_list(&self, list: &mut FreeList) {
        let base = self.region.as_ptr();
        for i in 0..self.capacity {
            // SAFETY: i < capacity, so both block addresses stay inside the
            // arena; blocks are stride-aligned which satisfies the pointer
            // store below.
            unsafe {
                let block = base.add(i * self.stride);
                let next = if i + 1 < self.capacity {
                    base.add((i + 1) * self.stride)
                } else {
                    core::ptr::null_mut()
                };
                block.cast::<*mut u8>().write(next);
            }
        }
        list.head = base;
        list.free = self.capacity;
    }

    /// Pops a block off the free list.
    ///
    /// Returns a retryable [`MemoryError::PoolExhausted`] when no block is
    /// free — callers are expected to check.
    pub fn allocate_block(&self) -> AllocResult<NonNull<u8>> {
        let block = {
            let mut list = self.state.lock();
            if list.free == 0 {
                drop(list);
                return Err(MemoryError::pool_exhausted("pool", self.capacity));
            }

            let block = list.head;
            // SAFETY: free > 0 means head points at a free block whose first
            // word holds the next free block (or null).
            list.head = unsafe { block.cast::<*mut u8>().read() };
            list.free -= 1;
            block
        };

        if let Some(pattern) = self.config.alloc_pattern {
            // SAFETY: the block was just popped, so it is exclusively ours
            // until returned to the caller.
            unsafe { block.write_bytes(pattern, self.block_size) };
        }
        if self.config.track_stats {
            self.counters.record_allocation(self.block_size);
        }

        // SAFETY: blocks are derived from the non-null arena base.
        Ok(unsafe { NonNull::new_unchecked(block) })
    }

    /// Returns a block to the free list.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` does not point at a block of this pool. A foreign or
    /// misaligned pointer here is a programmer error that would corrupt the
    /// free list, so it is fatal rather than ignored.
    pub fn deallocate_block(&self, ptr: NonNull<u8>) {
        let raw = ptr.as_ptr();
        assert!(
            self.region.contains(raw),
            "pointer {raw:p} does not belong to this pool"
        );
        let offset = raw as usize - self.region.as_ptr() as usize;
        assert!(
            offset % self.stride == 0,
            "pointer {raw:p} does not belong to this pool"
        );

        if let Some(pattern) = self.config.dealloc_pattern {
            // SAFETY: the caller is returning the block, so no one else may
            // touch it; the fill happens before it re-enters the free list.
            unsafe { raw.write_bytes(pattern, self.block_size) };
        }

        {
            let mut list = self.state.lock();
            // SAFETY: raw is a block of this pool (asserted above), aligned
            // for the pointer store.
            unsafe { raw.cast::<*mut u8>().write(list.head) };
            list.head = raw;
            list.free += 1;
        }

        if self.config.track_stats {
            self.counters.record_deallocation(self.block_size);
        }
    }

    /// Rebuilds the free list from scratch in arena order, reclaiming every
    /// block regardless of whether it was handed out.
    ///
    /// This is a bulk reset for scratch/frame-lifetime pools. It is not safe
    /// to call while any caller still holds a block: those pointers become
    /// aliases of blocks the pool will hand out again.
    pub fn free_all(&self) {
        let mut list = self.state.lock();
        self.thread_free_list(&mut list);
        drop(list);
        self.counters.reset();

        #[cfg(feature = "logging")]
        debug!(capacity = self.capacity, "pool reset");
    }

    /// Number of free blocks.
    pub fn num_free(&self) -> usize {
        self.state.lock().free
    }

    /// Total number of blocks.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Usable size of each block in bytes.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

// SAFETY: blocks come from the owned arena, are handed out at most once
// between deallocations, and satisfy the advertised size and alignment.
unsafe impl Allocator for PoolAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        // The pool is fixed-size: the request only has to fit in a block.
        debug_assert!(
            layout.size() <= self.block_size && layout.align() <= self.block_align,
            "layout {layout:?} does not fit pool blocks of {} bytes",
            self.block_size
        );

        let ptr = self.allocate_block()?;
        Ok(NonNull::slice_from_raw_parts(ptr, self.block_size))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) {
        self.deallocate_block(ptr);
    }
}

// SAFETY: every operation is serialized through the internal spinlock.
unsafe impl ThreadSafeAllocator for PoolAllocator {}

impl MemoryUsage for PoolAllocator {
    fn name(&self) -> &str {
        "pool"
    }

    fn bytes_allocated(&self) -> usize {
        self.counters.bytes_allocated()
    }

    fn allocation_count(&self) -> usize {
        self.counters.allocation_count()
    }
}

impl Resettable for PoolAllocator {
    fn reset(&self) {
        self.free_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_aligned_and_distinct() {
        let pool = PoolAllocator::new(48, 16, 8).unwrap();

        let a = pool.allocate_block().unwrap();
        let b = pool.allocate_block().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_ptr() as usize % 16, 0);
        assert_eq!(b.as_ptr() as usize % 16, 0);
    }

    #[test]
    fn exhaustion_is_recoverable() {
        let pool = PoolAllocator::new(64, 8, 4).unwrap();

        let blocks: Vec<_> = (0..4).map(|_| pool.allocate_block().unwrap()).collect();
        assert_eq!(pool.num_free(), 0);

        let err = pool.allocate_block().unwrap_err();
        assert!(err.is_retryable());

        pool.deallocate_block(blocks[0]);
        assert!(pool.allocate_block().is_ok());
    }

    #[test]
    fn freed_block_is_reused_first() {
        let pool = PoolAllocator::new(64, 8, 4).unwrap();

        let blocks: Vec<_> = (0..4).map(|_| pool.allocate_block().unwrap()).collect();
        pool.deallocate_block(blocks[1]);

        // LIFO free list: the next allocation is the block just returned.
        let next = pool.allocate_block().unwrap();
        assert_eq!(next, blocks[1]);
    }

    #[test]
    fn free_all_reclaims_live_blocks() {
        let pool = PoolAllocator::new(32, 8, 6).unwrap();

        for _ in 0..5 {
            let _ = pool.allocate_block().unwrap();
        }
        assert_eq!(pool.num_free(), 1);
        assert_eq!(pool.allocation_count(), 5);

        pool.free_all();
        assert_eq!(pool.num_free(), 6);
        assert_eq!(pool.allocation_count(), 0);

        // The whole arena is allocatable again.
        for _ in 0..6 {
            let _ = pool.allocate_block().unwrap();
        }
        assert!(pool.allocate_block().is_err());
    }

    #[test]
    #[should_panic(expected = "does not belong to this pool")]
    fn foreign_pointer_is_fatal() {
        let pool = PoolAllocator::new(64, 8, 2).unwrap();
        let mut outside = 0u8;
        pool.deallocate_block(NonNull::from(&mut outside));
    }

    #[test]
    fn capacity_derived_from_arena_size() {
        // 1024 bytes of 64-byte blocks at 8-byte alignment: 16 blocks.
        let pool = PoolAllocator::for_arena_size(1024, 64, 8).unwrap();
        assert_eq!(pool.capacity(), 16);
        assert_eq!(pool.num_free(), 16);

        // A trailing partial block does not count.
        let pool = PoolAllocator::for_arena_size(1000, 64, 8).unwrap();
        assert_eq!(pool.capacity(), 15);

        assert!(PoolAllocator::for_arena_size(32, 64, 8).is_err());
    }

    #[test]
    fn counters_track_usage() {
        let pool = PoolAllocator::with_config(128, 8, 4, PoolConfig::debug()).unwrap();

        let a = pool.allocate_block().unwrap();
        let _b = pool.allocate_block().unwrap();
        assert_eq!(pool.bytes_allocated(), 256);
        assert_eq!(pool.allocation_count(), 2);

        pool.deallocate_block(a);
        assert_eq!(pool.bytes_allocated(), 128);
        assert_eq!(pool.allocation_count(), 1);
    }

    #[test]
    fn dealloc_pattern_scrubs_returned_blocks() {
        let config = PoolConfig {
            track_stats: false,
            alloc_pattern: None,
            dealloc_pattern: Some(0xDD),
        };
        let pool = PoolAllocator::with_config(16, 8, 2, config).unwrap();

        let block = pool.allocate_block().unwrap();
        // SAFETY: we own the block until deallocation.
        unsafe { block.as_ptr().write_bytes(0x42, 16) };
        pool.deallocate_block(block);

        // Bytes past the free-list word carry the scrub pattern.
        // SAFETY: the block is free but the arena is still ours to inspect.
        let tail = unsafe { *block.as_ptr().add(size_of::<usize>()) };
        assert_eq!(tail, 0xDD);
    }

    #[test]
    fn allocator_trait_roundtrip() {
        let pool = PoolAllocator::new(64, 8, 2).unwrap();
        let layout = Layout::from_size_align(48, 8).unwrap();

        // SAFETY: layout fits the pool's blocks.
        unsafe {
            let ptr = pool.allocate(layout).unwrap();
            assert_eq!(ptr.len(), 64);
            pool.deallocate(ptr.cast(), layout);
        }
        assert_eq!(pool.num_free(), 2);
    }

    #[test]
    fn concurrent_allocate_deallocate() {
        use std::sync::Arc;

        let pool = Arc::new(PoolAllocator::new(64, 8, 64).unwrap());
        let mut handles = Vec::new();

        for _ in 0..4 {
            let pool = Arc::clone(&pool);
            handles.push(std::thread::spawn(move || {
                for _ in 0..200 {
                    if let Ok(block) = pool.allocate_block() {
                        pool.deallocate_block(block);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.num_free(), 64);
    }
}
