//! Handle-indirected compacting allocator.
//!
//! Variable-size allocation over one fixed arena, with support for live
//! defragmentation. Callers never hold addresses directly: `malloc` returns
//! an opaque [`Handle`], and the handle table maps it to the allocation's
//! *current* address. That single level of indirection is what lets
//! [`CompactingAllocator::compact`] slide live allocations toward lower
//! addresses without breaking anything the caller still holds — only raw
//! pointers obtained through [`CompactingAllocator::map_handle`] are
//! invalidated, and those are guarded by an outstanding-mappings counter.
//!
//! Compaction never runs on its own. A failed `malloc` reports exhaustion
//! and leaves the decision of when to pay the copy cost to the caller,
//! which typically spends a bounded `compact(n)` budget per frame.

mod chunk;
mod config;
mod handle;

use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::fmt::Write as _;

use hashbrown::HashMap;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

pub use config::CompactingConfig;
pub use handle::Handle;

use chunk::{ChunkChain, SENTINEL};

use crate::allocator::Region;
use crate::core::types::{align_down, align_up, alignment};
use crate::core::MemoryUsage;
use crate::error::{AllocResult, MemoryError, MemoryResult};
use crate::stats::{FragmentationStats, UsageCounters};

/// Payload sizes are rounded to this granularity, which keeps bit 0 of every
/// size free for flags in serialized dumps and keeps payloads word-friendly.
const CHUNK_ALIGN: usize = 4;

/// Minimum payload size: a freed chunk must always be big enough to be
/// reused as a fresh allocation.
const MIN_CHUNK: usize = 4;

/// A split that would leave less than this many bytes free creates an
/// unusably small fragment. The remainder is rolled into the allocation
/// instead, so `malloc` may over-grant by up to `SPLIT_THRESHOLD - 1` bytes.
const SPLIT_THRESHOLD: usize = 16;

/// Variable-size arena allocator with explicit, bounded compaction.
///
/// # Concurrency
///
/// Structural operations ([`malloc`](Self::malloc), [`free`](Self::free),
/// [`compact`](Self::compact)) take `&mut self`; callers that share an
/// instance across threads serialize them with one external lock, and the
/// exclusive borrow makes that requirement compiler-checked.
/// [`map_handle`](Self::map_handle) / [`unmap_handle`](Self::unmap_handle)
/// take `&self` and may race with each other; the only state they touch
/// mutably is an atomic counter. A pointer obtained from `map_handle` is a
/// raw escape from borrow tracking, which is why `compact` re-checks the
/// counter at runtime and panics rather than relocate memory someone still
/// points into.
///
/// # Example
///
/// ```rust
/// use bedrock_memory::allocator::CompactingAllocator;
///
/// let mut heap = CompactingAllocator::new(4096)?;
/// let handle = heap.malloc(100)?;
///
/// let ptr = heap.map_handle(handle).expect("live handle");
/// // ... read/write through ptr ...
/// heap.unmap_handle(handle);
///
/// heap.free(handle);
/// # Ok::<(), bedrock_memory::MemoryError>(())
/// ```
pub struct CompactingAllocator {
    region: Region,
    chain: ChunkChain,
    /// Handle -> chain index of the owning chunk, for every live allocation.
    handles: HashMap<Handle, u32>,
    /// Monotonic handle mint; retired values are never reissued.
    next_handle: AtomicU32,
    /// Raw pointers handed out by `map_handle` and not yet unmapped.
    outstanding_maps: AtomicUsize,
    counters: UsageCounters,
    config: CompactingConfig,
}

impl CompactingAllocator {
    /// Creates an allocator over a fresh arena of `capacity` bytes
    /// (rounded down to 4-byte granularity).
    pub fn new(capacity: usize) -> AllocResult<Self> {
        Self::with_config(capacity, CompactingConfig::default())
    }

    /// Creates an allocator with an explicit configuration.
    pub fn with_config(capacity: usize, config: CompactingConfig) -> AllocResult<Self> {
        let usable = align_down(capacity, CHUNK_ALIGN);
        if usable < MIN_CHUNK {
            return Err(MemoryError::invalid_config(
                "arena must hold at least one minimum-size chunk",
            ));
        }

        let region = Region::new(usable, alignment::MIN_ALIGN)?;
        let chain = ChunkChain::new(usable);

        #[cfg(feature = "logging")]
        debug!(capacity = usable, "compacting allocator created");

        Ok(Self {
            region,
            chain,
            handles: HashMap::new(),
            next_handle: AtomicU32::new(1),
            outstanding_maps: AtomicUsize::new(0),
            counters: UsageCounters::new(),
            config,
        })
    }

    /// Allocates `size` bytes and returns a handle to the new allocation.
    ///
    /// The request is rounded up to 4-byte granularity with a 4-byte
    /// minimum, and the first free chunk large enough is used (first-fit).
    /// When splitting the chosen chunk would leave an unusably small
    /// fragment, the whole chunk is granted instead — the allocation may be
    /// up to 15 bytes larger than requested.
    ///
    /// `size == 0` returns [`Handle::NULL`]. When no chunk fits, the result
    /// is a retryable [`MemoryError::ArenaExhausted`]; no compaction happens
    /// implicitly, so the usual recovery is `compact(n)` and retry.
    pub fn malloc(&mut self, size: usize) -> AllocResult<Handle> {
        if size == 0 {
            return Ok(Handle::NULL);
        }
        if size > self.region.len() {
            return Err(MemoryError::arena_exhausted(
                "compacting",
                size,
                self.largest_free_block(),
            ));
        }
        let rounded = align_up(size.max(MIN_CHUNK), CHUNK_ALIGN);

        // First-fit scan, linear in the number of chunks.
        let mut index = self.chain.first();
        let found = loop {
            if index == SENTINEL {
                break None;
            }
            let chunk = self.chain.get(index);
            if chunk.is_free() && chunk.size >= rounded {
                break Some(index);
            }
            index = chunk.next;
        };
        let Some(index) = found else {
            return Err(MemoryError::arena_exhausted(
                "compacting",
                rounded,
                self.largest_free_block(),
            ));
        };

        let leftover = self.chain.get(index).size - rounded;
        if leftover >= SPLIT_THRESHOLD {
            let offset = self.chain.get(index).offset;
            self.chain.get_mut(index).size = rounded;
            self.chain.insert_after(index, offset + rounded, leftover);
        }
        // else: the whole chunk is granted, leftover included.

        let handle = self.mint_handle();
        self.chain.get_mut(index).handle = handle;
        self.handles.insert(handle, index);

        let granted = self.chain.get(index).size;
        if self.config.track_stats {
            self.counters.record_allocation(granted);
        }

        #[cfg(feature = "logging")]
        trace!(handle = %handle, size, granted, "malloc");

        Ok(handle)
    }

    /// Releases the allocation behind `handle`.
    ///
    /// Unknown, already-freed and [`Handle::NULL`] handles are tolerated as
    /// no-ops, which makes double-free in calling code harmless. The freed
    /// chunk is immediately coalesced with free neighbours on both sides, so
    /// fragmentation stays bounded without a separate sweep.
    ///
    /// # Panics
    ///
    /// Panics if the handle table and the chunk chain disagree about the
    /// chunk's owner. That can only happen when internal state has been
    /// corrupted, and is not recoverable.
    pub fn free(&mut self, handle: Handle) {
        if handle.is_null() {
            return;
        }
        let Some(index) = self.handles.remove(&handle) else {
            return;
        };

        let current = *self.chain.get(index);
        assert_eq!(
            current.handle, handle,
            "handle table and chunk chain disagree on chunk #{index}"
        );

        if self.config.track_stats {
            self.counters.record_deallocation(current.size);
        }
        if let Some(pattern) = self.config.free_pattern {
            // SAFETY: the chunk's byte range is inside the arena by the
            // tiling invariant, and the caller just gave the range up.
            unsafe {
                self.region
                    .as_ptr()
                    .add(current.offset)
                    .write_bytes(pattern, current.size);
            }
        }
        self.chain.get_mut(index).handle = Handle::NULL;

        // Eager coalescing: fold the following free chunk in, then fold this
        // chunk into a preceding free one.
        let next = current.next;
        if next != SENTINEL && self.chain.get(next).is_free() {
            let extra = self.chain.get(next).size;
            self.chain.get_mut(index).size += extra;
            self.chain.unlink(next);
        }
        let prev = self.chain.get(index).prev;
        if prev != SENTINEL && self.chain.get(prev).is_free() {
            let merged = self.chain.get(index).size;
            self.chain.get_mut(prev).size += merged;
            self.chain.unlink(index);
        }

        #[cfg(feature = "logging")]
        trace!(handle = %handle, "free");
    }

    /// Resolves `handle` to the allocation's current address.
    ///
    /// Returns `None` for [`Handle::NULL`] and unknown handles. On success
    /// the outstanding-mappings counter is incremented; release the pointer
    /// with [`unmap_handle`](Self::unmap_handle).
    ///
    /// # Safety contract
    ///
    /// The returned pointer is valid only until the matching `unmap_handle`
    /// or the next [`compact`](Self::compact) call, whichever comes first.
    pub fn map_handle(&self, handle: Handle) -> Option<NonNull<u8>> {
        if handle.is_null() {
            return None;
        }
        let index = *self.handles.get(&handle)?;
        let offset = self.chain.get(index).offset;

        self.outstanding_maps.fetch_add(1, Ordering::AcqRel);

        // SAFETY: the chunk's offset is inside the arena by the tiling
        // invariant, and the arena base is non-null.
        Some(unsafe { NonNull::new_unchecked(self.region.as_ptr().add(offset)) })
    }

    /// Releases a pointer obtained from [`map_handle`](Self::map_handle).
    ///
    /// # Panics
    ///
    /// Panics when called without a matching `map_handle` — an unbalanced
    /// unmap means the caller's mapping discipline is broken, which would
    /// let a later `compact` run under a pointer it believes released.
    pub fn unmap_handle(&self, handle: Handle) {
        if handle.is_null() {
            return;
        }
        let previous = self.outstanding_maps.fetch_sub(1, Ordering::AcqRel);
        assert_ne!(previous, 0, "unmap_handle without a matching map_handle");
    }

    /// Relocates up to `max_moves` allocated chunks toward lower addresses,
    /// merging the vacated space with following free chunks.
    ///
    /// Returns the number of chunks actually moved. One full-budget call
    /// (`max_moves >= ` number of allocated chunks) leaves at most one free
    /// chunk, at the top of the arena; smaller budgets make the pass
    /// incremental so callers can spread the copy cost over frames.
    ///
    /// # Panics
    ///
    /// Panics if any mapping is outstanding: relocating memory underneath a
    /// raw pointer would corrupt whatever the caller does with it next, so
    /// this is treated as a caller contract violation, not a data condition.
    pub fn compact(&mut self, max_moves: usize) -> usize {
        let outstanding = self.outstanding_maps.load(Ordering::Acquire);
        assert_eq!(
            outstanding, 0,
            "compact called with {outstanding} outstanding mappings"
        );

        let mut moved = 0usize;
        let mut index = self.chain.first();
        while index != SENTINEL && moved < max_moves {
            let current = *self.chain.get(index);
            if !current.is_free() {
                index = current.next;
                continue;
            }

            let next_index = current.next;
            if next_index == SENTINEL {
                // Trailing free chunk: nothing left to pull down.
                break;
            }
            let next = *self.chain.get(next_index);
            if next.is_free() {
                // Eager coalescing keeps free chunks apart; fold defensively
                // rather than trip over a state no valid sequence produces.
                debug_assert!(false, "adjacent free chunks survived coalescing");
                self.chain.get_mut(index).size += next.size;
                self.chain.unlink(next_index);
                continue;
            }

            // Slide the allocated payload down into the free chunk. The
            // ranges may overlap when the hole is smaller than the payload.
            // SAFETY: both ranges are inside the arena by the tiling
            // invariant; `copy` has memmove semantics.
            unsafe {
                let base = self.region.as_ptr();
                core::ptr::copy(base.add(next.offset), base.add(current.offset), next.size);
            }

            // The two records swap roles: `index` becomes the allocated
            // chunk at the lower offset, `next_index` becomes the free chunk
            // covering the vacated bytes. Offsets stay address-ordered.
            {
                let chunk = self.chain.get_mut(index);
                chunk.size = next.size;
                chunk.handle = next.handle;
            }
            {
                let hole = self.chain.get_mut(next_index);
                hole.offset = current.offset + next.size;
                hole.size = current.size;
                hole.handle = Handle::NULL;
            }
            self.handles.insert(next.handle, index);

            // Merge the vacated space with a following free chunk, if any.
            let after = self.chain.get(next_index).next;
            if after != SENTINEL && self.chain.get(after).is_free() {
                let extra = self.chain.get(after).size;
                self.chain.get_mut(next_index).size += extra;
                self.chain.unlink(after);
            }

            moved += 1;
            index = next_index;
        }

        #[cfg(feature = "logging")]
        debug!(moved, "compaction pass complete");

        moved
    }

    /// Renders one line per chunk plus a flag line for every tiling
    /// violation found. Reports, never repairs.
    #[must_use]
    pub fn diagnostic_dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "compacting arena: {} bytes, {} chunks, {} live handles",
            self.region.len(),
            self.chain.len(),
            self.handles.len()
        );

        let mut index = self.chain.first();
        while index != SENTINEL {
            let chunk = self.chain.get(index);
            let state = if chunk.is_free() { "free" } else { "allocated" };
            let _ = writeln!(
                out,
                "  #{index} @{:>8} {:<9} {:>8} bytes handle={}",
                chunk.offset, state, chunk.size, chunk.handle
            );

            let end = chunk.offset + chunk.size;
            let next_offset = if chunk.next == SENTINEL {
                self.region.len()
            } else {
                self.chain.get(chunk.next).offset
            };
            if end != next_offset {
                let _ = writeln!(
                    out,
                    "  INVARIANT BROKEN: chunk #{index} ends at {end} but the next chunk begins at {next_offset}"
                );
            }
            index = chunk.next;
        }
        out
    }

    /// Checks the chain tiling and the handle table for consistency.
    pub fn validate(&self) -> MemoryResult<()> {
        if let Some(report) = self.chain.check_tiling(self.region.len()) {
            return Err(MemoryError::corruption("chunk chain", &report));
        }
        for (&handle, &index) in &self.handles {
            let owner = self.chain.get(index).handle;
            if owner != handle {
                return Err(MemoryError::corruption(
                    "handle table",
                    &format!("handle {handle} maps to chunk #{index} owned by {owner}"),
                ));
            }
        }
        Ok(())
    }

    /// Snapshot of the arena's free space.
    #[must_use]
    pub fn fragmentation(&self) -> FragmentationStats {
        let mut total_free = 0usize;
        let mut largest = 0usize;
        let mut fragments = 0usize;

        let mut index = self.chain.first();
        while index != SENTINEL {
            let chunk = self.chain.get(index);
            if chunk.is_free() {
                total_free += chunk.size;
                largest = largest.max(chunk.size);
                fragments += 1;
            }
            index = chunk.next;
        }
        FragmentationStats::calculate(total_free, largest, fragments)
    }

    /// Total free bytes across all free chunks.
    pub fn free_bytes(&self) -> usize {
        self.fragmentation().total_free
    }

    /// Size of the largest contiguous free chunk.
    pub fn largest_free_block(&self) -> usize {
        self.fragmentation().largest_block
    }

    /// Number of chunks in the chain (free and allocated).
    pub fn chunk_count(&self) -> usize {
        self.chain.len()
    }

    /// Number of live allocations.
    pub fn live_allocations(&self) -> usize {
        self.handles.len()
    }

    /// Arena size in bytes.
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    fn mint_handle(&self) -> Handle {
        let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
        if raw == 0 {
            // The counter wrapped after ~4 billion mints; 0 stays reserved.
            return Handle::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed));
        }
        Handle::from_raw(raw)
    }
}

impl MemoryUsage for CompactingAllocator {
    fn name(&self) -> &str {
        "compacting"
    }

    fn bytes_allocated(&self) -> usize {
        self.counters.bytes_allocated()
    }

    fn allocation_count(&self) -> usize {
        self.counters.allocation_count()
    }
}
