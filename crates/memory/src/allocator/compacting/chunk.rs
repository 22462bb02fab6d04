//! Chunk records and the address-ordered chain that tiles the arena.
//!
//! Chunk bookkeeping lives outside the arena: records sit in an indexed
//! `Vec` and link to each other by index, while the payload bytes stay in
//! the arena itself. Index 0 is a sentinel that closes the chain into a
//! circle; walking `next` from the sentinel visits every chunk in address
//! order and returns to the sentinel.
//!
//! Invariant: the chain exactly tiles the arena. For every real chunk,
//! `offset + size` equals the next chunk's offset (or the arena length when
//! the sentinel follows). Splitting, merging and relocation are the only
//! operations that move chunk boundaries, and each preserves the invariant.

use super::Handle;

/// Index of the sentinel record.
pub(super) const SENTINEL: u32 = 0;

/// One contiguous byte range of the arena, free or allocated.
#[derive(Debug, Clone, Copy)]
pub(super) struct Chunk {
    /// Byte offset of the payload within the arena.
    pub offset: usize,
    /// Payload size in bytes.
    pub size: usize,
    /// Owning handle; [`Handle::NULL`] when the chunk is free.
    pub handle: Handle,
    /// Previous chunk by address (chain index).
    pub prev: u32,
    /// Next chunk by address (chain index).
    pub next: u32,
}

impl Chunk {
    #[inline]
    pub fn is_free(&self) -> bool {
        self.handle.is_null()
    }
}

/// The record table plus its recycling list.
///
/// Unlinked records are recycled rather than removed so chain indices stay
/// stable; nothing outside this module ever sees a recycled slot.
pub(super) struct ChunkChain {
    records: Vec<Chunk>,
    free_slots: Vec<u32>,
}

impl ChunkChain {
    /// Builds the initial chain: the sentinel and one spanning free chunk.
    pub fn new(arena_size: usize) -> Self {
        let sentinel = Chunk {
            offset: 0,
            size: 0,
            handle: Handle::NULL,
            prev: 1,
            next: 1,
        };
        let span = Chunk {
            offset: 0,
            size: arena_size,
            handle: Handle::NULL,
            prev: SENTINEL,
            next: SENTINEL,
        };
        Self {
            records: vec![sentinel, span],
            free_slots: Vec::new(),
        }
    }

    #[inline]
    pub fn get(&self, index: u32) -> &Chunk {
        &self.records[index as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, index: u32) -> &mut Chunk {
        &mut self.records[index as usize]
    }

    /// First chunk in address order.
    #[inline]
    pub fn first(&self) -> u32 {
        self.records[SENTINEL as usize].next
    }

    /// Inserts a new record after `index` in the chain and returns its slot.
    pub fn insert_after(&mut self, index: u32, offset: usize, size: usize) -> u32 {
        let next = self.get(index).next;
        let chunk = Chunk {
            offset,
            size,
            handle: Handle::NULL,
            prev: index,
            next,
        };

        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.records[slot as usize] = chunk;
                slot
            }
            None => {
                self.records.push(chunk);
                (self.records.len() - 1) as u32
            }
        };

        self.get_mut(index).next = slot;
        self.get_mut(next).prev = slot;
        slot
    }

    /// Removes `index` from the chain and recycles its slot.
    pub fn unlink(&mut self, index: u32) {
        debug_assert_ne!(index, SENTINEL, "cannot unlink the sentinel");
        let Chunk { prev, next, .. } = *self.get(index);
        self.get_mut(prev).next = next;
        self.get_mut(next).prev = prev;
        self.free_slots.push(index);
    }

    /// Number of chunks currently in the chain (sentinel excluded).
    pub fn len(&self) -> usize {
        self.records.len() - 1 - self.free_slots.len()
    }

    /// Walks the chain checking the tiling invariant against `arena_size`.
    ///
    /// Returns a description of the first violation found, if any.
    pub fn check_tiling(&self, arena_size: usize) -> Option<String> {
        let mut expected = 0usize;
        let mut index = self.first();
        while index != SENTINEL {
            let chunk = self.get(index);
            if chunk.offset != expected {
                return Some(format!(
                    "chunk #{index} starts at {} but the previous chunk ends at {expected}",
                    chunk.offset
                ));
            }
            expected = chunk.offset + chunk.size;
            index = chunk.next;
        }
        if expected != arena_size {
            return Some(format!(
                "chain covers {expected} bytes of a {arena_size} byte arena"
            ));
        }
        None
    }
}
