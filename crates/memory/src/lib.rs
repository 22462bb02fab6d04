//! # bedrock-memory
//!
//! Memory-management core for the Bedrock platform layer.
//!
//! Performance-sensitive code avoids the general-purpose heap in its hot
//! paths; this crate provides the allocators it uses instead:
//!
//! - [`allocator::CompactingAllocator`] — variable-size allocation over one
//!   fixed arena. Callers hold opaque [`allocator::Handle`]s rather than
//!   pointers, so live allocations can be relocated to merge free space
//!   without invalidating anything the caller still holds. Compaction is
//!   always explicit and bounded; there is no background defragmentation.
//! - [`allocator::PoolAllocator`] — O(1) allocation of fixed-size blocks
//!   from a pre-reserved arena, safe for concurrent use.
//! - [`stats::UsageTracker`] — a diagnostics tree of registered allocators
//!   that renders a human-readable usage report.
//!
//! ## Quick start
//!
//! ```rust
//! use bedrock_memory::allocator::CompactingAllocator;
//!
//! let mut heap = CompactingAllocator::new(64 * 1024)?;
//! let a = heap.malloc(1000)?;
//! let b = heap.malloc(2000)?;
//! heap.free(a);
//!
//! // Merge the hole left by `a`; `b` keeps working across the move.
//! heap.compact(usize::MAX);
//! let ptr = heap.map_handle(b).expect("b is still live");
//! heap.unmap_handle(b);
//! # let _ = ptr;
//! # Ok::<(), bedrock_memory::MemoryError>(())
//! ```
//!
//! ## Error policy
//!
//! Running out of space is an expected, recoverable condition and comes back
//! as an `Err` whose [`MemoryError::is_retryable`] is true. Freeing or
//! mapping a stale handle is tolerated as a no-op. Everything that can only
//! mean corrupted internal state or a broken caller contract panics at the
//! point of detection — in the deployment contexts this crate targets,
//! masking corruption is worse than an immediate, precisely located crash.

// The whole crate is allocator plumbing; raw pointers are its subject matter.
#![allow(unsafe_code)]
#![warn(rust_2018_idioms)]
// Internal methods return Result for API consistency even when infallible today
#![allow(clippy::unnecessary_wraps)]

pub mod allocator;
pub mod core;
pub mod error;
pub mod stats;

pub use crate::error::{AllocError, AllocResult, MemoryError, MemoryResult};

/// Convenient re-exports of commonly used types and traits.
pub mod prelude {
    pub use crate::allocator::{
        Allocator, CompactingAllocator, CompactingConfig, Handle, PoolAllocator, PoolConfig,
        SystemAllocator, ThreadSafeAllocator,
    };
    pub use crate::core::{MemoryUsage, Resettable};
    pub use crate::error::{MemoryError, MemoryResult};
    pub use crate::stats::{FragmentationStats, UsageTracker};
}
