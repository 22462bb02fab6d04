//! Error types for bedrock-memory
//!
//! Uses thiserror for clean, idiomatic Rust error definitions.
//!
//! Only *recoverable* conditions are represented here. Internal corruption
//! and caller-contract violations panic at the point of detection instead of
//! being surfaced as a value (see the crate-level docs).

use core::alloc::Layout;
use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::warn;

/// Memory management errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum MemoryError {
    // --- Allocation errors ---
    #[error("memory allocation failed: {size} bytes with {align} byte alignment")]
    AllocationFailed { size: usize, align: usize },

    #[error("invalid memory layout: {reason}")]
    InvalidLayout { reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // --- Capacity exhaustion (recoverable) ---
    #[error("memory pool '{pool}' exhausted (capacity: {capacity})")]
    PoolExhausted { pool: String, capacity: usize },

    #[error("arena '{arena}' exhausted: requested {requested} bytes, available {available}")]
    ArenaExhausted {
        arena: String,
        requested: usize,
        available: usize,
    },

    // --- Consistency ---
    #[error("memory corruption detected in {component}: {details}")]
    Corruption { component: String, details: String },
}

impl MemoryError {
    /// Check if the error is a capacity condition worth retrying, e.g. after
    /// freeing or compacting.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted { .. } | Self::ArenaExhausted { .. }
        )
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AllocationFailed { .. } => "MEM:ALLOC:FAILED",
            Self::InvalidLayout { .. } => "MEM:ALLOC:LAYOUT",
            Self::InvalidConfig { .. } => "MEM:CONFIG:INVALID",
            Self::PoolExhausted { .. } => "MEM:POOL:EXHAUSTED",
            Self::ArenaExhausted { .. } => "MEM:ARENA:EXHAUSTED",
            Self::Corruption { .. } => "MEM:SYSTEM:CORRUPTION",
        }
    }

    /// Create allocation failed error
    pub fn allocation_failed(size: usize, align: usize) -> Self {
        Self::AllocationFailed { size, align }
    }

    /// Create allocation failed error from layout
    #[must_use]
    pub fn allocation_failed_with_layout(layout: Layout) -> Self {
        Self::allocation_failed(layout.size(), layout.align())
    }

    /// Create invalid layout error
    pub fn invalid_layout(reason: &str) -> Self {
        Self::InvalidLayout {
            reason: reason.to_string(),
        }
    }

    /// Create invalid config error
    pub fn invalid_config(reason: &str) -> Self {
        Self::InvalidConfig {
            reason: reason.to_string(),
        }
    }

    /// Create pool exhausted error
    pub fn pool_exhausted(pool: &str, capacity: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(pool, capacity, "memory pool exhausted");

        Self::PoolExhausted {
            pool: pool.to_string(),
            capacity,
        }
    }

    /// Create arena exhausted error
    pub fn arena_exhausted(arena: &str, requested: usize, available: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(arena, requested, available, "arena exhausted");

        Self::ArenaExhausted {
            arena: arena.to_string(),
            requested,
            available,
        }
    }

    /// Create memory corruption error
    pub fn corruption(component: &str, details: &str) -> Self {
        Self::Corruption {
            component: component.to_string(),
            details: details.to_string(),
        }
    }
}

/// Result type for memory operations
pub type MemoryResult<T> = core::result::Result<T, MemoryError>;

/// Type aliases used throughout the allocator module
pub type AllocError = MemoryError;
pub type AllocResult<T> = MemoryResult<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_context() {
        let error = MemoryError::allocation_failed(1024, 8);
        assert!(error.to_string().contains("1024"));

        let error = MemoryError::arena_exhausted("heap", 512, 96);
        assert!(error.to_string().contains("heap"));
        assert!(error.to_string().contains("512"));
    }

    #[test]
    fn error_with_layout() {
        let layout = Layout::new::<u64>();
        let error = MemoryError::allocation_failed_with_layout(layout);
        assert!(error.to_string().contains(&layout.size().to_string()));
    }

    #[test]
    fn error_codes() {
        assert_eq!(
            MemoryError::allocation_failed(1024, 8).code(),
            "MEM:ALLOC:FAILED"
        );
        assert_eq!(
            MemoryError::pool_exhausted("test", 100).code(),
            "MEM:POOL:EXHAUSTED"
        );
        assert_eq!(
            MemoryError::corruption("chain", "gap").code(),
            "MEM:SYSTEM:CORRUPTION"
        );
    }

    #[test]
    fn exhaustion_is_retryable() {
        assert!(MemoryError::pool_exhausted("test", 100).is_retryable());
        assert!(MemoryError::arena_exhausted("heap", 64, 0).is_retryable());
        assert!(!MemoryError::invalid_config("zero capacity").is_retryable());
        assert!(!MemoryError::corruption("chain", "gap").is_retryable());
    }
}
