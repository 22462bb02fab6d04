//! Base traits shared by every allocator in the crate.

/// Read-only usage surface of an allocator.
///
/// This is the contract the [`crate::stats::UsageTracker`] reads when it
/// renders a report; any allocator (including ones outside this crate) can
/// participate by implementing it. Implementations are expected to be cheap
/// — typically a pair of atomic loads.
pub trait MemoryUsage {
    /// Display name used in diagnostics output.
    fn name(&self) -> &str;

    /// Bytes currently allocated (not peak, not cumulative).
    fn bytes_allocated(&self) -> usize;

    /// Number of currently live allocations.
    fn allocation_count(&self) -> usize;
}

/// Bulk reset back to the freshly-created state.
///
/// For pool-style allocators this reclaims every block regardless of whether
/// it was handed out. It is *not* safe to call while any caller still holds
/// memory obtained from the allocator; the method takes `&self` only because
/// implementations synchronize internally.
pub trait Resettable {
    /// Discard all outstanding allocations and start over.
    fn reset(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl MemoryUsage for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn bytes_allocated(&self) -> usize {
            4096
        }

        fn allocation_count(&self) -> usize {
            2
        }
    }

    #[test]
    fn trait_object_usage() {
        let usage: &dyn MemoryUsage = &Fixed;
        assert_eq!(usage.name(), "fixed");
        assert_eq!(usage.bytes_allocated(), 4096);
        assert_eq!(usage.allocation_count(), 2);
    }
}
