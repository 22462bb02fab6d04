//! Atomic counters backing the usage surface of every allocator.

use core::sync::atomic::{AtomicUsize, Ordering};

/// A single atomic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicUsize,
}

impl Counter {
    /// Creates a counter starting at 0.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: AtomicUsize::new(0),
        }
    }

    /// Current value.
    #[inline]
    pub fn value(&self) -> usize {
        self.value.load(Ordering::Acquire)
    }

    /// Add `delta` to the counter.
    #[inline]
    pub fn add(&self, delta: usize) {
        self.value.fetch_add(delta, Ordering::AcqRel);
    }

    /// Subtract `delta` from the counter, saturating at 0.
    ///
    /// Saturation rather than wrap keeps a miscounted deallocation from
    /// turning the usage report into a number in the exabytes.
    #[inline]
    pub fn sub(&self, delta: usize) {
        let mut current = self.value.load(Ordering::Acquire);
        loop {
            let next = current.saturating_sub(delta);
            match self.value.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Reset the counter to 0.
    #[inline]
    pub fn reset(&self) {
        self.value.store(0, Ordering::Release);
    }
}

/// The `bytes_allocated` / `allocation_count` pair every allocator keeps.
#[derive(Debug, Default)]
pub struct UsageCounters {
    bytes: Counter,
    allocations: Counter,
}

impl UsageCounters {
    /// Creates zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bytes: Counter::new(),
            allocations: Counter::new(),
        }
    }

    /// Record a successful allocation of `size` bytes.
    #[inline]
    pub fn record_allocation(&self, size: usize) {
        self.bytes.add(size);
        self.allocations.add(1);
    }

    /// Record a deallocation of `size` bytes.
    #[inline]
    pub fn record_deallocation(&self, size: usize) {
        self.bytes.sub(size);
        self.allocations.sub(1);
    }

    /// Bytes currently allocated.
    #[inline]
    pub fn bytes_allocated(&self) -> usize {
        self.bytes.value()
    }

    /// Number of currently live allocations.
    #[inline]
    pub fn allocation_count(&self) -> usize {
        self.allocations.value()
    }

    /// Reset both counters to 0.
    #[inline]
    pub fn reset(&self) {
        self.bytes.reset();
        self.allocations.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_operations() {
        let counter = Counter::new();
        assert_eq!(counter.value(), 0);

        counter.add(5);
        assert_eq!(counter.value(), 5);

        counter.sub(2);
        assert_eq!(counter.value(), 3);

        counter.reset();
        assert_eq!(counter.value(), 0);
    }

    #[test]
    fn counter_saturates_at_zero() {
        let counter = Counter::new();
        counter.add(1);
        counter.sub(10);
        assert_eq!(counter.value(), 0);
    }

    #[test]
    fn usage_counters_track_pairs() {
        let usage = UsageCounters::new();
        usage.record_allocation(128);
        usage.record_allocation(64);
        assert_eq!(usage.bytes_allocated(), 192);
        assert_eq!(usage.allocation_count(), 2);

        usage.record_deallocation(128);
        assert_eq!(usage.bytes_allocated(), 64);
        assert_eq!(usage.allocation_count(), 1);

        usage.reset();
        assert_eq!(usage.bytes_allocated(), 0);
        assert_eq!(usage.allocation_count(), 0);
    }
}
