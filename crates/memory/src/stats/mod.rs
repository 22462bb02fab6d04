//! Usage statistics and diagnostics.

pub mod counter;
pub mod fragmentation;
pub mod tracker;

pub use counter::{Counter, UsageCounters};
pub use fragmentation::FragmentationStats;
pub use tracker::{TrackedAllocator, UsageTracker};
