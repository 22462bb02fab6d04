//! Compacting allocator configuration

/// Configuration for the compacting allocator
#[derive(Debug, Clone)]
pub struct CompactingConfig {
    /// Enable usage counter tracking
    pub track_stats: bool,

    /// Fill pattern byte for freed chunks (for debugging use-after-free)
    pub free_pattern: Option<u8>,
}

impl Default for CompactingConfig {
    fn default() -> Self {
        Self {
            track_stats: true,
            free_pattern: if cfg!(debug_assertions) {
                Some(0xDD)
            } else {
                None
            },
        }
    }
}

impl CompactingConfig {
    /// Production configuration - minimal overhead
    #[must_use]
    pub fn production() -> Self {
        Self {
            track_stats: false,
            free_pattern: None,
        }
    }

    /// Debug configuration - scrub freed chunks
    #[must_use]
    pub fn debug() -> Self {
        Self {
            track_stats: true,
            free_pattern: Some(0xDD),
        }
    }
}
