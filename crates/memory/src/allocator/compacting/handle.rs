//! Opaque allocation handles.

use core::fmt;

/// Stable identifier for a live allocation in a
/// [`super::CompactingAllocator`].
///
/// A handle stays valid across compaction even though the allocation's
/// address changes; resolving it to a pointer goes through
/// [`super::CompactingAllocator::map_handle`]. Handles are minted from a
/// monotonically increasing counter and retired values are never reused, so
/// a stale handle can only miss the lookup table — it can never silently
/// alias a newer allocation.
///
/// The raw value 0 is reserved as [`Handle::NULL`], meaning "no allocation";
/// zero-size requests return it and every operation treats it as a no-op.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Handle(u32);

impl Handle {
    /// The null handle: never maps to an allocation.
    pub const NULL: Handle = Handle(0);

    /// Whether this is the null handle.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// The raw identifier value.
    #[inline]
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub(super) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_handle_is_zero() {
        assert!(Handle::NULL.is_null());
        assert_eq!(Handle::NULL.as_raw(), 0);
        assert!(!Handle::from_raw(1).is_null());
    }

    #[test]
    fn display_formats() {
        assert_eq!(Handle::NULL.to_string(), "null");
        assert_eq!(Handle::from_raw(42).to_string(), "42");
    }
}
