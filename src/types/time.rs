//! DNP3 absolute time.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds in one hour.
pub const MILLIS_PER_HOUR: u64 = 3_600_000;

/// Largest value representable in the 48-bit DNP3 time field.
pub const MAX_DNP3_TIME: u64 = (1 << 48) - 1;

/// DNP3 absolute time: milliseconds since 1970-01-01 UTC, 48 bits on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch, used for points that were never stamped.
    pub const EPOCH: Self = Self(0);

    /// Create from milliseconds since the epoch, truncated to 48 bits.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms & MAX_DNP3_TIME)
    }

    /// Milliseconds since the epoch.
    #[inline]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self::from_millis(ms)
    }

    /// Milliseconds elapsed since the top of the current hour.
    #[inline]
    pub const fn millis_into_hour(&self) -> u64 {
        self.0 % MILLIS_PER_HOUR
    }

    /// Time at the top of the current hour.
    #[inline]
    pub const fn top_of_hour(&self) -> Self {
        Self(self.0 - self.millis_into_hour())
    }

    /// Time shifted forward by `delay`.
    #[inline]
    pub fn add(self, delay: Duration) -> Self {
        let delay = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Self::from_millis(self.0.saturating_add(delay))
    }

    /// Duration from `earlier` to `self`, zero if `earlier` is later.
    #[inline]
    pub const fn saturating_since(&self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Encode to 6 little-endian bytes.
    pub fn to_bytes(&self) -> [u8; 6] {
        let b = self.0.to_le_bytes();
        [b[0], b[1], b[2], b[3], b[4], b[5]]
    }

    /// Parse from 6 little-endian bytes.
    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        let mut b = [0u8; 8];
        b[..6].copy_from_slice(&bytes);
        Self(u64::from_le_bytes(b))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:03}", self.0 / 1000, self.0 % 1000)
    }
}
