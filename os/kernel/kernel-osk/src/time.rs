//! Coarse time keeping.
//!
//! A tick is one millisecond. Ticks are 32 bits wide and wrap after about
//! 49 days, which is plenty for measuring the short intervals the driver cares
//! about; always compare ticks with [`Ticks::elapsed_ms`].

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Ticks(pub u32);

impl Ticks {
    /// Current tick count, relative to the first call in this process.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn now() -> Self {
        // Truncation is the wrap-around.
        Self(epoch().elapsed().as_millis() as u32)
    }

    #[must_use]
    pub const fn from_ms(ms: u32) -> Self {
        Self(ms)
    }

    #[must_use]
    pub const fn as_ms(self) -> u32 {
        self.0
    }

    /// Milliseconds from `earlier` to `later`, correct across one wrap.
    #[must_use]
    pub const fn elapsed_ms(earlier: Self, later: Self) -> u32 {
        later.0.wrapping_sub(earlier.0)
    }

    /// Whether `self` is after `other`, assuming they are less than half the
    /// tick range apart.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn is_after(self, other: Self) -> bool {
        (other.0.wrapping_sub(self.0) as i32) < 0
    }
}

/// Wall-clock time, seconds and microseconds since the UNIX epoch.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TimeVal {
    pub sec: u64,
    pub usec: u32,
}

impl TimeVal {
    /// Current wall-clock time. A clock set before 1970 reads as the epoch.
    #[must_use]
    pub fn now() -> Self {
        let since = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            sec: since.as_secs(),
            usec: since.subsec_micros(),
        }
    }
}
