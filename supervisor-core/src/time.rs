//! Millisecond timestamps read from the hub's monotonic clock.

use core::{fmt, ops::Add, time::Duration};

/// Reading of the free-running millisecond counter.
///
/// The counter wraps after roughly 49 days. Differences use wrapping
/// arithmetic so elapsed times stay correct across the wrap as long as the
/// measured interval itself is shorter than the wrap period.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timestamp(u32);

impl Timestamp {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn from_millis(millis: u32) -> Self {
        Self(millis)
    }

    #[must_use]
    pub const fn as_millis(self) -> u32 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`.
    #[must_use]
    pub fn duration_since(self, earlier: Self) -> Duration {
        Duration::from_millis(u64::from(self.0.wrapping_sub(earlier.0)))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        let millis = u32::try_from(rhs.as_millis()).unwrap_or(u32::MAX);
        Self(self.0.wrapping_add(millis))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
