//! Virtual time for the simulation kernel.
//!
//! Represents a point on the simulated timeline in integer nanoseconds.
//! Time advances only when the simulation dispatches an event, never
//! from wall-clock observation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// An absolute instant of simulated time, in nanoseconds since the start
/// of the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VirtualTime(u64);

impl VirtualTime {
    /// The zero-point of simulation time.
    pub const ZERO: VirtualTime = VirtualTime(0);

    /// The last representable instant.
    pub const MAX: VirtualTime = VirtualTime(u64::MAX);

    #[inline]
    pub const fn from_nanos(nanos: u64) -> Self {
        VirtualTime(nanos)
    }

    /// # Panics
    /// Panics if the value does not fit in `u64` nanoseconds.
    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        match micros.checked_mul(1_000) {
            Some(n) => VirtualTime(n),
            None => panic!("VirtualTime::from_micros overflow"),
        }
    }

    /// # Panics
    /// Panics if the value does not fit in `u64` nanoseconds.
    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        match millis.checked_mul(1_000_000) {
            Some(n) => VirtualTime(n),
            None => panic!("VirtualTime::from_millis overflow"),
        }
    }

    /// # Panics
    /// Panics if the value does not fit in `u64` nanoseconds (about 584 years).
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        match secs.checked_mul(NANOS_PER_SEC) {
            Some(n) => VirtualTime(n),
            None => panic!("VirtualTime::from_secs overflow"),
        }
    }

    /// Convert fractional seconds, rounding to the nearest nanosecond.
    ///
    /// Returns `None` for negative, non-finite or unrepresentable values.
    pub fn try_from_secs_f64(secs: f64) -> Option<Self> {
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        let nanos = (secs * NANOS_PER_SEC as f64).round();
        if nanos >= u64::MAX as f64 {
            return None;
        }
        Some(VirtualTime(nanos as u64))
    }

    /// Interpret a `Duration` as an offset from time zero.
    pub fn try_from_duration(d: Duration) -> Option<Self> {
        u64::try_from(d.as_nanos()).ok().map(VirtualTime)
    }

    #[inline]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    /// The offset of this instant from time zero.
    #[inline]
    pub const fn as_duration(self) -> Duration {
        Duration::from_nanos(self.0)
    }

    /// Compute the instant `delay` after `self`.
    ///
    /// Fails with [`SimError::Overflow`] rather than wrapping, since a
    /// wrapped time would sort before every pending event.
    pub fn checked_add(self, delay: Duration) -> SimResult<VirtualTime> {
        u64::try_from(delay.as_nanos())
            .ok()
            .and_then(|d| self.0.checked_add(d))
            .map(VirtualTime)
            .ok_or(SimError::Overflow { base: self, delay })
    }

    /// Returns `true` if `self` is strictly before `other`.
    #[inline]
    pub fn is_before(self, other: VirtualTime) -> bool {
        self.0 < other.0
    }

    /// Time elapsed from `earlier` to `self`.
    /// Returns `None` if `earlier` is after `self`.
    #[inline]
    pub fn duration_since(self, earlier: VirtualTime) -> Option<Duration> {
        self.0.checked_sub(earlier.0).map(Duration::from_nanos)
    }
}

impl From<VirtualTime> for Duration {
    fn from(t: VirtualTime) -> Self {
        t.as_duration()
    }
}

impl std::fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "T={}.{:09}s",
            self.0 / NANOS_PER_SEC,
            self.0 % NANOS_PER_SEC
        )
    }
}
