// Copyright 2026 the Framefence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic host time in nanoseconds.
//!
//! [`HostTime`] is a point on the kernel's `CLOCK_MONOTONIC` timeline. Both
//! the submission timestamp captured by the frame loop and the completion
//! timestamp reported by a `sync_file` live on that timeline, so latency is a
//! plain difference of the two.
//!
//! [`Latency`] is signed, so a completion timestamp that could not be read
//! (treated as zero) yields a negative value instead of a wrapped one.

use core::fmt;

const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// A point in time expressed as monotonic nanoseconds.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HostTime(pub u64);

impl HostTime {
    /// The zero point, also used when a kernel timestamp is unavailable.
    pub const ZERO: Self = Self(0);

    /// Returns the raw nanosecond value.
    #[inline]
    #[must_use]
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// Returns the signed span from `earlier` to `self`.
    ///
    /// Uses `i128` intermediates, so the result is exact for any pair of
    /// `u64` timestamps.
    #[inline]
    #[must_use]
    pub const fn latency_since(self, earlier: Self) -> Latency {
        Latency(self.0 as i128 - earlier.0 as i128)
    }
}

impl fmt::Debug for HostTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostTime({})", self.0)
    }
}

/// A signed span between two [`HostTime`] values, in nanoseconds.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Latency(pub i128);

impl Latency {
    /// Returns the raw signed nanosecond value.
    #[inline]
    #[must_use]
    pub const fn nanos(self) -> i128 {
        self.0
    }

    /// Returns the span in fractional milliseconds.
    #[inline]
    #[must_use]
    pub fn as_millis_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_MILLI
    }

    /// Returns `true` if the completion came before the submission.
    #[inline]
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Debug for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Latency({}ns)", self.0)
    }
}
