// Copyright 2026 the Framefence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame latency samples and their consumers.

use alloc::vec::Vec;
use core::fmt;

use crate::fence::FrameSeq;
use crate::time::{HostTime, Latency};

/// Measurement for one retired frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LatencySample {
    /// Frame the sample belongs to.
    pub frame: FrameSeq,
    /// Monotonic time captured at submission.
    pub submitted_at: HostTime,
    /// Kernel-reported completion time, [`HostTime::ZERO`] if the query
    /// failed.
    pub completed_at: HostTime,
    /// Whether `completed_at` came from a successful kernel query.
    pub query_ok: bool,
}

impl LatencySample {
    /// Submission-to-completion latency.
    #[must_use]
    pub fn latency(&self) -> Latency {
        self.completed_at.latency_since(self.submitted_at)
    }
}

/// Formats the sample as a report line: `Frame 3: 1.234567 ms`.
impl fmt::Display for LatencySample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame {}: {:.6} ms",
            self.frame,
            self.latency().as_millis_f64()
        )
    }
}

/// Receives one sample per retired frame, in retirement order.
pub trait LatencySink {
    /// Records a retired frame.
    fn record(&mut self, sample: &LatencySample);
}

impl LatencySink for Vec<LatencySample> {
    fn record(&mut self, sample: &LatencySample) {
        self.push(*sample);
    }
}

impl<S: LatencySink + ?Sized> LatencySink for &mut S {
    fn record(&mut self, sample: &LatencySample) {
        (**self).record(sample);
    }
}

/// Running summary over retired frames.
///
/// Samples whose kernel query failed are counted but excluded from the
/// latency figures.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LatencyStats {
    measured: u64,
    failed: u64,
    min_ns: i128,
    max_ns: i128,
    sum_ns: i128,
}

impl LatencyStats {
    /// Creates an empty summary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames with a valid measurement.
    #[must_use]
    pub fn measured(&self) -> u64 {
        self.measured
    }

    /// Number of frames whose completion time could not be read.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Smallest measured latency.
    #[must_use]
    pub fn min(&self) -> Option<Latency> {
        (self.measured > 0).then_some(Latency(self.min_ns))
    }

    /// Largest measured latency.
    #[must_use]
    pub fn max(&self) -> Option<Latency> {
        (self.measured > 0).then_some(Latency(self.max_ns))
    }

    /// Mean measured latency, rounded toward zero.
    #[must_use]
    pub fn mean(&self) -> Option<Latency> {
        (self.measured > 0).then(|| Latency(self.sum_ns / i128::from(self.measured)))
    }
}

impl LatencySink for LatencyStats {
    fn record(&mut self, sample: &LatencySample) {
        if !sample.query_ok {
            self.failed += 1;
            return;
        }
        let ns = sample.latency().nanos();
        if self.measured == 0 {
            self.min_ns = ns;
            self.max_ns = ns;
        } else {
            self.min_ns = self.min_ns.min(ns);
            self.max_ns = self.max_ns.max(ns);
        }
        self.sum_ns += ns;
        self.measured += 1;
    }
}

impl fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min(), self.mean(), self.max()) {
            (Some(min), Some(mean), Some(max)) => write!(
                f,
                "{} frames: min {:.3} ms, mean {:.3} ms, max {:.3} ms",
                self.measured,
                min.as_millis_f64(),
                mean.as_millis_f64(),
                max.as_millis_f64()
            )?,
            _ => write!(f, "no frames measured")?,
        }
        if self.failed > 0 {
            write!(f, " ({} failed queries)", self.failed)?;
        }
        Ok(())
    }
}
