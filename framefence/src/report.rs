// Copyright 2026 the Framefence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Stdout latency report.

use std::io::Write;

use framefence_core::report::{LatencySample, LatencySink, LatencyStats};
use log::warn;

/// Writes one line per retired frame and keeps a running summary.
#[derive(Debug)]
pub(crate) struct LineSink<W> {
    out: W,
    stats: LatencyStats,
    broken: bool,
}

impl<W: Write> LineSink<W> {
    pub(crate) fn new(out: W) -> Self {
        Self {
            out,
            stats: LatencyStats::new(),
            broken: false,
        }
    }

    pub(crate) fn stats(&self) -> &LatencyStats {
        &self.stats
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> LatencySink for LineSink<W> {
    fn record(&mut self, sample: &LatencySample) {
        self.stats.record(sample);
        if self.broken {
            return;
        }
        if let Err(err) = writeln!(self.out, "{sample}").and_then(|()| self.out.flush()) {
            // A closed pipe should not stop the measurement.
            warn!("report output failed, continuing without it: {err}");
            self.broken = true;
        }
    }
}
