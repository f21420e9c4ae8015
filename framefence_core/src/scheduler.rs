// Copyright 2026 the Framefence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame pacing policies.
//!
//! The [`Scheduler`] runs once per loop iteration and answers two questions:
//! should a frame be submitted now, and how long may the event multiplexer
//! block afterwards. The answer depends on the [`PacingMode`] chosen at
//! startup and on the frame-presented notifications recorded in
//! [`WindowState`].

use crate::window::WindowState;

/// Strategy governing when the next frame is submitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PacingMode {
    /// Submit only while no frame-presented notification is outstanding.
    ///
    /// Interest in the next notification is registered right before each
    /// submission, so at most one notification is ever in flight.
    #[default]
    VsyncGated,
    /// Submit every iteration and never block in the multiplexer.
    ///
    /// The loop spins as fast as the protocol and GPU allow, bounded only by
    /// the frame cap.
    Unthrottled,
    /// Submit once eagerly, then only in response to the presentation of the
    /// previous frame.
    ///
    /// Strict one-frame-in-flight at the presentation level; outstanding GPU
    /// fences do not count.
    SelfChaining,
}

/// How long the multiplexer may block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Return immediately (busy-poll).
    Immediate,
    /// Block until the socket or a fence becomes ready.
    Infinite,
}

/// What the scheduler decided for this iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Do not submit a frame this iteration.
    Skip,
    /// Submit a frame.
    Submit {
        /// Register a frame-presented notification before submitting.
        register_frame: bool,
    },
}

/// Per-run pacing state.
#[derive(Clone, Copy, Debug)]
pub struct Scheduler {
    mode: PacingMode,
    primed: bool,
}

impl Scheduler {
    /// Creates a scheduler for the given pacing mode.
    #[must_use]
    pub const fn new(mode: PacingMode) -> Self {
        Self {
            mode,
            primed: false,
        }
    }

    /// Decides whether to submit a frame now.
    ///
    /// Under [`PacingMode::SelfChaining`] this consumes the delivered
    /// presentation notification, so call it exactly once per iteration.
    pub fn decide(&mut self, window: &mut WindowState) -> Decision {
        match self.mode {
            PacingMode::Unthrottled => Decision::Submit {
                register_frame: false,
            },
            PacingMode::VsyncGated => {
                if window.frame_pending() {
                    Decision::Skip
                } else {
                    Decision::Submit {
                        register_frame: true,
                    }
                }
            }
            PacingMode::SelfChaining => {
                if !self.primed {
                    self.primed = true;
                    Decision::Submit {
                        register_frame: true,
                    }
                } else if window.take_presented() {
                    Decision::Submit {
                        register_frame: true,
                    }
                } else {
                    Decision::Skip
                }
            }
        }
    }

    /// Returns the multiplexer timeout for this pacing mode.
    #[must_use]
    pub const fn timeout(&self) -> Timeout {
        match self.mode {
            PacingMode::Unthrottled => Timeout::Immediate,
            PacingMode::VsyncGated | PacingMode::SelfChaining => Timeout::Infinite,
        }
    }
}
