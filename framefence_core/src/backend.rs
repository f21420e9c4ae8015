// Copyright 2026 the Framefence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend contract for platform integrations.
//!
//! The core owns every decision of the frame loop; a backend owns every side
//! effect. A backend provides the following pieces:
//!
//! - **Protocol**: Non-blocking window-system I/O: the
//!   prepare-read / flush / read-or-cancel / dispatch cycle, plus the two
//!   requests the loop issues (frame notifications and configure
//!   acknowledgements). Implements [`Protocol`].
//!
//! - **Renderer**: Draws, fences, and presents one frame. Implements
//!   [`Renderer`]. In degraded mode (no fence export) `create_fence` always
//!   returns `None` and the fence table stays empty.
//!
//! - **Multiplexer**: The only blocking call of the whole loop. Implements
//!   [`Multiplexer`] over the protocol socket plus every tracked fence.
//!
//! - **Clock**: Monotonic submission timestamps and authoritative kernel
//!   completion timestamps. Implements [`FenceClock`].
//!
//! # Crate boundaries
//!
//! `framefence_core` owns the data model, pacing, fence tracking, and this
//! contract module. Backend crates depend on `framefence_core` and provide
//! platform glue. The binary wires both together and owns reporting.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::fence::{FenceTable, FrameSeq};
use crate::scheduler::Timeout;
use crate::time::HostTime;
use crate::window::{Size, WindowState};

/// Result of flushing outgoing protocol messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Flush {
    /// Everything was written.
    Complete,
    /// The socket buffer is full; wait for writability and retry.
    WouldBlock,
}

/// Non-blocking window-system protocol driver.
///
/// The loop drives one read cycle per iteration:
///
/// ```text
/// while !prepare_read() { dispatch_pending() }
/// flush()
/// wait(...)
/// if readable { read_events() } else { cancel_read() }
/// dispatch_pending()
/// ```
pub trait Protocol {
    /// Fatal protocol error.
    type Error: fmt::Display;

    /// State written by the dispatch handlers.
    fn window(&mut self) -> &mut WindowState;

    /// Announces the intention to read from the socket.
    ///
    /// Returns `false` when queued events must be dispatched first.
    fn prepare_read(&mut self) -> bool;

    /// Runs handlers for events already read from the socket.
    fn dispatch_pending(&mut self) -> Result<(), Self::Error>;

    /// Writes buffered outgoing messages.
    fn flush(&mut self) -> Result<Flush, Self::Error>;

    /// Abandons a prepared read.
    fn cancel_read(&mut self);

    /// Completes a prepared read, queueing the events received.
    fn read_events(&mut self) -> Result<(), Self::Error>;

    /// Registers interest in the next frame-presented notification.
    fn request_frame(&mut self);

    /// Acknowledges a configure serial.
    fn ack_configure(&mut self, serial: u32);
}

/// Failure reported by [`Renderer::present`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("present failed: {0}")]
pub struct RenderError(pub String);

/// Draw, fence, and present primitives for one frame.
pub trait Renderer {
    /// Short-lived GPU sync object.
    type Sync;
    /// Pollable completion handle exported from a sync object.
    type Fence;

    /// Resizes the native rendering target.
    fn resize(&mut self, size: Size);

    /// Updates viewport and uniforms, then issues the draw call.
    fn draw(&mut self, size: Size, frame: FrameSeq);

    /// Creates a fence covering all work submitted so far.
    fn create_fence(&mut self) -> Option<Self::Sync>;

    /// Hands the frame to the display system.
    fn present(&mut self) -> Result<(), RenderError>;

    /// Duplicates `sync` as a pollable handle and destroys `sync`.
    fn export_fence(&mut self, sync: Self::Sync) -> Option<Self::Fence>;
}

/// What the protocol socket should be polled for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct SocketInterest {
    /// Wake when the socket becomes writable (a flush would block).
    pub writable: bool,
}

/// Readiness of the protocol socket after a wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct SocketReadiness {
    /// Incoming data is available.
    pub readable: bool,
    /// Outgoing data can be written.
    pub writable: bool,
    /// The socket reported an error or hangup.
    pub hangup: bool,
}

/// Outcome of one wait.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Readiness {
    /// Protocol socket state.
    pub socket: SocketReadiness,
    /// One flag per fence table entry, index-aligned with the table.
    pub fences: Vec<bool>,
}

impl Readiness {
    /// Readiness with nothing ready for a table of `fence_count` entries.
    #[must_use]
    pub fn idle(fence_count: usize) -> Self {
        Self {
            socket: SocketReadiness::default(),
            fences: alloc::vec![false; fence_count],
        }
    }
}

/// Failure of the blocking wait.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    /// The wait was interrupted by a signal; retry it.
    #[error("wait interrupted")]
    Interrupted,
    /// Any other failure; fatal for the loop.
    #[error("wait failed: {0}")]
    Failed(String),
}

/// The single blocking point of the loop.
pub trait Multiplexer<F> {
    /// Waits on the protocol socket plus every fence in `fences`.
    ///
    /// The returned [`Readiness::fences`] must have exactly `fences.len()`
    /// entries, aligned with the table.
    fn wait(
        &mut self,
        interest: SocketInterest,
        fences: &FenceTable<F>,
        timeout: Timeout,
    ) -> Result<Readiness, WaitError>;
}

/// Monotonic clock and kernel completion-time source.
pub trait FenceClock<F> {
    /// Failure of a completion-time query.
    type Error: fmt::Display;

    /// Current monotonic time.
    fn now(&mut self) -> HostTime;

    /// Authoritative completion time of a signaled fence.
    fn completion_time(&mut self, fence: &F) -> Result<HostTime, Self::Error>;
}
