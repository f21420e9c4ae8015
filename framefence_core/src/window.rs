// Copyright 2026 the Framefence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Surface configuration state written by protocol handlers.
//!
//! [`WindowState`] is the single record the window-system dispatch handlers
//! mutate. Every handler is a small idempotent setter; nothing here calls
//! back into the scheduler. The frame loop reads the record once per
//! iteration and consumes the pending configure serial after acknowledging
//! it.
//!
//! ```text
//!   configure(serial) ──► pending_serial (overwrites, never queues)
//!   resize(w, h)      ──► negotiated size (0 = client chooses)
//!   request_close()   ──► close flag (loop exit condition)
//!   frame_done()      ──► clears the outstanding frame callback
//! ```

use core::fmt;

/// Surface size used when the compositor leaves the choice to the client.
pub const DEFAULT_SIZE: Size = Size::new(500, 500);

/// Surface dimensions in pixels.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Creates a size from a width and height.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width clamped into the `i32` range used by protocol and GL calls.
    #[must_use]
    pub fn width_i32(self) -> i32 {
        i32::try_from(self.width).unwrap_or(i32::MAX)
    }

    /// Height clamped into the `i32` range used by protocol and GL calls.
    #[must_use]
    pub fn height_i32(self) -> i32 {
        i32::try_from(self.height).unwrap_or(i32::MAX)
    }
}

impl fmt::Debug for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// How a negotiated size is turned into the size actually rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SizePolicy {
    /// Size forced by the user, overriding anything the compositor sends.
    pub fixed: Option<Size>,
}

impl SizePolicy {
    /// Resolves a compositor-proposed size.
    ///
    /// A fixed size always wins. Otherwise each zero dimension falls back to
    /// [`DEFAULT_SIZE`] independently.
    #[must_use]
    pub fn resolve(self, proposed: Size) -> Size {
        let size = self.fixed.unwrap_or(proposed);
        Size {
            width: if size.width == 0 {
                DEFAULT_SIZE.width
            } else {
                size.width
            },
            height: if size.height == 0 {
                DEFAULT_SIZE.height
            } else {
                size.height
            },
        }
    }
}

/// Window lifecycle state shared between protocol handlers and the loop.
#[derive(Clone, Debug, Default)]
pub struct WindowState {
    negotiated: Size,
    current: Size,
    pending_serial: Option<u32>,
    close_requested: bool,
    frame_pending: bool,
    presented: bool,
}

impl WindowState {
    /// Creates an empty state: nothing negotiated, nothing pending.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a configure serial that must be acknowledged.
    ///
    /// A serial of zero is the protocol's "nothing to acknowledge" value and
    /// clears any pending serial.
    pub fn configure(&mut self, serial: u32) {
        self.pending_serial = (serial != 0).then_some(serial);
    }

    /// Records the geometry proposed by the compositor.
    ///
    /// Negative values are treated as zero ("client chooses").
    pub fn resize(&mut self, width: i32, height: i32) {
        self.negotiated = Size::new(
            u32::try_from(width).unwrap_or(0),
            u32::try_from(height).unwrap_or(0),
        );
    }

    /// Records a close request from the compositor.
    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    /// Marks a frame-presented notification as registered.
    pub fn frame_requested(&mut self) {
        self.frame_pending = true;
        self.presented = false;
    }

    /// Records delivery of the frame-presented notification.
    pub fn frame_done(&mut self) {
        self.frame_pending = false;
        self.presented = true;
    }

    /// Returns `true` once the compositor asked the window to close.
    #[must_use]
    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    /// Returns `true` while a frame-presented notification is outstanding.
    #[must_use]
    pub fn frame_pending(&self) -> bool {
        self.frame_pending
    }

    /// Consumes a delivered frame-presented notification.
    pub fn take_presented(&mut self) -> bool {
        core::mem::take(&mut self.presented)
    }

    /// Returns the configure serial awaiting acknowledgement, if any.
    #[must_use]
    pub fn pending_serial(&self) -> Option<u32> {
        self.pending_serial
    }

    /// Takes the pending serial, leaving nothing to acknowledge.
    pub fn take_pending_serial(&mut self) -> Option<u32> {
        self.pending_serial.take()
    }

    /// Returns the raw size last proposed by the compositor.
    #[must_use]
    pub fn negotiated_size(&self) -> Size {
        self.negotiated
    }

    /// Returns the size the surface is currently rendered at.
    #[must_use]
    pub fn current_size(&self) -> Size {
        self.current
    }

    /// Resolves the negotiated size with `policy` and adopts it.
    pub fn adopt_size(&mut self, policy: SizePolicy) -> Size {
        self.current = policy.resolve(self.negotiated);
        self.current
    }
}
