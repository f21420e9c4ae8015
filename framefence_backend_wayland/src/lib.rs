// Copyright 2026 the Framefence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wayland/EGL backend for framefence.
//!
//! This crate supplies every side effect of the frame loop in
//! `framefence_core`:
//!
//! - Protocol I/O over `wayland-client`, with the `xdg_wm_base` toplevel
//!   the frames are presented into
//! - GLES2 rendering through a dynamically loaded libEGL, with native fence
//!   export (`EGL_ANDROID_native_fence_sync`) when the driver offers it
//! - A `poll(2)` multiplexer over the Wayland socket and every fence
//! - Completion timestamps read from `sync_file` descriptors
//!
//! [`run`] wires these together for one session. Resources are created in
//! dependency order and released in reverse:
//!
//! ```text
//!   create:  connection ─► EGL display/context ─► toplevel ─► EGL surface + GL
//!   release: fences ─► GL + EGL surface ─► toplevel ─► EGL ─► connection
//! ```

#![expect(
    unsafe_code,
    reason = "EGL, GL, wayland-egl, and the sync_file ioctl are C interfaces"
)]

mod egl;
mod error;
mod event_loop;
mod poll;
mod render;
mod sync_file;
mod time;
mod window;

use framefence_core::frame_loop::{FrameLoop, LoopConfig, RunOutcome};
use framefence_core::report::LatencySink;
use log::info;

pub use egl::{EglContext, NativeSync, has_extension};
pub use error::SetupError;
pub use event_loop::{ConnectionFd, ProtocolError, WaylandClient, WaylandProtocol};
pub use poll::PollMultiplexer;
pub use render::{DEFAULT_ITERATIONS, GlesRenderer};
pub use sync_file::{FenceQueryError, SyncFileClock, completion_time};
pub use time::now;
pub use window::Window;

/// Toplevel title and app id.
pub const WINDOW_TITLE: &str = "framefence";

/// Everything needed to run one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Fractal iteration limit, which sets the GPU cost of a frame.
    pub iterations: u32,
    /// Multisample count requested from EGL.
    pub samples: Option<u32>,
    /// Pacing, frame cap, and size policy.
    pub frame_loop: LoopConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            samples: None,
            frame_loop: LoopConfig::default(),
        }
    }
}

/// Opens a window, renders until the loop exits, and tears everything down.
///
/// Every retired frame is reported to `sink`. Setup failures are returned as
/// errors; failures once the loop is running end up in the
/// [`RunOutcome`].
pub fn run(config: &SessionConfig, sink: &mut dyn LatencySink) -> Result<RunOutcome, SetupError> {
    let mut client = WaylandClient::connect()?;
    let egl = EglContext::new(&client, config.samples)?;
    let window = Window::create(&mut client, WINDOW_TITLE, config.frame_loop.size_policy.fixed)?;
    let size = client.window_state().adopt_size(config.frame_loop.size_policy);
    let mut renderer = GlesRenderer::new(&egl, &window, size, config.iterations)?;

    let mut mux = PollMultiplexer::new(ConnectionFd::new(client.connection()));
    let mut clock = SyncFileClock;
    let mut frame_loop = FrameLoop::new(config.frame_loop);
    info!(
        "rendering at {size} with {:?} pacing{}",
        config.frame_loop.pacing,
        if egl.has_native_fences() {
            ""
        } else {
            " (unmeasured)"
        }
    );

    let mut protocol = client.protocol(&window);
    let outcome = frame_loop.run(&mut protocol, &mut renderer, &mut mux, &mut clock, sink);
    info!(
        "stopped ({:?}) after {} frames, {} measured",
        outcome.reason, outcome.frames_submitted, outcome.frames_retired
    );
    Ok(outcome)
}
