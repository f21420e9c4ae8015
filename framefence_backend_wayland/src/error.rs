// Copyright 2026 the Framefence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Setup errors.

use wayland_client::ConnectError;
use wayland_client::globals::GlobalError;

use crate::event_loop::ProtocolError;

/// Failure while bringing up the window, EGL, or GL state.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// No compositor could be reached.
    #[error("cannot connect to the Wayland display: {0}")]
    Connect(#[from] ConnectError),
    /// The initial registry round-trip failed.
    #[error("cannot read the Wayland registry: {0}")]
    Registry(#[from] GlobalError),
    /// A required global is not advertised.
    #[error("compositor does not advertise {0}")]
    MissingGlobal(&'static str),
    /// The connection failed during setup.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// libEGL could not be loaded.
    #[error("cannot load libEGL: {0}")]
    LoadEgl(String),
    /// A required EGL extension is not advertised.
    #[error("{0} is not supported")]
    MissingExtension(&'static str),
    /// An advertised extension's entry point could not be resolved.
    #[error("{0} is not exported by libEGL")]
    MissingEntryPoint(&'static str),
    /// An EGL call failed with an error code.
    #[error("{call} failed: {source}")]
    Egl {
        /// The failing EGL function.
        call: &'static str,
        /// The EGL error code.
        source: khronos_egl::Error,
    },
    /// An EGL call failed without reporting an error code.
    #[error("{0} failed")]
    EglCall(&'static str),
    /// No framebuffer config matches the requested attributes.
    #[error("no EGL config matches the requested attributes")]
    NoConfig,
    /// The `wl_egl_window` could not be created.
    #[error("cannot create wl_egl_window: {0}")]
    EglWindow(String),
    /// Shader compilation, program linking, or GL object creation failed.
    #[error("GL program: {0}")]
    GlProgram(String),
}
