// Copyright 2026 the Framefence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wayland connection, event queue, and the non-blocking read cycle.
//!
//! The backend owns one `EventQueue<ClientState>`. Every object that takes
//! part in event delivery is created with that queue's handle:
//!
//! | Object | Created by | Events handled |
//! |---|---|---|
//! | `wl_registry` | [`WaylandClient::connect`] | none after the initial global list |
//! | `wl_compositor` | registry bind | none |
//! | `xdg_wm_base` | registry bind | `ping` answered with `pong` |
//! | `wl_surface` / `xdg_surface` / `xdg_toplevel` | [`Window`](crate::window::Window) | configure, close |
//! | `wl_callback` | [`WaylandProtocol::request_frame`] | `done` |
//!
//! Handlers only write [`WindowState`]; the frame loop reads it back.
//!
//! # Read cycle
//!
//! ```text
//!   prepare_read()  ──► EventQueue::prepare_read() holds a ReadEventsGuard
//!   flush()         ──► Connection::flush(), EAGAIN = would block
//!   read_events()   ──► guard.read()
//!   cancel_read()   ──► drop(guard)
//! ```

use std::ffi::c_void;
use std::io;
use std::os::fd::{AsFd, BorrowedFd};

use framefence_core::backend::{Flush, Protocol};
use framefence_core::window::WindowState;
use log::{debug, trace};
use wayland_client::backend::{Backend, ReadEventsGuard, WaylandError};
use wayland_client::globals::{GlobalListContents, registry_queue_init};
use wayland_client::protocol::{wl_callback, wl_compositor, wl_registry, wl_surface};
use wayland_client::{
    Connection, Dispatch, DispatchError, EventQueue, QueueHandle, delegate_noop,
};
use wayland_protocols::xdg::shell::client::{xdg_surface, xdg_toplevel, xdg_wm_base};

use crate::SetupError;
use crate::window::Window;

/// Fatal failure of the protocol connection.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A handler or the queue itself failed.
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
    /// Socket I/O failed or the compositor raised a protocol error.
    #[error("connection failed: {0}")]
    Connection(#[from] WaylandError),
}

/// State mutated by the dispatch handlers.
#[derive(Debug, Default)]
pub(crate) struct ClientState {
    window: WindowState,
}

impl Dispatch<wl_registry::WlRegistry, GlobalListContents> for ClientState {
    fn event(
        _: &mut Self,
        _: &wl_registry::WlRegistry,
        _: wl_registry::Event,
        _: &GlobalListContents,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        // Globals appearing after startup are not used.
    }
}

impl Dispatch<xdg_wm_base::XdgWmBase, ()> for ClientState {
    fn event(
        _: &mut Self,
        wm_base: &xdg_wm_base::XdgWmBase,
        event: xdg_wm_base::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            trace!("xdg_wm_base ping {serial}");
            wm_base.pong(serial);
        }
    }
}

impl Dispatch<xdg_surface::XdgSurface, ()> for ClientState {
    fn event(
        state: &mut Self,
        _: &xdg_surface::XdgSurface,
        event: xdg_surface::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            state.window.configure(serial);
        }
    }
}

impl Dispatch<xdg_toplevel::XdgToplevel, ()> for ClientState {
    fn event(
        state: &mut Self,
        _: &xdg_toplevel::XdgToplevel,
        event: xdg_toplevel::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            xdg_toplevel::Event::Configure { width, height, .. } => {
                debug!("toplevel configure {width}x{height}");
                state.window.resize(width, height);
            }
            xdg_toplevel::Event::Close => state.window.request_close(),
            _ => {}
        }
    }
}

impl Dispatch<wl_callback::WlCallback, ()> for ClientState {
    fn event(
        state: &mut Self,
        _: &wl_callback::WlCallback,
        event: wl_callback::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_callback::Event::Done { .. } = event {
            state.window.frame_done();
        }
    }
}

delegate_noop!(ClientState: ignore wl_compositor::WlCompositor);
delegate_noop!(ClientState: ignore wl_surface::WlSurface);

/// Connection to the compositor with the globals the client needs.
pub struct WaylandClient {
    connection: Connection,
    queue: EventQueue<ClientState>,
    qh: QueueHandle<ClientState>,
    state: ClientState,
    compositor: wl_compositor::WlCompositor,
    wm_base: xdg_wm_base::XdgWmBase,
}

impl std::fmt::Debug for WaylandClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaylandClient")
            .field("state", &self.state)
            .field("compositor", &self.compositor)
            .field("wm_base", &self.wm_base)
            .finish_non_exhaustive()
    }
}

impl WaylandClient {
    /// Connects using `WAYLAND_DISPLAY` and binds `wl_compositor` and
    /// `xdg_wm_base`.
    pub fn connect() -> Result<Self, SetupError> {
        let connection = Connection::connect_to_env()?;
        let (globals, queue) = registry_queue_init::<ClientState>(&connection)?;
        let qh = queue.handle();

        let compositor: wl_compositor::WlCompositor = globals
            .bind(&qh, 1..=1, ())
            .map_err(|_| SetupError::MissingGlobal("wl_compositor"))?;
        let wm_base: xdg_wm_base::XdgWmBase = globals
            .bind(&qh, 1..=1, ())
            .map_err(|_| SetupError::MissingGlobal("xdg_wm_base"))?;

        Ok(Self {
            connection,
            queue,
            qh,
            state: ClientState::default(),
            compositor,
            wm_base,
        })
    }

    /// The underlying connection.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Raw `wl_display` pointer for EGL platform display creation.
    pub(crate) fn display_ptr(&self) -> *mut c_void {
        self.connection.backend().display_ptr().cast()
    }

    pub(crate) fn queue_handle(&self) -> &QueueHandle<ClientState> {
        &self.qh
    }

    pub(crate) fn compositor(&self) -> &wl_compositor::WlCompositor {
        &self.compositor
    }

    pub(crate) fn wm_base(&self) -> &xdg_wm_base::XdgWmBase {
        &self.wm_base
    }

    /// Window state written by the handlers.
    pub fn window_state(&mut self) -> &mut WindowState {
        &mut self.state.window
    }

    /// Blocks until the compositor has processed every request so far.
    pub fn roundtrip(&mut self) -> Result<(), ProtocolError> {
        self.queue.roundtrip(&mut self.state)?;
        Ok(())
    }

    /// Drives `window` through the frame loop's [`Protocol`] interface.
    pub fn protocol<'a>(&'a mut self, window: &'a Window) -> WaylandProtocol<'a> {
        WaylandProtocol {
            client: self,
            window,
            guard: None,
        }
    }
}

impl Drop for WaylandClient {
    fn drop(&mut self) {
        self.wm_base.destroy();
        if let Err(err) = self.connection.flush() {
            debug!("final flush: {err}");
        }
    }
}

/// Socket view of a connection for the event multiplexer.
#[derive(Clone)]
pub struct ConnectionFd(Backend);

impl std::fmt::Debug for ConnectionFd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ConnectionFd").field(&self.as_fd()).finish()
    }
}

impl ConnectionFd {
    /// Shares the socket of `connection`.
    #[must_use]
    pub fn new(connection: &Connection) -> Self {
        Self(connection.backend())
    }
}

impl AsFd for ConnectionFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.poll_fd()
    }
}

/// [`Protocol`] implementation borrowing a client and its window.
///
/// Dropping it cancels a prepared read that was never completed.
pub struct WaylandProtocol<'a> {
    client: &'a mut WaylandClient,
    window: &'a Window,
    guard: Option<ReadEventsGuard>,
}

impl std::fmt::Debug for WaylandProtocol<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaylandProtocol")
            .field("window", &self.window)
            .field("read_prepared", &self.guard.is_some())
            .finish_non_exhaustive()
    }
}

fn would_block(err: &WaylandError) -> bool {
    matches!(err, WaylandError::Io(io) if io.kind() == io::ErrorKind::WouldBlock)
}

impl Protocol for WaylandProtocol<'_> {
    type Error = ProtocolError;

    fn window(&mut self) -> &mut WindowState {
        &mut self.client.state.window
    }

    fn prepare_read(&mut self) -> bool {
        if self.guard.is_some() {
            return true;
        }
        self.guard = self.client.queue.prepare_read();
        self.guard.is_some()
    }

    fn dispatch_pending(&mut self) -> Result<(), ProtocolError> {
        let dispatched = self.client.queue.dispatch_pending(&mut self.client.state)?;
        if dispatched > 0 {
            trace!("dispatched {dispatched} events");
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<Flush, ProtocolError> {
        match self.client.connection.flush() {
            Ok(()) => Ok(Flush::Complete),
            Err(err) if would_block(&err) => Ok(Flush::WouldBlock),
            Err(err) => Err(err.into()),
        }
    }

    fn cancel_read(&mut self) {
        self.guard = None;
    }

    fn read_events(&mut self) -> Result<(), ProtocolError> {
        let Some(guard) = self.guard.take() else {
            return Ok(());
        };
        match guard.read() {
            Ok(_) => Ok(()),
            Err(err) if would_block(&err) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn request_frame(&mut self) {
        self.window.surface().frame(&self.client.qh, ());
    }

    fn ack_configure(&mut self, serial: u32) {
        self.window.xdg_surface().ack_configure(serial);
    }
}
