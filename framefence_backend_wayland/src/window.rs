// Copyright 2026 the Framefence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The xdg toplevel the client renders into.

use framefence_core::window::Size;
use log::debug;
use wayland_client::protocol::wl_surface::WlSurface;
use wayland_protocols::xdg::shell::client::{xdg_surface::XdgSurface, xdg_toplevel::XdgToplevel};

use crate::SetupError;
use crate::event_loop::WaylandClient;

/// A `wl_surface` with the `xdg_surface` and `xdg_toplevel` roles.
///
/// The protocol objects are destroyed on drop, toplevel first.
#[derive(Debug)]
pub struct Window {
    surface: WlSurface,
    xdg_surface: XdgSurface,
    toplevel: XdgToplevel,
}

impl Window {
    /// Creates the toplevel and waits for its first configure.
    ///
    /// With `fixed` set, the minimum and maximum size are pinned to it. The
    /// configure serial stays pending until the frame loop acknowledges it.
    pub fn create(
        client: &mut WaylandClient,
        title: &str,
        fixed: Option<Size>,
    ) -> Result<Self, SetupError> {
        let qh = client.queue_handle();
        let surface = client.compositor().create_surface(qh, ());
        let xdg_surface = client.wm_base().get_xdg_surface(&surface, qh, ());
        let toplevel = xdg_surface.get_toplevel(qh, ());

        toplevel.set_title(title.to_owned());
        toplevel.set_app_id(title.to_owned());
        if let Some(size) = fixed {
            toplevel.set_min_size(size.width_i32(), size.height_i32());
            toplevel.set_max_size(size.width_i32(), size.height_i32());
        }
        surface.commit();

        let window = Self {
            surface,
            xdg_surface,
            toplevel,
        };
        client.roundtrip()?;
        debug!(
            "initial configure: {} (serial {:?})",
            client.window_state().negotiated_size(),
            client.window_state().pending_serial()
        );
        Ok(window)
    }

    /// The underlying surface.
    #[must_use]
    pub fn surface(&self) -> &WlSurface {
        &self.surface
    }

    pub(crate) fn xdg_surface(&self) -> &XdgSurface {
        &self.xdg_surface
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        self.toplevel.destroy();
        self.xdg_surface.destroy();
        self.surface.destroy();
    }
}
