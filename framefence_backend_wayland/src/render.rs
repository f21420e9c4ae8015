// Copyright 2026 the Framefence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! GLES2 renderer: one full-screen quad running an escape-time fractal.
//!
//! The fractal keeps the GPU busy for a tunable amount of time per frame
//! (`iterations`), which is what the latency measurement observes. All GL
//! state except the viewport and the hue offset is bound once at creation.

use glow::HasContext;
use khronos_egl as egl;
use log::{debug, info};
use wayland_client::Proxy;
use wayland_egl::WlEglSurface;

use framefence_core::backend::{RenderError, Renderer};
use framefence_core::fence::FrameSeq;
use framefence_core::window::Size;

use crate::SetupError;
use crate::egl::{EglContext, NativeSync};
use crate::window::Window;

const VERTEX_SHADER: &str = "\
precision highp float;
attribute vec2 in_pos;
varying vec2 v_pos;
void main() {
    v_pos = in_pos;
    gl_Position = vec4(in_pos, 0.0, 1.0);
}
";

const FRAGMENT_SHADER: &str = "\
precision highp float;
uniform float offset;
uniform int iter;
varying vec2 v_pos;

vec3 hue_to_rgb(float hue) {
    vec3 k = vec3(1.0, 2.0 / 3.0, 1.0 / 3.0);
    vec3 p = abs(fract(vec3(hue) + k) * 6.0 - 3.0);
    return clamp(p - 1.0, 0.0, 1.0);
}

void main() {
    vec2 c = vec2(1.5 * v_pos.x - 0.5, 1.5 * v_pos.y);
    vec2 z = vec2(0.0);
    int i = 0;
    while (dot(z, z) <= 4.0 && i < iter) {
        z = vec2(z.x * z.x - z.y * z.y, 2.0 * z.x * z.y) + c;
        ++i;
    }
    if (i == iter) {
        gl_FragColor = vec4(0.0, 0.0, 0.0, 1.0);
    } else {
        float escape = log(float(iter) / float(i)) / 15.0;
        gl_FragColor = vec4(hue_to_rgb(escape + offset), 1.0);
    }
}
";

/// Triangle-fan quad covering clip space.
const QUAD: [[f32; 2]; 4] = [[-1.0, -1.0], [-1.0, 1.0], [1.0, 1.0], [1.0, -1.0]];

/// Hue advance per frame.
const HUE_STEP: f32 = 0.01;

/// Default fractal iteration limit.
pub const DEFAULT_ITERATIONS: u32 = 1000;

fn compile(gl: &glow::Context, kind: u32, source: &str) -> Result<glow::Shader, SetupError> {
    // SAFETY: the context is current on this thread.
    unsafe {
        let shader = gl.create_shader(kind).map_err(SetupError::GlProgram)?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            return Err(SetupError::GlProgram(log));
        }
        Ok(shader)
    }
}

fn link(gl: &glow::Context) -> Result<glow::Program, SetupError> {
    let vertex = compile(gl, glow::VERTEX_SHADER, VERTEX_SHADER)?;
    let fragment = match compile(gl, glow::FRAGMENT_SHADER, FRAGMENT_SHADER) {
        Ok(fragment) => fragment,
        Err(err) => {
            // SAFETY: the context is current on this thread.
            unsafe { gl.delete_shader(vertex) };
            return Err(err);
        }
    };

    // SAFETY: the context is current on this thread; both shaders compiled.
    unsafe {
        let program = gl.create_program().map_err(SetupError::GlProgram)?;
        gl.attach_shader(program, vertex);
        gl.attach_shader(program, fragment);
        gl.bind_attrib_location(program, 0, "in_pos");
        gl.link_program(program);
        gl.detach_shader(program, vertex);
        gl.detach_shader(program, fragment);
        gl.delete_shader(vertex);
        gl.delete_shader(fragment);
        if !gl.get_program_link_status(program) {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            return Err(SetupError::GlProgram(log));
        }
        Ok(program)
    }
}

/// [`Renderer`] drawing into a `wl_egl_window` through EGL.
pub struct GlesRenderer<'a> {
    egl: &'a EglContext,
    gl: glow::Context,
    surface: egl::Surface,
    program: glow::Program,
    quad: glow::Buffer,
    offset: Option<glow::UniformLocation>,
    hue: f32,
    // Dropped after `surface` is destroyed in `Drop`.
    native_window: WlEglSurface,
}

impl std::fmt::Debug for GlesRenderer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlesRenderer")
            .field("egl", &self.egl)
            .field("hue", &self.hue)
            .finish_non_exhaustive()
    }
}

impl<'a> GlesRenderer<'a> {
    /// Creates the EGL window surface for `window` and binds all GL state.
    pub fn new(
        egl: &'a EglContext,
        window: &Window,
        size: Size,
        iterations: u32,
    ) -> Result<Self, SetupError> {
        let native_window =
            WlEglSurface::new(window.surface().id(), size.width_i32(), size.height_i32())
                .map_err(|err| SetupError::EglWindow(err.to_string()))?;
        let surface = egl.create_window_surface(native_window.ptr().cast_mut())?;
        if let Err(err) = egl
            .make_current(surface)
            .and_then(|()| egl.disable_swap_throttling())
        {
            egl.destroy_surface(surface);
            return Err(err);
        }

        // SAFETY: the context was just made current; the loader returns
        // entry points of that context.
        let gl = unsafe { glow::Context::from_loader_function(|name| egl.get_proc_address(name)) };
        // SAFETY: the context is current.
        let version = unsafe { gl.get_parameter_string(glow::VERSION) };
        info!("GL {version}");

        let program = match link(&gl) {
            Ok(program) => program,
            Err(err) => {
                egl.destroy_surface(surface);
                return Err(err);
            }
        };

        let iterations = i32::try_from(iterations).unwrap_or(i32::MAX);
        // SAFETY: the context is current; `program` linked successfully and
        // the vertex data outlives the upload.
        let (quad, offset) = unsafe {
            let quad = match gl.create_buffer() {
                Ok(quad) => quad,
                Err(err) => {
                    gl.delete_program(program);
                    egl.destroy_surface(surface);
                    return Err(SetupError::GlProgram(err));
                }
            };
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(quad));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(&QUAD),
                glow::STATIC_DRAW,
            );
            gl.use_program(Some(program));
            gl.enable_vertex_attrib_array(0);
            gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, 0, 0);

            let iter = gl.get_uniform_location(program, "iter");
            gl.uniform_1_i32(iter.as_ref(), iterations);
            (quad, gl.get_uniform_location(program, "offset"))
        };
        debug!("renderer ready at {size}, {iterations} iterations");

        Ok(Self {
            egl,
            gl,
            surface,
            program,
            quad,
            offset,
            hue: 0.0,
            native_window,
        })
    }
}

impl Renderer for GlesRenderer<'_> {
    type Sync = NativeSync;
    type Fence = std::os::fd::OwnedFd;

    fn resize(&mut self, size: Size) {
        self.native_window
            .resize(size.width_i32(), size.height_i32(), 0, 0);
    }

    fn draw(&mut self, size: Size, _frame: FrameSeq) {
        // SAFETY: the context is current and all state was bound in `new`.
        unsafe {
            self.gl.viewport(0, 0, size.width_i32(), size.height_i32());
            self.gl.uniform_1_f32(self.offset.as_ref(), self.hue);
            self.gl.draw_arrays(glow::TRIANGLE_FAN, 0, 4);
        }
        self.hue += HUE_STEP;
    }

    fn create_fence(&mut self) -> Option<NativeSync> {
        self.egl.create_native_sync()
    }

    fn present(&mut self) -> Result<(), RenderError> {
        self.egl
            .swap_buffers(self.surface)
            .map_err(|err| RenderError(format!("eglSwapBuffers: {err}")))
    }

    fn export_fence(&mut self, sync: NativeSync) -> Option<std::os::fd::OwnedFd> {
        self.egl.export_native_sync(sync)
    }
}

impl Drop for GlesRenderer<'_> {
    fn drop(&mut self) {
        // SAFETY: the context is still current on this thread.
        unsafe {
            self.gl.delete_buffer(self.quad);
            self.gl.delete_program(self.program);
        }
        self.egl.destroy_surface(self.surface);
    }
}
