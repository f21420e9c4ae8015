// Copyright 2026 the Framefence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! EGL display, context, and native fence entry points.
//!
//! libEGL is loaded at runtime. The Wayland platform and native fence
//! export are extensions, so their entry points are resolved through
//! `eglGetProcAddress` after probing the extension strings:
//!
//! | Extension | Scope | If missing |
//! |---|---|---|
//! | `EGL_EXT_platform_wayland` | client | setup fails |
//! | `EGL_ANDROID_native_fence_sync` | display | degraded mode, no measurements |

use std::ffi::c_void;
use std::os::fd::{FromRawFd, OwnedFd};

use khronos_egl as egl;
use log::{debug, info, warn};

use crate::SetupError;
use crate::event_loop::WaylandClient;

type Instance = egl::DynamicInstance<egl::EGL1_4>;

const EGL_PLATFORM_WAYLAND_EXT: egl::Enum = 0x31D8;
const EGL_SYNC_NATIVE_FENCE_ANDROID: egl::Enum = 0x3144;
const EGL_NO_NATIVE_FENCE_FD_ANDROID: egl::Int = -1;

const PLATFORM_WAYLAND: &str = "EGL_EXT_platform_wayland";
const NATIVE_FENCE_SYNC: &str = "EGL_ANDROID_native_fence_sync";

type GetPlatformDisplayFn =
    unsafe extern "system" fn(egl::Enum, *mut c_void, *const egl::Int) -> egl::EGLDisplay;
type CreatePlatformWindowSurfaceFn = unsafe extern "system" fn(
    egl::EGLDisplay,
    egl::EGLConfig,
    *mut c_void,
    *const egl::Int,
) -> egl::EGLSurface;
type CreateSyncFn =
    unsafe extern "system" fn(egl::EGLDisplay, egl::Enum, *const egl::Int) -> *mut c_void;
type DestroySyncFn = unsafe extern "system" fn(egl::EGLDisplay, *mut c_void) -> egl::Boolean;
type DupNativeFenceFn = unsafe extern "system" fn(egl::EGLDisplay, *mut c_void) -> egl::Int;

/// Returns `true` if the space-separated `extensions` list contains `name`.
///
/// Matches whole names only, so a prefix of a longer extension does not
/// count.
#[must_use]
pub fn has_extension(extensions: &str, name: &str) -> bool {
    extensions.split_ascii_whitespace().any(|ext| ext == name)
}

fn egl_error(call: &'static str, source: egl::Error) -> SetupError {
    SetupError::Egl { call, source }
}

/// Error for a raw extension call that signals failure with a sentinel.
fn last_error(egl: &Instance, call: &'static str) -> SetupError {
    egl.get_error().map_or(SetupError::EglCall(call), |source| {
        SetupError::Egl { call, source }
    })
}

fn proc_address(egl: &Instance, name: &'static str) -> Option<extern "system" fn()> {
    let addr = egl.get_proc_address(name);
    if addr.is_none() {
        debug!("eglGetProcAddress({name}) returned null");
    }
    addr
}

/// A GPU sync object awaiting export.
#[derive(Debug)]
pub struct NativeSync(*mut c_void);

/// `EGL_ANDROID_native_fence_sync` entry points.
#[derive(Clone, Copy)]
pub(crate) struct FenceSync {
    create: CreateSyncFn,
    destroy: DestroySyncFn,
    dup: DupNativeFenceFn,
}

impl std::fmt::Debug for FenceSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FenceSync").finish_non_exhaustive()
    }
}

impl FenceSync {
    fn load(egl: &Instance) -> Option<Self> {
        let create = proc_address(egl, "eglCreateSyncKHR")?;
        let destroy = proc_address(egl, "eglDestroySyncKHR")?;
        let dup = proc_address(egl, "eglDupNativeFenceFDANDROID")?;
        // SAFETY: the signatures are those published by EGL_KHR_fence_sync
        // and EGL_ANDROID_native_fence_sync.
        unsafe {
            Some(Self {
                create: core::mem::transmute::<extern "system" fn(), CreateSyncFn>(create),
                destroy: core::mem::transmute::<extern "system" fn(), DestroySyncFn>(destroy),
                dup: core::mem::transmute::<extern "system" fn(), DupNativeFenceFn>(dup),
            })
        }
    }
}

/// Initialised EGL display with a GLES2 context.
pub struct EglContext {
    egl: Instance,
    display: egl::Display,
    config: egl::Config,
    context: egl::Context,
    create_window_surface: CreatePlatformWindowSurfaceFn,
    fence_sync: Option<FenceSync>,
}

impl std::fmt::Debug for EglContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EglContext")
            .field("display", &self.display.as_ptr())
            .field("native_fence_sync", &self.fence_sync.is_some())
            .finish_non_exhaustive()
    }
}

impl EglContext {
    /// Loads libEGL and sets up a GLES2 context on the client's display.
    ///
    /// The context must be dropped before `client`. `samples` requests a
    /// multisampled config.
    pub fn new(client: &WaylandClient, samples: Option<u32>) -> Result<Self, SetupError> {
        // SAFETY: libEGL's load-time initialisers have no preconditions.
        let lib = unsafe { libloading::Library::new("libEGL.so.1") }
            .map_err(|err| SetupError::LoadEgl(err.to_string()))?;
        // SAFETY: the library is a conforming EGL implementation.
        let egl = unsafe { Instance::load_required_from(lib) }
            .map_err(|err| SetupError::LoadEgl(err.to_string()))?;

        let client_extensions = egl
            .query_string(None, egl::EXTENSIONS)
            .map(|exts| exts.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!("EGL client extensions: {client_extensions}");
        if !has_extension(&client_extensions, PLATFORM_WAYLAND) {
            return Err(SetupError::MissingExtension(PLATFORM_WAYLAND));
        }

        let get_platform_display = proc_address(&egl, "eglGetPlatformDisplayEXT")
            .ok_or(SetupError::MissingEntryPoint("eglGetPlatformDisplayEXT"))?;
        let create_window_surface = proc_address(&egl, "eglCreatePlatformWindowSurfaceEXT")
            .ok_or(SetupError::MissingEntryPoint(
                "eglCreatePlatformWindowSurfaceEXT",
            ))?;
        // SAFETY: signatures published by EGL_EXT_platform_base.
        let (get_platform_display, create_window_surface) = unsafe {
            (
                core::mem::transmute::<extern "system" fn(), GetPlatformDisplayFn>(
                    get_platform_display,
                ),
                core::mem::transmute::<extern "system" fn(), CreatePlatformWindowSurfaceFn>(
                    create_window_surface,
                ),
            )
        };

        // SAFETY: the display pointer belongs to a live connection and the
        // attribute list may be null.
        let raw_display = unsafe {
            get_platform_display(
                EGL_PLATFORM_WAYLAND_EXT,
                client.display_ptr(),
                core::ptr::null(),
            )
        };
        if raw_display.is_null() {
            return Err(last_error(&egl, "eglGetPlatformDisplayEXT"));
        }
        // SAFETY: non-null display returned by EGL.
        let display = unsafe { egl::Display::from_ptr(raw_display) };

        let (major, minor) = egl
            .initialize(display)
            .map_err(|err| egl_error("eglInitialize", err))?;
        info!("EGL {major}.{minor} on Wayland");

        let display_extensions = egl
            .query_string(Some(display), egl::EXTENSIONS)
            .map(|exts| exts.to_string_lossy().into_owned())
            .unwrap_or_default();
        let fence_sync = if has_extension(&display_extensions, NATIVE_FENCE_SYNC) {
            let fence_sync = FenceSync::load(&egl);
            if fence_sync.is_none() {
                warn!("{NATIVE_FENCE_SYNC} advertised without entry points; latency will not be measured");
            }
            fence_sync
        } else {
            warn!("{NATIVE_FENCE_SYNC} unsupported; latency will not be measured");
            None
        };

        let mut attribs = vec![
            egl::RED_SIZE,
            8,
            egl::GREEN_SIZE,
            8,
            egl::BLUE_SIZE,
            8,
            egl::ALPHA_SIZE,
            0,
            egl::RENDERABLE_TYPE,
            egl::OPENGL_ES2_BIT,
        ];
        if let Some(samples) = samples.filter(|&n| n > 0) {
            let samples = egl::Int::try_from(samples).unwrap_or(egl::Int::MAX);
            attribs.extend([egl::SAMPLE_BUFFERS, 1, egl::SAMPLES, samples]);
        }
        attribs.push(egl::NONE);

        let config = match egl.choose_first_config(display, &attribs) {
            Ok(Some(config)) => config,
            Ok(None) => {
                // Already failing; a terminate error would hide the cause.
                let _ = egl.terminate(display);
                return Err(SetupError::NoConfig);
            }
            Err(err) => {
                let _ = egl.terminate(display);
                return Err(egl_error("eglChooseConfig", err));
            }
        };

        let context = egl
            .bind_api(egl::OPENGL_ES_API)
            .and_then(|()| {
                egl.create_context(
                    display,
                    config,
                    None,
                    &[egl::CONTEXT_CLIENT_VERSION, 2, egl::NONE],
                )
            })
            .map_err(|err| {
                let _ = egl.terminate(display);
                egl_error("eglCreateContext", err)
            })?;

        Ok(Self {
            egl,
            display,
            config,
            context,
            create_window_surface,
            fence_sync,
        })
    }

    /// Returns `true` when native fences can be exported.
    #[must_use]
    pub fn has_native_fences(&self) -> bool {
        self.fence_sync.is_some()
    }

    /// Creates a window surface for a `wl_egl_window`.
    pub(crate) fn create_window_surface(
        &self,
        native_window: *mut c_void,
    ) -> Result<egl::Surface, SetupError> {
        // SAFETY: display and config belong to this context; `native_window`
        // is a live `wl_egl_window` owned by the caller.
        let raw = unsafe {
            (self.create_window_surface)(
                self.display.as_ptr(),
                self.config.as_ptr(),
                native_window,
                core::ptr::null(),
            )
        };
        if raw.is_null() {
            return Err(last_error(&self.egl, "eglCreatePlatformWindowSurfaceEXT"));
        }
        // SAFETY: non-null surface returned by EGL.
        Ok(unsafe { egl::Surface::from_ptr(raw) })
    }

    /// Binds the context with `surface` as draw and read target.
    pub(crate) fn make_current(&self, surface: egl::Surface) -> Result<(), SetupError> {
        self.egl
            .make_current(self.display, Some(surface), Some(surface), Some(self.context))
            .map_err(|err| egl_error("eglMakeCurrent", err))
    }

    /// Disables vsync throttling inside `eglSwapBuffers`.
    pub(crate) fn disable_swap_throttling(&self) -> Result<(), SetupError> {
        self.egl
            .swap_interval(self.display, 0)
            .map_err(|err| egl_error("eglSwapInterval", err))
    }

    pub(crate) fn swap_buffers(&self, surface: egl::Surface) -> Result<(), egl::Error> {
        self.egl.swap_buffers(self.display, surface)
    }

    pub(crate) fn destroy_surface(&self, surface: egl::Surface) {
        // Unbind first; destroying a current surface is deferred by EGL.
        let _ = self.egl.make_current(self.display, None, None, None);
        if let Err(err) = self.egl.destroy_surface(self.display, surface) {
            warn!("eglDestroySurface: {err}");
        }
    }

    pub(crate) fn get_proc_address(&self, name: &str) -> *const c_void {
        self.egl
            .get_proc_address(name)
            .map_or(core::ptr::null(), |addr| addr as *const c_void)
    }

    /// Creates a native fence covering all GL work submitted so far.
    pub(crate) fn create_native_sync(&self) -> Option<NativeSync> {
        let fence_sync = self.fence_sync?;
        // SAFETY: live display; a null attribute list is allowed.
        let sync = unsafe {
            (fence_sync.create)(
                self.display.as_ptr(),
                EGL_SYNC_NATIVE_FENCE_ANDROID,
                core::ptr::null(),
            )
        };
        if sync.is_null() {
            debug!("eglCreateSyncKHR failed: {:?}", self.egl.get_error());
            return None;
        }
        Some(NativeSync(sync))
    }

    /// Duplicates `sync` as a `sync_file` descriptor and destroys `sync`.
    pub(crate) fn export_native_sync(&self, sync: NativeSync) -> Option<OwnedFd> {
        let fence_sync = self.fence_sync?;
        // SAFETY: `sync` was created on this display and is destroyed
        // exactly once, here.
        let fd = unsafe {
            let fd = (fence_sync.dup)(self.display.as_ptr(), sync.0);
            (fence_sync.destroy)(self.display.as_ptr(), sync.0);
            fd
        };
        if fd == EGL_NO_NATIVE_FENCE_FD_ANDROID {
            debug!("eglDupNativeFenceFDANDROID failed: {:?}", self.egl.get_error());
            return None;
        }
        // SAFETY: EGL hands over ownership of a freshly duplicated fd.
        Some(unsafe { OwnedFd::from_raw_fd(fd) })
    }
}

impl Drop for EglContext {
    fn drop(&mut self) {
        let _ = self.egl.make_current(self.display, None, None, None);
        if let Err(err) = self.egl.destroy_context(self.display, self.context) {
            warn!("eglDestroyContext: {err}");
        }
        if let Err(err) = self.egl.terminate(self.display) {
            warn!("eglTerminate: {err}");
        }
        if let Err(err) = self.egl.release_thread() {
            warn!("eglReleaseThread: {err}");
        }
    }
}
