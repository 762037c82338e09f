//! Surface provider trait for decoupling windowing from renderer initialization.
//!
//! The renderer never links a window library; anything that can hand out raw
//! window/display handles (winit, SDL, a bare Wayland client) can back a
//! surface, and tests/benches can run headless.

use ash::{khr::surface, vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};

use crate::{RenderError, Result};

/// Trait for providing a Vulkan surface to the renderer.
pub trait SurfaceProvider {
    /// Create a Vulkan surface using the provided entry and instance.
    ///
    /// # Safety
    /// The caller must ensure the entry and instance are valid.
    unsafe fn create_surface(&self, entry: &Entry, instance: &Instance) -> Result<vk::SurfaceKHR>;

    /// Current drawable extent of the surface.
    fn extent(&self) -> vk::Extent2D;

    /// Instance extensions this surface type needs.
    fn required_extensions(&self) -> Vec<*const i8> {
        let mut extensions = vec![surface::NAME.as_ptr()];

        #[cfg(target_os = "windows")]
        extensions.push(ash::khr::win32_surface::NAME.as_ptr());

        #[cfg(target_os = "linux")]
        {
            extensions.push(ash::khr::xlib_surface::NAME.as_ptr());
            extensions.push(ash::khr::wayland_surface::NAME.as_ptr());
        }

        #[cfg(target_os = "macos")]
        extensions.push(ash::ext::metal_surface::NAME.as_ptr());

        extensions
    }
}

/// Window-backed surface provider wrapping any type that implements
/// `HasWindowHandle` and `HasDisplayHandle` (e.g. `winit::window::Window`).
pub struct WindowSurfaceProvider<W> {
    window: W,
    width: u32,
    height: u32,
}

impl<W> WindowSurfaceProvider<W> {
    pub fn new(window: W, width: u32, height: u32) -> Self {
        Self {
            window,
            width,
            height,
        }
    }

    /// Update the cached extent (e.g. after a window resize).
    pub fn set_extent(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn window(&self) -> &W {
        &self.window
    }
}

impl<W: HasWindowHandle + HasDisplayHandle> SurfaceProvider for WindowSurfaceProvider<W> {
    unsafe fn create_surface(&self, entry: &Entry, instance: &Instance) -> Result<vk::SurfaceKHR> {
        let window = self
            .window
            .window_handle()
            .map(|h| h.as_raw())
            .map_err(|e| RenderError::DeviceInit(format!("Failed to get window handle: {e:?}")))?;
        let display = self
            .window
            .display_handle()
            .map(|h| h.as_raw())
            .map_err(|e| RenderError::DeviceInit(format!("Failed to get display handle: {e:?}")))?;
        create_surface_raw(entry, instance, window, display)
    }

    fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

/// Headless surface provider for CI and benches (no actual surface).
///
/// The renderer runs without a swapchain when given a null surface; acquire
/// and present are skipped and frames cycle on fences alone.
pub struct HeadlessSurfaceProvider {
    width: u32,
    height: u32,
}

impl HeadlessSurfaceProvider {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl SurfaceProvider for HeadlessSurfaceProvider {
    unsafe fn create_surface(
        &self,
        _entry: &Entry,
        _instance: &Instance,
    ) -> Result<vk::SurfaceKHR> {
        Ok(vk::SurfaceKHR::null())
    }

    fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    fn required_extensions(&self) -> Vec<*const i8> {
        Vec::new()
    }
}

unsafe fn create_surface_raw(
    entry: &Entry,
    instance: &Instance,
    window: RawWindowHandle,
    display: RawDisplayHandle,
) -> Result<vk::SurfaceKHR> {
    match (window, display) {
        #[cfg(target_os = "windows")]
        (RawWindowHandle::Win32(handle), _) => {
            use ash::khr::win32_surface;

            let create_info = vk::Win32SurfaceCreateInfoKHR::default()
                .hwnd(handle.hwnd.get() as vk::HWND)
                .hinstance(handle.hinstance.map(|h| h.get()).unwrap_or(0) as vk::HINSTANCE);

            win32_surface::Instance::new(entry, instance)
                .create_win32_surface(&create_info, None)
                .map_err(|e| RenderError::Vulkan(format!("Failed to create Win32 surface: {e:?}")))
        }
        #[cfg(target_os = "linux")]
        (RawWindowHandle::Wayland(handle), RawDisplayHandle::Wayland(display)) => {
            use ash::khr::wayland_surface;

            let create_info = vk::WaylandSurfaceCreateInfoKHR::default()
                .display(display.display.as_ptr())
                .surface(handle.surface.as_ptr());

            wayland_surface::Instance::new(entry, instance)
                .create_wayland_surface(&create_info, None)
                .map_err(|e| {
                    RenderError::Vulkan(format!("Failed to create Wayland surface: {e:?}"))
                })
        }
        #[cfg(target_os = "linux")]
        (RawWindowHandle::Xlib(handle), RawDisplayHandle::Xlib(display)) => {
            use ash::khr::xlib_surface;

            let create_info = vk::XlibSurfaceCreateInfoKHR::default()
                .dpy(
                    display
                        .display
                        .map(|d| d.as_ptr())
                        .unwrap_or(std::ptr::null_mut()) as *mut _,
                )
                .window(handle.window);

            xlib_surface::Instance::new(entry, instance)
                .create_xlib_surface(&create_info, None)
                .map_err(|e| RenderError::Vulkan(format!("Failed to create Xlib surface: {e:?}")))
        }
        // macOS needs a CAMetalLayer attached to the NSView before surface
        // creation; embedders there should implement SurfaceProvider over
        // their layer directly.
        _ => Err(RenderError::DeviceInit(
            "Unsupported window/display handle combination".to_string(),
        )),
    }
}
