//! Frame-execution core for a real-time Vulkan renderer.
//!
//! This crate owns the synchronization-critical part of a renderer: the
//! frame-in-flight ring, deferred resource destruction, growable descriptor
//! allocation, the immediate-submit upload channel, and the swapchain
//! create/destroy/recreate protocol. Scene traversal, asset loading, and
//! pipeline construction are collaborator concerns plugged in through the
//! [`FrameRecorder`] trait.
//!
//! The CPU side is single threaded: one thread drives [`Renderer::render_frame`]
//! once per iteration of the host event loop, and at most two frames have
//! outstanding GPU work at any instant.

mod error;
pub mod renderer;
pub mod vulkan;

// Collaborators record raw Vulkan commands; give them the same ash.
pub use ash;

pub use error::{RenderError, Result};
pub use renderer::{
    DebugOverlay, FrameRecorder, RecordContext, Renderer, RendererConfig, FRAMES_IN_FLIGHT,
};
pub use vulkan::{HeadlessSurfaceProvider, SurfaceProvider, WindowSurfaceProvider};

/// Convenience re-exports for applications embedding the renderer.
pub mod prelude {
    pub use crate::renderer::{
        DebugOverlay, FrameRecorder, RecordContext, Renderer, RendererConfig,
    };
    pub use crate::vulkan::{SurfaceProvider, WindowSurfaceProvider};
    pub use crate::{RenderError, Result};
}
