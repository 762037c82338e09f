//! Frame pacing, resource lifetimes, and the per-frame execution loop.

pub mod deletion;
pub mod frame;
pub mod immediate;
pub mod renderer;
pub mod resources;

pub use deletion::DeletionQueue;
pub use frame::{FrameRing, FrameSlot, FRAMES_IN_FLIGHT};
pub use immediate::ImmediateSubmit;
pub use renderer::{DebugOverlay, FrameRecorder, RecordContext, Renderer, RendererConfig};
pub use resources::{AllocatedBuffer, AllocatedImage};
