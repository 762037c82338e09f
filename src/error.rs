use thiserror::Error;

/// Errors produced by the frame-execution core.
///
/// Only `SwapchainOutOfDate` is recoverable; it is consumed by the resize
/// protocol and never escapes `render_frame`. Every other variant reports a
/// condition after which GPU object state is undefined, so callers should
/// treat them as fatal and tear the process down.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Instance or device initialization failed.
    #[error("Device initialization failed: {0}")]
    DeviceInit(String),

    /// A Vulkan call failed at the call site.
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// The presentation surface is stale and must be recreated.
    #[error("Swapchain out of date: {0}")]
    SwapchainOutOfDate(String),

    /// A bounded CPU wait on a fence or acquire expired. Indicates a GPU
    /// hang or driver fault, not a transient condition.
    #[error("GPU wait timed out: {0}")]
    GpuTimeout(String),

    /// Descriptor allocation failed even after growing the pool set.
    #[error("Descriptor pools exhausted: {0}")]
    DescriptorExhausted(String),

    /// Surface format negotiation found no compatible configuration.
    #[error("No compatible surface configuration: {0}")]
    NoCompatibleSurface(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RenderError>;
