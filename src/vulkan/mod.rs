//! Thin ownership wrappers over the raw Vulkan API.
//!
//! Everything here is policy free: the modules own handles and map failures
//! into [`crate::RenderError`], while frame pacing and lifetime decisions
//! live in [`crate::renderer`].

pub mod allocator;
pub mod commands;
pub mod descriptors;
pub mod device;
pub mod instance;
pub mod surface;
pub mod swapchain;

pub use allocator::Allocator;
pub use commands::CommandContext;
pub use descriptors::{
    DescriptorAllocatorGrowable, DescriptorSetLayout, DescriptorSetLayoutBuilder, PoolSizeRatio,
};
pub use device::VulkanDevice;
pub use instance::VulkanInstance;
pub use surface::{HeadlessSurfaceProvider, SurfaceProvider, WindowSurfaceProvider};
pub use swapchain::Swapchain;
