use ash::vk;
use vk_mem::Alloc;

use super::device::VulkanDevice;
use crate::{RenderError, Result};

/// GPU memory allocator shared across the renderer as `Arc<Allocator>`.
///
/// Thin wrapper over `vk_mem` so call sites deal in crate errors and never
/// see the raw allocator handle.
pub struct Allocator {
    inner: vk_mem::Allocator,
}

impl Allocator {
    pub fn new(device: &VulkanDevice) -> Result<Self> {
        let mut create_info = vk_mem::AllocatorCreateInfo::new(
            device.instance.instance(),
            &device.device,
            device.physical_device,
        );
        create_info.vulkan_api_version = vk::API_VERSION_1_3;
        create_info.flags = vk_mem::AllocatorCreateFlags::BUFFER_DEVICE_ADDRESS;

        let inner = unsafe {
            vk_mem::Allocator::new(create_info)
                .map_err(|e| RenderError::DeviceInit(format!("Failed to create allocator: {e:?}")))?
        };

        Ok(Self { inner })
    }

    /// Allocate a buffer together with its backing memory.
    ///
    /// # Safety
    /// The returned pair must be released through [`Allocator::destroy_buffer`]
    /// before the allocator is dropped.
    pub unsafe fn create_buffer(
        &self,
        buffer_info: &vk::BufferCreateInfo,
        usage: vk_mem::MemoryUsage,
        flags: vk_mem::AllocationCreateFlags,
    ) -> Result<(vk::Buffer, vk_mem::Allocation)> {
        let alloc_info = vk_mem::AllocationCreateInfo {
            usage,
            flags,
            ..Default::default()
        };

        self.inner
            .create_buffer(buffer_info, &alloc_info)
            .map_err(|e| RenderError::Vulkan(format!("Buffer allocation failed: {e:?}")))
    }

    /// # Safety
    /// The buffer must have been created by this allocator and no GPU work
    /// may still reference it.
    pub unsafe fn destroy_buffer(&self, buffer: vk::Buffer, allocation: &mut vk_mem::Allocation) {
        self.inner.destroy_buffer(buffer, allocation);
    }

    /// Allocate an image together with its backing memory.
    ///
    /// # Safety
    /// The returned pair must be released through [`Allocator::destroy_image`]
    /// before the allocator is dropped.
    pub unsafe fn create_image(
        &self,
        image_info: &vk::ImageCreateInfo,
        usage: vk_mem::MemoryUsage,
    ) -> Result<(vk::Image, vk_mem::Allocation)> {
        let alloc_info = vk_mem::AllocationCreateInfo {
            usage,
            ..Default::default()
        };

        self.inner
            .create_image(image_info, &alloc_info)
            .map_err(|e| RenderError::Vulkan(format!("Image allocation failed: {e:?}")))
    }

    /// # Safety
    /// The image must have been created by this allocator and no GPU work
    /// may still reference it.
    pub unsafe fn destroy_image(&self, image: vk::Image, allocation: &mut vk_mem::Allocation) {
        self.inner.destroy_image(image, allocation);
    }

    /// Map an allocation for CPU writes (staging uploads).
    ///
    /// # Safety
    /// The allocation must have been created host-visible.
    pub unsafe fn map_memory(&self, allocation: &mut vk_mem::Allocation) -> Result<*mut u8> {
        self.inner
            .map_memory(allocation)
            .map_err(|e| RenderError::Vulkan(format!("map_memory failed: {e:?}")))
    }

    /// # Safety
    /// The allocation must currently be mapped.
    pub unsafe fn unmap_memory(&self, allocation: &mut vk_mem::Allocation) {
        self.inner.unmap_memory(allocation);
    }
}
