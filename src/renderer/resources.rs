use ash::vk;
use std::sync::Arc;

use crate::vulkan::Allocator;
use crate::Result;

use super::deletion::DeletionQueue;

/// A buffer paired with its backing allocation.
///
/// Exclusively owned by its creator until destroyed explicitly or handed to
/// a deletion queue via [`AllocatedBuffer::defer_destroy`].
pub struct AllocatedBuffer {
    pub buffer: vk::Buffer,
    pub allocation: vk_mem::Allocation,
    pub size: vk::DeviceSize,
}

impl AllocatedBuffer {
    pub fn new(
        allocator: &Allocator,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_usage: vk_mem::MemoryUsage,
        flags: vk_mem::AllocationCreateFlags,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::default().size(size).usage(usage);

        let (buffer, allocation) =
            unsafe { allocator.create_buffer(&buffer_info, memory_usage, flags)? };

        Ok(Self {
            buffer,
            allocation,
            size,
        })
    }

    /// Host-visible staging buffer for uploads.
    pub fn staging(allocator: &Allocator, size: vk::DeviceSize) -> Result<Self> {
        Self::new(
            allocator,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk_mem::MemoryUsage::AutoPreferHost,
            vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
        )
    }

    /// Destroy now. Only valid once no GPU work references the buffer.
    pub fn destroy(mut self, allocator: &Allocator) {
        unsafe {
            allocator.destroy_buffer(self.buffer, &mut self.allocation);
        }
    }

    /// Hand ownership to `queue`; the buffer dies when the queue flushes.
    pub fn defer_destroy(self, allocator: Arc<Allocator>, queue: &mut DeletionQueue) {
        let mut allocation = self.allocation;
        let buffer = self.buffer;
        queue.defer(move || unsafe {
            allocator.destroy_buffer(buffer, &mut allocation);
        });
    }
}

/// An image, its persistent view, and its backing allocation.
pub struct AllocatedImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub allocation: vk_mem::Allocation,
    pub extent: vk::Extent3D,
    pub format: vk::Format,
}

impl AllocatedImage {
    pub fn new(
        device: &ash::Device,
        allocator: &Allocator,
        extent: vk::Extent3D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Result<Self> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage);

        let (image, allocation) =
            unsafe { allocator.create_image(&image_info, vk_mem::MemoryUsage::AutoPreferDevice)? };

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let view = unsafe {
            device.create_image_view(&view_info, None).map_err(|e| {
                crate::RenderError::Vulkan(format!("Failed to create image view: {e:?}"))
            })?
        };

        Ok(Self {
            image,
            view,
            allocation,
            extent,
            format,
        })
    }

    /// Destroy now: view first, then image. Only valid once idle.
    pub fn destroy(mut self, device: &ash::Device, allocator: &Allocator) {
        unsafe {
            device.destroy_image_view(self.view, None);
            allocator.destroy_image(self.image, &mut self.allocation);
        }
    }

    /// Hand ownership to `queue`. The single action destroys the view before
    /// the image, preserving dependency order inside the entry.
    pub fn defer_destroy(
        self,
        device: Arc<ash::Device>,
        allocator: Arc<Allocator>,
        queue: &mut DeletionQueue,
    ) {
        let mut allocation = self.allocation;
        let image = self.image;
        let view = self.view;
        queue.defer(move || unsafe {
            device.destroy_image_view(view, None);
            allocator.destroy_image(image, &mut allocation);
        });
    }
}
