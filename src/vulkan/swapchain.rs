use ash::{khr::swapchain, vk};
use log::info;
use std::sync::Arc;

use super::device::VulkanDevice;
use crate::{RenderError, Result};

/// Presentation surface manager: owns the swapchain, its images and views,
/// and the negotiated format/extent.
///
/// The image count is decided by the platform at creation and is independent
/// of the frame-in-flight count; the image index returned by acquire must
/// never be conflated with a frame-slot index.
pub struct Swapchain {
    device: Arc<ash::Device>,
    loader: swapchain::Device,
    handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    vsync: bool,
}

impl Swapchain {
    /// Negotiate a surface configuration and build the image set.
    ///
    /// Fails with `NoCompatibleSurface` when the surface reports no formats.
    pub fn new(device: &VulkanDevice, extent: vk::Extent2D, vsync: bool) -> Result<Self> {
        let loader = swapchain::Device::new(device.instance.instance(), &device.device);

        let mut swapchain = Self {
            device: Arc::clone(&device.device),
            loader,
            handle: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            format: vk::Format::UNDEFINED,
            extent,
            vsync,
        };
        swapchain.create(device, extent)?;
        Ok(swapchain)
    }

    /// Destroy and rebuild the image set for a new extent.
    ///
    /// Only safe after a full device-idle barrier: no frame slot may still
    /// reference the old image set.
    pub fn recreate(&mut self, device: &VulkanDevice, new_extent: vk::Extent2D) -> Result<()> {
        self.destroy();
        self.create(device, new_extent)
    }

    fn create(&mut self, device: &VulkanDevice, desired_extent: vk::Extent2D) -> Result<()> {
        let instance = &device.instance;
        let surface = instance.surface();

        unsafe {
            let capabilities = instance
                .surface_loader()
                .get_physical_device_surface_capabilities(device.physical_device, surface)
                .map_err(|e| {
                    RenderError::Vulkan(format!("Failed to query surface capabilities: {e:?}"))
                })?;
            let formats = instance
                .surface_loader()
                .get_physical_device_surface_formats(device.physical_device, surface)
                .map_err(|e| {
                    RenderError::Vulkan(format!("Failed to query surface formats: {e:?}"))
                })?;
            let present_modes = instance
                .surface_loader()
                .get_physical_device_surface_present_modes(device.physical_device, surface)
                .map_err(|e| {
                    RenderError::Vulkan(format!("Failed to query present modes: {e:?}"))
                })?;

            let surface_format = select_surface_format(&formats).ok_or_else(|| {
                RenderError::NoCompatibleSurface("surface reports no pixel formats".to_string())
            })?;
            let present_mode = select_present_mode(&present_modes, self.vsync);
            let extent = clamp_extent(&capabilities, desired_extent);
            let image_count = select_image_count(&capabilities);

            let mut create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(surface)
                .min_image_count(image_count)
                .image_format(surface_format.format)
                .image_color_space(surface_format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(
                    vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
                )
                .pre_transform(capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(present_mode)
                .clipped(true);

            let queue_families = [device.graphics_family, device.present_family];
            if device.graphics_family != device.present_family {
                create_info = create_info
                    .image_sharing_mode(vk::SharingMode::CONCURRENT)
                    .queue_family_indices(&queue_families);
            } else {
                create_info = create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE);
            }

            let handle = self
                .loader
                .create_swapchain(&create_info, None)
                .map_err(|e| RenderError::Vulkan(format!("Failed to create swapchain: {e:?}")))?;

            let images = self
                .loader
                .get_swapchain_images(handle)
                .map_err(|e| RenderError::Vulkan(format!("Failed to get swapchain images: {e:?}")))?;

            let mut image_views = Vec::with_capacity(images.len());
            for &image in &images {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .base_mip_level(0)
                            .level_count(1)
                            .base_array_layer(0)
                            .layer_count(1),
                    );

                let view = self.device.create_image_view(&view_info, None).map_err(|e| {
                    RenderError::Vulkan(format!("Failed to create swapchain image view: {e:?}"))
                })?;
                image_views.push(view);
            }

            info!(
                "Swapchain created: {}x{}, {:?}, {} images, {present_mode:?}",
                extent.width,
                extent.height,
                surface_format.format,
                images.len()
            );

            self.handle = handle;
            self.images = images;
            self.image_views = image_views;
            self.format = surface_format.format;
            self.extent = extent;
        }

        Ok(())
    }

    /// Release the view set and the swapchain handle. The images themselves
    /// are platform owned and must not be destroyed here.
    fn destroy(&mut self) {
        unsafe {
            for view in self.image_views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            self.images.clear();

            if self.handle != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.handle, None);
                self.handle = vk::SwapchainKHR::null();
            }
        }
    }

    /// Acquire the next presentable image, signaling `acquire_semaphore` on
    /// the GPU timeline when the image is ready.
    ///
    /// Returns the platform image index. `SwapchainOutOfDate` is the only
    /// recoverable failure; a timeout is fatal.
    pub fn acquire_next_image(
        &self,
        acquire_semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<u32> {
        unsafe {
            match self.loader.acquire_next_image(
                self.handle,
                timeout_ns,
                acquire_semaphore,
                vk::Fence::null(),
            ) {
                // Suboptimal still acquired an image; present will report it.
                Ok((index, _suboptimal)) => Ok(index),
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RenderError::SwapchainOutOfDate(
                    "acquire_next_image".to_string(),
                )),
                Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Err(
                    RenderError::GpuTimeout(format!("image not acquired within {timeout_ns} ns")),
                ),
                Err(e) => Err(RenderError::Vulkan(format!(
                    "acquire_next_image failed: {e:?}"
                ))),
            }
        }
    }

    /// Present `image_index`, waiting on `render_semaphore`.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        render_semaphore: vk::Semaphore,
    ) -> Result<()> {
        let wait_semaphores = [render_semaphore];
        let swapchains = [self.handle];
        let indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        unsafe {
            match self.loader.queue_present(queue, &present_info) {
                Ok(false) => Ok(()),
                // Suboptimal presented successfully but the surface changed
                // underneath us; recreate before the next acquire.
                Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(
                    RenderError::SwapchainOutOfDate("queue_present".to_string()),
                ),
                Err(e) => Err(RenderError::Vulkan(format!("queue_present failed: {e:?}"))),
            }
        }
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Prefer BGRA8 UNORM with sRGB nonlinear color space, falling back to the
/// first supported pair.
fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    if available.is_empty() {
        return None;
    }

    available
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_UNORM
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first().copied())
}

/// FIFO is the vsync mode and always available; MAILBOX is used when vsync is
/// off and the platform offers it, IMMEDIATE as a last resort.
fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }

    for preferred in [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE] {
        if available.contains(&preferred) {
            return preferred;
        }
    }

    vk::PresentModeKHR::FIFO
}

/// Clamp the desired extent to the surface capability bounds. When the
/// platform pins the extent (current_extent != u32::MAX) that value wins.
fn clamp_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: desired.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: desired.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One image more than the minimum so acquire rarely blocks on the platform;
/// max_image_count == 0 means unbounded.
fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count = count.min(capabilities.max_image_count);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32, current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn format_prefers_bgra_srgb() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        let chosen = select_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn format_falls_back_to_first() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::R16G16B16A16_SFLOAT,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        let chosen = select_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R16G16B16A16_SFLOAT);
    }

    #[test]
    fn format_empty_is_incompatible() {
        assert!(select_surface_format(&[]).is_none());
    }

    #[test]
    fn present_mode_vsync_is_fifo() {
        let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(select_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn present_mode_uncapped_prefers_mailbox() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            select_present_mode(&modes, false),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn extent_pinned_by_platform_wins() {
        let capabilities = caps(2, 8, (1280, 720));
        let clamped = clamp_extent(
            &capabilities,
            vk::Extent2D {
                width: 100,
                height: 100,
            },
        );
        assert_eq!(clamped.width, 1280);
        assert_eq!(clamped.height, 720);
    }

    #[test]
    fn extent_clamps_to_bounds() {
        let capabilities = caps(2, 8, (u32::MAX, u32::MAX));
        let clamped = clamp_extent(
            &capabilities,
            vk::Extent2D {
                width: 10_000,
                height: 0,
            },
        );
        assert_eq!(clamped.width, 4096);
        assert_eq!(clamped.height, 1);
    }

    #[test]
    fn image_count_is_min_plus_one_clamped() {
        assert_eq!(select_image_count(&caps(2, 3, (1, 1))), 3);
        assert_eq!(select_image_count(&caps(2, 0, (1, 1))), 3);
        assert_eq!(select_image_count(&caps(4, 8, (1, 1))), 5);
    }
}
