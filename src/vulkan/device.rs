use ash::vk;
use log::info;
use std::ffi::CStr;
use std::sync::Arc;

use super::instance::VulkanInstance;
use crate::{RenderError, Result};

/// Logical device wrapper owning the queues the frame core submits to.
///
/// Device selection requires Vulkan 1.3 with `synchronization2` and
/// `dynamicRendering`; the submission path is built on `queue_submit2` and
/// the recording collaborators are expected to use dynamic rendering.
pub struct VulkanDevice {
    pub instance: Arc<VulkanInstance>,
    pub physical_device: vk::PhysicalDevice,
    pub device: Arc<ash::Device>,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub graphics_family: u32,
    pub present_family: u32,
}

struct DeviceCandidate {
    physical_device: vk::PhysicalDevice,
    graphics_family: u32,
    present_family: u32,
    score: u32,
}

impl VulkanDevice {
    pub fn new(instance: Arc<VulkanInstance>) -> Result<Self> {
        unsafe {
            let candidate = Self::select_physical_device(&instance)?;
            let physical_device = candidate.physical_device;

            let properties = instance
                .instance()
                .get_physical_device_properties(physical_device);
            let name = CStr::from_ptr(properties.device_name.as_ptr());
            info!("Selected GPU: {name:?}");

            let queue_priorities = [1.0_f32];
            let mut queue_infos = vec![vk::DeviceQueueCreateInfo::default()
                .queue_family_index(candidate.graphics_family)
                .queue_priorities(&queue_priorities)];
            if candidate.present_family != candidate.graphics_family {
                queue_infos.push(
                    vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(candidate.present_family)
                        .queue_priorities(&queue_priorities),
                );
            }

            let extensions = [ash::khr::swapchain::NAME.as_ptr()];

            let mut features13 = vk::PhysicalDeviceVulkan13Features::default()
                .synchronization2(true)
                .dynamic_rendering(true);
            let mut features12 = vk::PhysicalDeviceVulkan12Features::default()
                .buffer_device_address(true)
                .descriptor_indexing(true);

            let create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_infos)
                .enabled_extension_names(&extensions)
                .push_next(&mut features13)
                .push_next(&mut features12);

            let device = instance
                .instance()
                .create_device(physical_device, &create_info, None)
                .map_err(|e| {
                    RenderError::DeviceInit(format!("Failed to create logical device: {e:?}"))
                })?;

            let graphics_queue = device.get_device_queue(candidate.graphics_family, 0);
            let present_queue = device.get_device_queue(candidate.present_family, 0);

            Ok(Self {
                instance,
                physical_device,
                device: Arc::new(device),
                graphics_queue,
                present_queue,
                graphics_family: candidate.graphics_family,
                present_family: candidate.present_family,
            })
        }
    }

    /// Block until every queue on the device is idle.
    ///
    /// Used at the two full-barrier points: swapchain recreation and shutdown.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(|e| RenderError::Vulkan(format!("device_wait_idle failed: {e:?}")))
        }
    }

    unsafe fn select_physical_device(instance: &VulkanInstance) -> Result<DeviceCandidate> {
        let physical_devices = instance
            .instance()
            .enumerate_physical_devices()
            .map_err(|e| {
                RenderError::DeviceInit(format!("Failed to enumerate physical devices: {e:?}"))
            })?;

        let mut best: Option<DeviceCandidate> = None;

        for physical_device in physical_devices {
            let Some((graphics_family, present_family)) =
                Self::find_queue_families(instance, physical_device)
            else {
                continue;
            };

            if !Self::supports_required_features(instance, physical_device) {
                continue;
            }

            let properties = instance
                .instance()
                .get_physical_device_properties(physical_device);
            let score = match properties.device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 100,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 50,
                vk::PhysicalDeviceType::VIRTUAL_GPU => 25,
                _ => 10,
            };

            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(DeviceCandidate {
                    physical_device,
                    graphics_family,
                    present_family,
                    score,
                });
            }
        }

        best.ok_or_else(|| {
            RenderError::DeviceInit(
                "No GPU with graphics+present queues and Vulkan 1.3 features found".to_string(),
            )
        })
    }

    unsafe fn find_queue_families(
        instance: &VulkanInstance,
        physical_device: vk::PhysicalDevice,
    ) -> Option<(u32, u32)> {
        let families = instance
            .instance()
            .get_physical_device_queue_family_properties(physical_device);

        let mut graphics = None;
        let mut present = None;

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;

            if graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                graphics = Some(index);
            }

            // A null surface (headless) presents nowhere; reuse the graphics
            // family so queue handles stay valid.
            if instance.surface() == vk::SurfaceKHR::null() {
                present = graphics;
            } else if present.is_none() {
                let supported = instance
                    .surface_loader()
                    .get_physical_device_surface_support(physical_device, index, instance.surface())
                    .unwrap_or(false);
                if supported {
                    present = Some(index);
                }
            }

            if let (Some(g), Some(p)) = (graphics, present) {
                return Some((g, p));
            }
        }

        None
    }

    unsafe fn supports_required_features(
        instance: &VulkanInstance,
        physical_device: vk::PhysicalDevice,
    ) -> bool {
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
        let mut features12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut features13)
            .push_next(&mut features12);

        instance
            .instance()
            .get_physical_device_features2(physical_device, &mut features2);

        features13.synchronization2 == vk::TRUE && features13.dynamic_rendering == vk::TRUE
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
        }
    }
}
