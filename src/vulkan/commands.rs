use ash::vk;

use crate::{RenderError, Result};

/// Create a command pool for one queue family.
///
/// Pools for frame slots are created resettable so each slot can re-record
/// its single command buffer every use.
pub fn create_command_pool(device: &ash::Device, queue_family: u32) -> Result<vk::CommandPool> {
    let create_info = vk::CommandPoolCreateInfo::default()
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
        .queue_family_index(queue_family);

    unsafe {
        device
            .create_command_pool(&create_info, None)
            .map_err(|e| RenderError::Vulkan(format!("Failed to create command pool: {e:?}")))
    }
}

/// Allocate a single primary command buffer from `pool`.
pub fn allocate_primary_buffer(
    device: &ash::Device,
    pool: vk::CommandPool,
) -> Result<vk::CommandBuffer> {
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    unsafe {
        let buffers = device
            .allocate_command_buffers(&alloc_info)
            .map_err(|e| RenderError::Vulkan(format!("Failed to allocate command buffer: {e:?}")))?;
        Ok(buffers[0])
    }
}

/// Borrowed view over a command buffer for one recording.
///
/// Recording is single-use: reset, begin with ONE_TIME_SUBMIT, record, end,
/// submit exactly once.
pub struct CommandContext<'a> {
    device: &'a ash::Device,
    cmd: vk::CommandBuffer,
}

impl<'a> CommandContext<'a> {
    pub fn new(device: &'a ash::Device, cmd: vk::CommandBuffer) -> Self {
        Self { device, cmd }
    }

    pub fn handle(&self) -> vk::CommandBuffer {
        self.cmd
    }

    pub fn reset(&self) -> Result<()> {
        unsafe {
            self.device
                .reset_command_buffer(self.cmd, vk::CommandBufferResetFlags::empty())
                .map_err(|e| RenderError::Vulkan(format!("Failed to reset command buffer: {e:?}")))
        }
    }

    pub fn begin_single_use(&self) -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .begin_command_buffer(self.cmd, &begin_info)
                .map_err(|e| RenderError::Vulkan(format!("Failed to begin command buffer: {e:?}")))
        }
    }

    pub fn end(&self) -> Result<()> {
        unsafe {
            self.device
                .end_command_buffer(self.cmd)
                .map_err(|e| RenderError::Vulkan(format!("Failed to end command buffer: {e:?}")))
        }
    }

    /// Record a full-image layout transition.
    ///
    /// Uses the broad ALL_COMMANDS barrier; the frame core issues exactly two
    /// transitions per frame (to writable, to presentable), so precision
    /// buys nothing here.
    pub fn transition_image(
        &self,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) {
        let aspect_mask = if new_layout == vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        };

        let barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
            .old_layout(old_layout)
            .new_layout(new_layout)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect_mask)
                    .base_mip_level(0)
                    .level_count(vk::REMAINING_MIP_LEVELS)
                    .base_array_layer(0)
                    .layer_count(vk::REMAINING_ARRAY_LAYERS),
            )
            .image(image);

        let barriers = [barrier];
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);

        unsafe {
            self.device.cmd_pipeline_barrier2(self.cmd, &dependency_info);
        }
    }
}

/// Submit one command buffer with optional wait/signal semaphore dependencies,
/// arming `fence` on completion.
///
/// # Safety
/// The command buffer must be in the executable state and the sync objects
/// valid for the submitting queue.
pub unsafe fn submit_commands(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    wait: Option<(vk::Semaphore, vk::PipelineStageFlags2)>,
    signal: Option<(vk::Semaphore, vk::PipelineStageFlags2)>,
    fence: vk::Fence,
) -> Result<()> {
    let cmd_infos = [vk::CommandBufferSubmitInfo::default().command_buffer(cmd)];

    let wait_infos: Vec<vk::SemaphoreSubmitInfo> = wait
        .into_iter()
        .map(|(semaphore, stage)| {
            vk::SemaphoreSubmitInfo::default()
                .semaphore(semaphore)
                .stage_mask(stage)
        })
        .collect();

    let signal_infos: Vec<vk::SemaphoreSubmitInfo> = signal
        .into_iter()
        .map(|(semaphore, stage)| {
            vk::SemaphoreSubmitInfo::default()
                .semaphore(semaphore)
                .stage_mask(stage)
        })
        .collect();

    let submit_info = vk::SubmitInfo2::default()
        .command_buffer_infos(&cmd_infos)
        .wait_semaphore_infos(&wait_infos)
        .signal_semaphore_infos(&signal_infos);

    device
        .queue_submit2(queue, &[submit_info], fence)
        .map_err(|e| RenderError::Vulkan(format!("queue_submit2 failed: {e:?}")))
}

/// Create an unsignaled binary semaphore.
pub fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    unsafe {
        device
            .create_semaphore(&create_info, None)
            .map_err(|e| RenderError::Vulkan(format!("Failed to create semaphore: {e:?}")))
    }
}

/// Create a fence, optionally pre-signaled.
///
/// Frame-slot fences start signaled so the first `begin_use` of every slot
/// passes without waiting.
pub fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    unsafe {
        device
            .create_fence(&create_info, None)
            .map_err(|e| RenderError::Vulkan(format!("Failed to create fence: {e:?}")))
    }
}

/// Bounded wait on a single fence. Expiry maps to the fatal `GpuTimeout`.
pub fn wait_for_fence(device: &ash::Device, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
    unsafe {
        match device.wait_for_fences(&[fence], true, timeout_ns) {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(RenderError::GpuTimeout(format!(
                "fence not signaled within {timeout_ns} ns"
            ))),
            Err(e) => Err(RenderError::Vulkan(format!("wait_for_fences failed: {e:?}"))),
        }
    }
}

/// Reset a fence to the unsignaled state.
pub fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    unsafe {
        device
            .reset_fences(&[fence])
            .map_err(|e| RenderError::Vulkan(format!("reset_fences failed: {e:?}")))
    }
}
