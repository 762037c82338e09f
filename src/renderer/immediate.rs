use ash::vk;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::vulkan::{commands, CommandContext};
use crate::Result;

/// Blocking, out-of-band GPU submission channel for setup and upload work.
///
/// Owns a command buffer/fence pair disjoint from the frame-slot ring, so
/// one-off work never contends with or consumes a frame slot. The mutex
/// serializes callers: each submission fully completes (fence observed
/// signaled) before the next caller can begin recording.
pub struct ImmediateSubmit {
    device: Arc<ash::Device>,
    queue: vk::Queue,
    inner: Mutex<Channel>,
    timeout_ns: u64,
}

struct Channel {
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
}

impl ImmediateSubmit {
    pub fn new(
        device: Arc<ash::Device>,
        queue: vk::Queue,
        graphics_family: u32,
        timeout_ns: u64,
    ) -> Result<Self> {
        let command_pool = commands::create_command_pool(&device, graphics_family)?;
        let command_buffer = commands::allocate_primary_buffer(&device, command_pool)?;
        let fence = commands::create_fence(&device, false)?;

        Ok(Self {
            device,
            queue,
            inner: Mutex::new(Channel {
                command_pool,
                command_buffer,
                fence,
            }),
            timeout_ns,
        })
    }

    /// Record with `record_fn` and block until the GPU has executed it.
    ///
    /// The submission carries no semaphore dependencies; ordering against
    /// frame submissions comes from the queue's submission order and from
    /// the blocking wait.
    pub fn submit(&self, record_fn: impl FnOnce(&CommandContext) -> Result<()>) -> Result<()> {
        let channel = self.inner.lock();

        commands::reset_fence(&self.device, channel.fence)?;

        let ctx = CommandContext::new(&self.device, channel.command_buffer);
        ctx.reset()?;
        ctx.begin_single_use()?;
        record_fn(&ctx)?;
        ctx.end()?;

        unsafe {
            commands::submit_commands(
                &self.device,
                self.queue,
                channel.command_buffer,
                None,
                None,
                channel.fence,
            )?;
        }

        commands::wait_for_fence(&self.device, channel.fence, self.timeout_ns)
    }
}

impl Drop for ImmediateSubmit {
    fn drop(&mut self) {
        let channel = self.inner.get_mut();
        unsafe {
            self.device.destroy_command_pool(channel.command_pool, None);
            self.device.destroy_fence(channel.fence, None);
        }
    }
}
