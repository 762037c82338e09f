use ash::vk;
use log::debug;
use std::sync::Arc;

use crate::vulkan::{commands, DescriptorAllocatorGrowable, PoolSizeRatio};
use crate::Result;

use super::deletion::DeletionQueue;

/// Number of frames that may have outstanding GPU work.
///
/// This bound is a correctness invariant, not a tuning knob: per-slot
/// deletion queues assume a resource deferred during one use of a slot is
/// dead exactly one ring round-trip later.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Sole addressing scheme for slots: monotonically increasing frame counter
/// modulo the ring size. No other indirection is permitted.
#[inline]
pub fn slot_index(frame_counter: u64) -> usize {
    (frame_counter % FRAMES_IN_FLIGHT as u64) as usize
}

/// One reusable per-frame execution context.
///
/// The CPU touches a slot's command buffer and descriptors only after
/// `begin_use` has observed the render fence signaled; the GPU is the only
/// writer of that fence, the CPU its only resetter.
pub struct FrameSlot {
    device: Arc<ash::Device>,
    pub command_pool: vk::CommandPool,
    pub command_buffer: vk::CommandBuffer,
    /// Signaled by the platform when the acquired image is ready to write.
    pub acquire_semaphore: vk::Semaphore,
    /// Signaled by the GPU when this slot's rendering finishes; present waits on it.
    pub render_semaphore: vk::Semaphore,
    /// CPU-waitable completion primitive gating slot reuse.
    pub render_fence: vk::Fence,
    pub deletion_queue: DeletionQueue,
    pub descriptors: DescriptorAllocatorGrowable,
}

impl FrameSlot {
    pub fn new(
        device: Arc<ash::Device>,
        graphics_family: u32,
        descriptor_sets: u32,
        descriptor_ratios: &[PoolSizeRatio],
    ) -> Result<Self> {
        let command_pool = commands::create_command_pool(&device, graphics_family)?;
        let command_buffer = commands::allocate_primary_buffer(&device, command_pool)?;

        let acquire_semaphore = commands::create_semaphore(&device)?;
        let render_semaphore = commands::create_semaphore(&device)?;
        // Starts signaled so the first begin_use passes without waiting.
        let render_fence = commands::create_fence(&device, true)?;

        let descriptors = DescriptorAllocatorGrowable::new(
            Arc::clone(&device),
            descriptor_sets,
            descriptor_ratios.to_vec(),
        )?;

        Ok(Self {
            device,
            command_pool,
            command_buffer,
            acquire_semaphore,
            render_semaphore,
            render_fence,
            deletion_queue: DeletionQueue::new(),
            descriptors,
        })
    }

    /// Block until the GPU has finished this slot's previous use, then
    /// reclaim everything scoped to it.
    ///
    /// Exceeding `timeout_ns` is fatal (GPU hang), not a retry. After this
    /// returns, every resource deferred during the previous use is gone;
    /// callers must not have retained references to them.
    pub fn begin_use(&mut self, timeout_ns: u64) -> Result<()> {
        commands::wait_for_fence(&self.device, self.render_fence, timeout_ns)?;
        commands::reset_fence(&self.device, self.render_fence)?;

        self.deletion_queue.flush();
        self.descriptors.reset_pools()?;

        debug!("frame slot ready for reuse");
        Ok(())
    }

    /// Submit this slot's command buffer, arming the render semaphore and the
    /// completion fence. `wait_acquire` is false when running headless (no
    /// image was acquired, so there is nothing to wait on).
    pub fn end_use(&self, queue: vk::Queue, wait_acquire: bool) -> Result<()> {
        let wait = wait_acquire.then_some((
            self.acquire_semaphore,
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        ));
        let signal = Some((
            self.render_semaphore,
            vk::PipelineStageFlags2::ALL_GRAPHICS,
        ));

        unsafe {
            commands::submit_commands(
                &self.device,
                queue,
                self.command_buffer,
                wait,
                signal,
                self.render_fence,
            )
        }
    }
}

impl Drop for FrameSlot {
    fn drop(&mut self) {
        // Caller holds the device idle before dropping slots.
        self.deletion_queue.flush();
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_semaphore(self.acquire_semaphore, None);
            self.device.destroy_semaphore(self.render_semaphore, None);
            self.device.destroy_fence(self.render_fence, None);
        }
    }
}

/// Fixed arena of exactly [`FRAMES_IN_FLIGHT`] slots.
pub struct FrameRing {
    slots: Vec<FrameSlot>,
}

impl FrameRing {
    pub fn new(
        device: Arc<ash::Device>,
        graphics_family: u32,
        descriptor_sets: u32,
        descriptor_ratios: &[PoolSizeRatio],
    ) -> Result<Self> {
        let mut slots = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for _ in 0..FRAMES_IN_FLIGHT {
            slots.push(FrameSlot::new(
                Arc::clone(&device),
                graphics_family,
                descriptor_sets,
                descriptor_ratios,
            )?);
        }
        Ok(Self { slots })
    }

    /// Pure index arithmetic; never fails.
    pub fn acquire_slot(&mut self, frame_counter: u64) -> &mut FrameSlot {
        &mut self.slots[slot_index(frame_counter)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_addressing_wraps_modulo_ring() {
        assert_eq!(slot_index(0), 0);
        assert_eq!(slot_index(1), 1);
        assert_eq!(slot_index(2), 0);
        assert_eq!(slot_index(3), 1);
    }

    #[test]
    fn iteration_n_plus_one_reuses_slot_zero() {
        // With N slots, iteration N+1 (counter N) lands back on slot 0 and
        // is the first iteration that can block on slot 0's fence again.
        let n = FRAMES_IN_FLIGHT as u64;
        assert_eq!(slot_index(n), slot_index(0));
        assert_eq!(slot_index(n + 1), slot_index(1));
    }

    #[test]
    fn any_n_consecutive_counters_hit_distinct_slots() {
        // At most N frames in flight: a window of N consecutive counters
        // never maps two counters to the same slot.
        for start in 0_u64..10 {
            let window: Vec<usize> =
                (start..start + FRAMES_IN_FLIGHT as u64).map(slot_index).collect();
            let mut deduped = window.clone();
            deduped.sort_unstable();
            deduped.dedup();
            assert_eq!(deduped.len(), FRAMES_IN_FLIGHT);
        }
    }
}
