use ash::vk;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::vulkan::{
    self, CommandContext, DescriptorAllocatorGrowable, PoolSizeRatio, Swapchain,
};
use crate::{RenderError, Result};

use super::deletion::DeletionQueue;
use super::frame::{FrameRing, FRAMES_IN_FLIGHT};
use super::immediate::ImmediateSubmit;
use super::resources::AllocatedBuffer;

/// Set while a renderer instance is alive. One renderer per process; teardown
/// clears the flag so a later re-initialization in the same process works.
static INSTANCE_LIVE: AtomicBool = AtomicBool::new(false);

struct InstanceGuard;

impl InstanceGuard {
    fn acquire() -> Result<Self> {
        if INSTANCE_LIVE.swap(true, Ordering::SeqCst) {
            return Err(RenderError::DeviceInit(
                "a renderer instance is already live in this process".to_string(),
            ));
        }
        Ok(Self)
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        INSTANCE_LIVE.store(false, Ordering::SeqCst);
    }
}

/// Renderer construction knobs.
#[derive(Clone, Debug)]
pub struct RendererConfig {
    /// FIFO presentation when true, MAILBOX/IMMEDIATE when false and available.
    pub present_mode_vsync: bool,
    /// Request validation layers (also gated by the `validation` feature).
    pub enable_validation: bool,
    /// Bound for every CPU-side wait. Expiry means a GPU hang and is fatal.
    pub fence_timeout_ns: u64,
    /// Initial per-slot descriptor pool capacity, in sets.
    pub frame_descriptor_sets: u32,
    /// Descriptors provisioned per set in each per-slot pool.
    pub frame_descriptor_ratios: Vec<PoolSizeRatio>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            present_mode_vsync: true,
            enable_validation: cfg!(debug_assertions),
            fence_timeout_ns: 1_000_000_000,
            frame_descriptor_sets: 512,
            frame_descriptor_ratios: vec![
                PoolSizeRatio {
                    ty: vk::DescriptorType::STORAGE_IMAGE,
                    ratio: 3.0,
                },
                PoolSizeRatio {
                    ty: vk::DescriptorType::STORAGE_BUFFER,
                    ratio: 3.0,
                },
                PoolSizeRatio {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    ratio: 3.0,
                },
                PoolSizeRatio {
                    ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    ratio: 4.0,
                },
            ],
        }
    }
}

/// Everything a content recorder needs to append commands for one frame.
pub struct RecordContext<'a> {
    pub device: &'a ash::Device,
    pub cmd: CommandContext<'a>,
    /// Target presentable image, already in COLOR_ATTACHMENT_OPTIMAL.
    /// Null when running headless.
    pub image: vk::Image,
    pub image_view: vk::ImageView,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub frame_number: u64,
    /// Frame-scoped descriptor allocator; reset when this slot is reused.
    pub descriptors: &'a mut DescriptorAllocatorGrowable,
    /// Frame-scoped deletion queue; flushed when this slot is reused.
    pub deletion_queue: &'a mut DeletionQueue,
}

/// Scene/material collaborator invoked once per recording state.
///
/// May fail fatally (invalid pipeline state); the error aborts the frame and
/// propagates to the application shell.
pub trait FrameRecorder {
    fn record(&mut self, ctx: &mut RecordContext<'_>) -> Result<()>;
}

/// Best-effort overlay collaborator invoked after content recording. A no-op
/// implementation is valid.
pub trait DebugOverlay {
    fn record(&mut self, ctx: &mut RecordContext<'_>);
}

/// Coalesced resize requests. Repeated signals overwrite the pending target;
/// zero-area targets suspend recreation until a nonzero extent arrives.
#[derive(Default)]
struct ResizeState {
    pending: Option<vk::Extent2D>,
}

impl ResizeState {
    fn request(&mut self, extent: vk::Extent2D) {
        self.pending = Some(extent);
    }

    fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// The extent to recreate with, if recreation can proceed now.
    fn ready(&self) -> Option<vk::Extent2D> {
        self.pending.filter(|e| e.width > 0 && e.height > 0)
    }

    fn clear(&mut self) {
        self.pending = None;
    }
}

/// The frame-execution core: acquires a presentable image, waits out the
/// frame slot, records, submits, presents, and owns every
/// synchronization-critical resource along the way.
///
/// Single threaded by design; all GPU work is asynchronous relative to the
/// calling thread and ordered only through the slot sync primitives.
pub struct Renderer {
    frame_number: u64,
    stop_rendering: bool,
    slot_prepared: bool,
    resize: ResizeState,
    config: RendererConfig,

    global_deletion: DeletionQueue,
    /// Global variant of the growable allocator: never reset, lives for the
    /// renderer's lifetime (persistent sets like bindless tables).
    global_descriptors: DescriptorAllocatorGrowable,
    frames: FrameRing,
    immediate: ImmediateSubmit,
    swapchain: Option<Swapchain>,
    // Dropped after everything that allocates from them.
    allocator: Arc<vulkan::Allocator>,
    device: vulkan::VulkanDevice,
    _instance_guard: InstanceGuard,
}

impl Renderer {
    pub fn new<S: vulkan::SurfaceProvider>(provider: &S) -> Result<Self> {
        Self::with_config(provider, RendererConfig::default())
    }

    pub fn with_config<S: vulkan::SurfaceProvider>(
        provider: &S,
        config: RendererConfig,
    ) -> Result<Self> {
        let guard = InstanceGuard::acquire()?;

        info!("Initializing renderer core...");

        let enable_validation = config.enable_validation && cfg!(feature = "validation");
        let instance = Arc::new(vulkan::VulkanInstance::new(provider, enable_validation)?);
        let device = vulkan::VulkanDevice::new(instance)?;
        let allocator = Arc::new(vulkan::Allocator::new(&device)?);

        let swapchain = if device.instance.surface() == vk::SurfaceKHR::null() {
            info!("No surface: running headless (acquire/present skipped)");
            None
        } else {
            Some(Swapchain::new(
                &device,
                provider.extent(),
                config.present_mode_vsync,
            )?)
        };

        let global_descriptors = DescriptorAllocatorGrowable::new(
            Arc::clone(&device.device),
            config.frame_descriptor_sets,
            config.frame_descriptor_ratios.clone(),
        )?;

        let frames = FrameRing::new(
            Arc::clone(&device.device),
            device.graphics_family,
            config.frame_descriptor_sets,
            &config.frame_descriptor_ratios,
        )?;

        let immediate = ImmediateSubmit::new(
            Arc::clone(&device.device),
            device.graphics_queue,
            device.graphics_family,
            config.fence_timeout_ns,
        )?;

        info!("Renderer core initialized ({FRAMES_IN_FLIGHT} frames in flight)");

        Ok(Self {
            frame_number: 0,
            stop_rendering: false,
            slot_prepared: false,
            resize: ResizeState::default(),
            config,
            global_deletion: DeletionQueue::new(),
            global_descriptors,
            frames,
            immediate,
            swapchain,
            allocator,
            device,
            _instance_guard: guard,
        })
    }

    // ──────────────────────────────────────────────────────────
    // Window-shell interface
    // ──────────────────────────────────────────────────────────

    /// Coalesced: repeated calls before the next safe recreation point
    /// overwrite the pending target rather than queuing recreations.
    pub fn on_resize(&mut self, width: u32, height: u32) {
        if !self.resize.is_pending() {
            info!("Surface resize requested: {width}x{height}");
        }
        self.resize.request(vk::Extent2D { width, height });
    }

    pub fn on_minimize(&mut self) {
        self.stop_rendering = true;
    }

    pub fn on_restore(&mut self) {
        self.stop_rendering = false;
    }

    /// False while minimized; the caller should idle instead of invoking
    /// [`Renderer::render_frame`].
    pub fn should_render(&self) -> bool {
        !self.stop_rendering
    }

    // ──────────────────────────────────────────────────────────
    // Frame loop
    // ──────────────────────────────────────────────────────────

    /// Run one frame iteration: acquire image, wait for slot, record via the
    /// collaborators, submit, present, advance.
    ///
    /// A stale surface pauses rendering for the affected frame only and
    /// triggers recreation at the next call; every other failure is fatal.
    pub fn render_frame(
        &mut self,
        recorder: &mut dyn FrameRecorder,
        mut overlay: Option<&mut dyn DebugOverlay>,
    ) -> Result<()> {
        self.recreate_if_needed()?;
        if self.resize.is_pending() {
            // Zero-area target: suspended until a nonzero extent arrives.
            return Ok(());
        }

        let timeout_ns = self.config.fence_timeout_ns;
        let frame_number = self.frame_number;

        // Claim the slot and reclaim its previous use. A restarted iteration
        // (stale surface last call) skips the wait; the slot is already
        // prepared and its fence already unsignaled.
        if !self.slot_prepared {
            self.frames.acquire_slot(frame_number).begin_use(timeout_ns)?;
            self.slot_prepared = true;
        }

        // The platform image index is independent of the slot index and must
        // never be conflated with it.
        let slot = self.frames.acquire_slot(frame_number);
        let image_index = match &self.swapchain {
            Some(swapchain) => {
                match swapchain.acquire_next_image(slot.acquire_semaphore, timeout_ns) {
                    Ok(index) => Some(index),
                    Err(RenderError::SwapchainOutOfDate(_)) => {
                        debug!("Acquire reported stale surface; restarting iteration");
                        let extent = swapchain.extent;
                        self.resize.request(extent);
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                }
            }
            None => None,
        };

        // Single-use recording: each recording feeds exactly one submission.
        let (image, image_view, extent, format) = match (&self.swapchain, image_index) {
            (Some(swapchain), Some(index)) => (
                swapchain.images[index as usize],
                swapchain.image_views[index as usize],
                swapchain.extent,
                swapchain.format,
            ),
            _ => (
                vk::Image::null(),
                vk::ImageView::null(),
                vk::Extent2D::default(),
                vk::Format::UNDEFINED,
            ),
        };

        let cmd = CommandContext::new(&self.device.device, slot.command_buffer);
        cmd.reset()?;
        cmd.begin_single_use()?;

        if image != vk::Image::null() {
            cmd.transition_image(
                image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            );
        }

        {
            let mut ctx = RecordContext {
                device: &self.device.device,
                cmd: CommandContext::new(&self.device.device, slot.command_buffer),
                image,
                image_view,
                extent,
                format,
                frame_number,
                descriptors: &mut slot.descriptors,
                deletion_queue: &mut slot.deletion_queue,
            };

            recorder.record(&mut ctx)?;

            if let Some(overlay) = overlay.as_deref_mut() {
                overlay.record(&mut ctx);
            }
        }

        if image != vk::Image::null() {
            cmd.transition_image(
                image,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::PRESENT_SRC_KHR,
            );
        }

        cmd.end()?;

        slot.end_use(self.device.graphics_queue, image_index.is_some())?;
        self.slot_prepared = false;

        // Present waits on the render semaphore and targets the platform
        // image index.
        if let (Some(swapchain), Some(index)) = (&self.swapchain, image_index) {
            match swapchain.present(self.device.present_queue, index, slot.render_semaphore) {
                Ok(()) => {}
                Err(RenderError::SwapchainOutOfDate(_)) => {
                    debug!("Present reported stale surface; recreating before next acquire");
                    let extent = swapchain.extent;
                    self.resize.request(extent);
                    // The frame was submitted and its fence armed; advancing
                    // is correct even though presentation was dropped.
                    self.frame_number += 1;
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }

        self.frame_number += 1;
        Ok(())
    }

    fn recreate_if_needed(&mut self) -> Result<()> {
        let Some(extent) = self.resize.ready() else {
            return Ok(());
        };

        if self.swapchain.is_none() {
            // Headless: nothing to rebuild.
            self.resize.clear();
            return Ok(());
        }

        info!("Recreating presentation surface ({}x{})", extent.width, extent.height);

        // No frame slot may reference the old image set past this point.
        self.device.wait_idle()?;

        let device = &self.device;
        if let Some(swapchain) = self.swapchain.as_mut() {
            swapchain.recreate(device, extent)?;
        }

        self.resize.clear();
        Ok(())
    }

    // ──────────────────────────────────────────────────────────
    // Uploads & lifetimes
    // ──────────────────────────────────────────────────────────

    /// Create a device-local buffer filled with `data`, uploaded through the
    /// immediate-submit channel. Blocks until the copy completes.
    pub fn upload_buffer(
        &mut self,
        data: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> Result<AllocatedBuffer> {
        let size = data.len() as vk::DeviceSize;

        let mut staging = AllocatedBuffer::staging(&self.allocator, size)?;
        unsafe {
            let ptr = self.allocator.map_memory(&mut staging.allocation)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len());
            self.allocator.unmap_memory(&mut staging.allocation);
        }

        let buffer = AllocatedBuffer::new(
            &self.allocator,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk_mem::MemoryUsage::AutoPreferDevice,
            vk_mem::AllocationCreateFlags::empty(),
        )?;

        let src = staging.buffer;
        let dst = buffer.buffer;
        self.immediate.submit(|ctx| {
            let region = vk::BufferCopy::default().size(size);
            unsafe {
                self.device
                    .device
                    .cmd_copy_buffer(ctx.handle(), src, dst, &[region]);
            }
            Ok(())
        })?;

        // The immediate submit blocked to completion; the staging copy is done.
        staging.destroy(&self.allocator);

        Ok(buffer)
    }

    /// Record destruction to run once at shutdown, behind the device-idle
    /// barrier. LIFO: register in creation-dependency order.
    pub fn defer_global_destroy(&mut self, action: impl FnOnce() + Send + 'static) {
        self.global_deletion.defer(action);
    }

    /// Blocking out-of-band submission channel for setup/upload work.
    pub fn immediate(&self) -> &ImmediateSubmit {
        &self.immediate
    }

    /// Renderer-lifetime descriptor allocator (never reset between frames).
    pub fn global_descriptors_mut(&mut self) -> &mut DescriptorAllocatorGrowable {
        &mut self.global_descriptors
    }

    pub fn allocator(&self) -> &Arc<vulkan::Allocator> {
        &self.allocator
    }

    pub fn device(&self) -> &vulkan::VulkanDevice {
        &self.device
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Current surface extent, or the headless placeholder when no swapchain
    /// exists.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain
            .as_ref()
            .map(|s| s.extent)
            .unwrap_or_default()
    }

    pub fn surface_format(&self) -> vk::Format {
        self.swapchain
            .as_ref()
            .map(|s| s.format)
            .unwrap_or(vk::Format::UNDEFINED)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        info!("Shutting down renderer core...");

        if let Err(e) = self.device.wait_idle() {
            log::error!("wait_idle during shutdown failed: {e}");
        }

        // Global queue first; per-slot queues flush when the ring drops.
        self.global_deletion.flush();

        info!("Renderer core shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_requests_coalesce_to_last_target() {
        let mut resize = ResizeState::default();
        resize.request(vk::Extent2D {
            width: 100,
            height: 100,
        });
        resize.request(vk::Extent2D {
            width: 800,
            height: 600,
        });

        let ready = resize.ready().unwrap();
        assert_eq!((ready.width, ready.height), (800, 600));

        // One recreation consumes the request entirely.
        resize.clear();
        assert!(!resize.is_pending());
        assert!(resize.ready().is_none());
    }

    #[test]
    fn zero_area_suspends_recreation() {
        let mut resize = ResizeState::default();
        resize.request(vk::Extent2D {
            width: 0,
            height: 0,
        });

        assert!(resize.is_pending());
        assert!(resize.ready().is_none());
    }

    #[test]
    fn zero_then_valid_recreates_once_at_last_extent() {
        let mut resize = ResizeState::default();
        resize.request(vk::Extent2D {
            width: 0,
            height: 0,
        });
        resize.request(vk::Extent2D {
            width: 1920,
            height: 1080,
        });

        let mut recreations = Vec::new();
        while let Some(extent) = resize.ready() {
            recreations.push((extent.width, extent.height));
            resize.clear();
        }

        assert_eq!(recreations, vec![(1920, 1080)]);
    }

    #[test]
    fn instance_guard_is_exclusive_and_reusable() {
        let first = InstanceGuard::acquire().unwrap();
        assert!(InstanceGuard::acquire().is_err());
        drop(first);
        let second = InstanceGuard::acquire();
        assert!(second.is_ok());
    }
}
