use ash::vk;
use log::debug;
use std::sync::Arc;

use crate::{RenderError, Result};

/// Hard ceiling on sets per pool; growth stops here.
const MAX_SETS_PER_POOL: u32 = 4092;
/// Pool capacity grows 1.5x each time the active pool runs dry.
const GROWTH_NUMERATOR: u32 = 3;
const GROWTH_DENOMINATOR: u32 = 2;

/// Per-descriptor-type provisioning weight: how many descriptors of `ty` to
/// reserve for each set a pool can hold.
#[derive(Copy, Clone, Debug)]
pub struct PoolSizeRatio {
    pub ty: vk::DescriptorType,
    pub ratio: f32,
}

/// Descriptor allocator that grows by whole pools and reclaims by bulk reset.
///
/// Exhausted pools are retired to a full list and never destroyed mid-life;
/// `reset_pools` returns every pool to service. One instance exists per frame
/// slot (reset at slot reuse) and one globally (reset never, destroyed at
/// shutdown).
pub struct DescriptorAllocatorGrowable {
    device: Arc<ash::Device>,
    ratios: Vec<PoolSizeRatio>,
    ready_pools: Vec<vk::DescriptorPool>,
    full_pools: Vec<vk::DescriptorPool>,
    sets_per_pool: u32,
}

impl DescriptorAllocatorGrowable {
    /// Create the allocator with one pool of `initial_sets` capacity.
    ///
    /// The ratio table is fixed for the allocator's lifetime.
    pub fn new(
        device: Arc<ash::Device>,
        initial_sets: u32,
        ratios: Vec<PoolSizeRatio>,
    ) -> Result<Self> {
        let mut allocator = Self {
            device,
            ratios,
            ready_pools: Vec::new(),
            full_pools: Vec::new(),
            sets_per_pool: initial_sets.max(1),
        };

        let pool = allocator.create_pool(allocator.sets_per_pool)?;
        allocator.ready_pools.push(pool);
        Ok(allocator)
    }

    /// Allocate one descriptor set for `layout`.
    ///
    /// Pool exhaustion retires the active pool and retries once from a grown
    /// pool; a second failure is a configuration error, not transient.
    pub fn allocate(&mut self, layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet> {
        let pool = self.get_or_create_pool()?;

        match self.try_allocate(pool, layout) {
            Ok(set) => {
                self.ready_pools.push(pool);
                Ok(set)
            }
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {
                self.full_pools.push(pool);

                let retry_pool = self.get_or_create_pool()?;
                match self.try_allocate(retry_pool, layout) {
                    Ok(set) => {
                        self.ready_pools.push(retry_pool);
                        Ok(set)
                    }
                    Err(e) => {
                        self.ready_pools.push(retry_pool);
                        Err(RenderError::DescriptorExhausted(format!(
                            "allocation failed after pool growth: {e:?}"
                        )))
                    }
                }
            }
            Err(e) => Err(RenderError::Vulkan(format!(
                "allocate_descriptor_sets failed: {e:?}"
            ))),
        }
    }

    /// Return every pool, active and full, to the empty state.
    ///
    /// Pools are reset, not destroyed; previously exhausted capacity is
    /// immediately allocatable again.
    pub fn reset_pools(&mut self) -> Result<()> {
        unsafe {
            for &pool in self.ready_pools.iter().chain(self.full_pools.iter()) {
                self.device
                    .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
                    .map_err(|e| {
                        RenderError::Vulkan(format!("reset_descriptor_pool failed: {e:?}"))
                    })?;
            }
        }

        let full = std::mem::take(&mut self.full_pools);
        self.ready_pools.extend(full);
        Ok(())
    }

    pub fn pool_count(&self) -> usize {
        self.ready_pools.len() + self.full_pools.len()
    }

    fn get_or_create_pool(&mut self) -> Result<vk::DescriptorPool> {
        if let Some(pool) = self.ready_pools.pop() {
            return Ok(pool);
        }

        self.sets_per_pool = next_pool_capacity(self.sets_per_pool, MAX_SETS_PER_POOL);
        debug!("Growing descriptor pool set: new capacity {}", self.sets_per_pool);
        self.create_pool(self.sets_per_pool)
    }

    fn create_pool(&self, max_sets: u32) -> Result<vk::DescriptorPool> {
        let pool_sizes: Vec<vk::DescriptorPoolSize> = self
            .ratios
            .iter()
            .map(|ratio| vk::DescriptorPoolSize {
                ty: ratio.ty,
                descriptor_count: ((ratio.ratio * max_sets as f32) as u32).max(1),
            })
            .collect();

        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        unsafe {
            self.device
                .create_descriptor_pool(&create_info, None)
                .map_err(|e| RenderError::Vulkan(format!("Failed to create descriptor pool: {e:?}")))
        }
    }

    fn try_allocate(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> std::result::Result<vk::DescriptorSet, vk::Result> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        unsafe {
            self.device
                .allocate_descriptor_sets(&alloc_info)
                .map(|sets| sets[0])
        }
    }
}

impl Drop for DescriptorAllocatorGrowable {
    fn drop(&mut self) {
        unsafe {
            for &pool in self.ready_pools.iter().chain(self.full_pools.iter()) {
                self.device.destroy_descriptor_pool(pool, None);
            }
        }
    }
}

/// Capacity of the next pool: grow 1.5x, saturating at `cap`.
fn next_pool_capacity(previous: u32, cap: u32) -> u32 {
    (previous.saturating_mul(GROWTH_NUMERATOR) / GROWTH_DENOMINATOR).min(cap)
}

/// RAII wrapper for a descriptor set layout.
pub struct DescriptorSetLayout {
    device: Arc<ash::Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorSetLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(1)
                .stage_flags(stage_flags),
        );
        self
    }

    pub fn build(self, device: Arc<ash::Device>) -> Result<DescriptorSetLayout> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);

        let layout = unsafe {
            device
                .create_descriptor_set_layout(&create_info, None)
                .map_err(|e| {
                    RenderError::Vulkan(format!("Failed to create descriptor set layout: {e:?}"))
                })?
        };

        Ok(DescriptorSetLayout { device, layout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_grows_by_half() {
        assert_eq!(next_pool_capacity(100, 4092), 150);
        assert_eq!(next_pool_capacity(1000, 4092), 1500);
    }

    #[test]
    fn capacity_saturates_at_cap() {
        assert_eq!(next_pool_capacity(4000, 4092), 4092);
        assert_eq!(next_pool_capacity(4092, 4092), 4092);
    }

    #[test]
    fn capacity_handles_overflow() {
        assert_eq!(next_pool_capacity(u32::MAX, 4092), 4092);
    }

    #[test]
    fn ratio_scaling_is_proportional() {
        let ratio = PoolSizeRatio {
            ty: vk::DescriptorType::STORAGE_BUFFER,
            ratio: 3.0,
        };
        assert_eq!((ratio.ratio * 10.0) as u32, 30);
    }
}
