//! CPU-side hot-path benchmarks.
//!
//! Covers the per-frame bookkeeping that runs on the render thread every
//! iteration: slot addressing, deletion-queue flush, and descriptor pool
//! sizing. No Vulkan driver required.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ember_renderer::ash::vk;
use ember_renderer::renderer::{frame::slot_index, DeletionQueue};
use ember_renderer::vulkan::PoolSizeRatio;

fn slot_addressing(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_addressing");

    group.bench_function("slot_index", |b| {
        let mut counter = 0_u64;
        b.iter(|| {
            counter = counter.wrapping_add(1);
            slot_index(counter)
        })
    });

    group.finish();
}

fn deletion_queue_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("deletion_queue");

    for count in [16, 256, 4096] {
        group.bench_with_input(BenchmarkId::new("defer_then_flush", count), &count, |b, &n| {
            b.iter(|| {
                let mut queue = DeletionQueue::new();
                for _ in 0..n {
                    queue.defer(|| {});
                }
                queue.flush();
                queue.is_empty()
            })
        });
    }

    group.finish();
}

fn descriptor_pool_sizing(c: &mut Criterion) {
    let mut group = c.benchmark_group("descriptor_pool_sizing");

    let ratios = [
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
    ];

    group.bench_function("pool_sizes_from_ratios", |b| {
        b.iter(|| {
            ratios
                .iter()
                .map(|ratio| vk::DescriptorPoolSize {
                    ty: ratio.ty,
                    descriptor_count: ((ratio.ratio * 512.0) as u32).max(1),
                })
                .collect::<Vec<_>>()
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    slot_addressing,
    deletion_queue_flush,
    descriptor_pool_sizing
);
criterion_main!(benches);
