//! Descriptor set layouts, transient pools and writes.

use crate::error::{classify, Result, RhiError, VkResultExt};
use crate::translate;
use ash::vk;
use kiln_core::{BindingGroupLayout, BindingKind};
use std::collections::BTreeSet;

/// Layout bindings of one binding group.
pub fn layout_bindings(group: &BindingGroupLayout) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
    group
        .slots
        .iter()
        .map(|slot| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(slot.binding)
                .descriptor_type(translate::descriptor_type(slot.kind))
                .descriptor_count(slot.count)
                .stage_flags(translate::shader_stages(slot.stages))
        })
        .collect()
}

/// Create the descriptor set layout of `group`.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_set_layout(
    device: &ash::Device,
    group: &BindingGroupLayout,
) -> Result<vk::DescriptorSetLayout> {
    let bindings = layout_bindings(group);
    let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
    device
        .create_descriptor_set_layout(&layout_info, None)
        .or_rhi("descriptor set layout")
}

const POOLED_KINDS: [BindingKind; 7] = [
    BindingKind::UniformBuffer,
    BindingKind::StorageBuffer,
    BindingKind::SampledTexture,
    BindingKind::Sampler,
    BindingKind::CombinedTextureSampler,
    BindingKind::StorageTexture,
    BindingKind::InputAttachment,
];

/// Pool sizes giving every descriptor type `per_type` descriptors.
pub fn pool_sizes(per_type: u32) -> Vec<vk::DescriptorPoolSize> {
    POOLED_KINDS
        .iter()
        .map(|&kind| vk::DescriptorPoolSize {
            ty: translate::descriptor_type(kind),
            descriptor_count: per_type,
        })
        .collect()
}

/// Descriptor sets allocated while recording. Blocks of
/// [`Self::MAX_SETS`] sets are added when the current one runs out, and
/// every block is reset together.
pub struct DescriptorPool {
    blocks: Vec<vk::DescriptorPool>,
    current: usize,
}

impl DescriptorPool {
    /// Sets per pool block.
    pub const MAX_SETS: u32 = 256;

    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        Ok(Self {
            blocks: vec![Self::create_block(device)?],
            current: 0,
        })
    }

    unsafe fn create_block(device: &ash::Device) -> Result<vk::DescriptorPool> {
        let sizes = pool_sizes(Self::MAX_SETS * 4);
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(Self::MAX_SETS)
            .pool_sizes(&sizes);
        device
            .create_descriptor_pool(&create_info, None)
            .or_rhi("descriptor pool")
    }

    /// Number of pool blocks created so far.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Allocate one set with `layout`, moving on to a further block when
    /// the current one is exhausted.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate(
        &mut self,
        device: &ash::Device,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet> {
        if self.blocks.is_empty() {
            return Err(RhiError::invalid("allocate from a destroyed descriptor pool"));
        }
        let layouts = [layout];
        loop {
            let alloc_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(self.blocks[self.current])
                .set_layouts(&layouts);
            match device.allocate_descriptor_sets(&alloc_info) {
                Ok(sets) => {
                    return sets.into_iter().next().ok_or_else(|| RhiError::CreationFailed {
                        what: "descriptor set",
                        reason: "allocation returned no handle".to_string(),
                    })
                }
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL)
                    if self.current + 1 < self.blocks.len() =>
                {
                    self.current += 1;
                }
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                    tracing::debug!(
                        blocks = self.blocks.len() + 1,
                        "Descriptor pool exhausted, adding a block"
                    );
                    self.blocks.push(Self::create_block(device)?);
                    self.current = self.blocks.len() - 1;
                }
                Err(e) => return Err(classify("descriptor set", e)),
            }
        }
    }

    /// Free every set allocated from any block.
    ///
    /// # Safety
    /// No set from this pool may be in use by the GPU.
    pub unsafe fn reset(&mut self, device: &ash::Device) -> Result<()> {
        for &block in &self.blocks {
            device
                .reset_descriptor_pool(block, vk::DescriptorPoolResetFlags::empty())
                .or_rhi("descriptor pool reset")?;
        }
        self.current = 0;
        Ok(())
    }

    /// # Safety
    /// The pool must not be in use.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for block in self.blocks.drain(..) {
            device.destroy_descriptor_pool(block, None);
        }
        self.current = 0;
    }
}

/// A resource bound to one binding of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundResource {
    Buffer {
        buffer: vk::Buffer,
        range: u64,
    },
    Image {
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    },
    Sampler {
        sampler: vk::Sampler,
    },
}

/// Write `bindings` into `set`. Each entry is `(binding, kind, resource)`.
///
/// # Safety
/// The device, set and every bound handle must be valid.
pub unsafe fn write_set(
    device: &ash::Device,
    set: vk::DescriptorSet,
    bindings: &[(u32, BindingKind, BoundResource)],
) {
    let buffer_infos: Vec<vk::DescriptorBufferInfo> = bindings
        .iter()
        .map(|(_, _, resource)| match *resource {
            BoundResource::Buffer { buffer, range } => vk::DescriptorBufferInfo::default()
                .buffer(buffer)
                .offset(0)
                .range(range),
            BoundResource::Image { .. } | BoundResource::Sampler { .. } => {
                vk::DescriptorBufferInfo::default()
            }
        })
        .collect();
    let image_infos: Vec<vk::DescriptorImageInfo> = bindings
        .iter()
        .map(|(_, _, resource)| match *resource {
            BoundResource::Image {
                view,
                sampler,
                layout,
            } => vk::DescriptorImageInfo::default()
                .image_view(view)
                .sampler(sampler)
                .image_layout(layout),
            BoundResource::Sampler { sampler } => vk::DescriptorImageInfo::default().sampler(sampler),
            BoundResource::Buffer { .. } => vk::DescriptorImageInfo::default(),
        })
        .collect();

    let writes: Vec<vk::WriteDescriptorSet> = bindings
        .iter()
        .enumerate()
        .map(|(i, &(binding, kind, resource))| {
            let write = vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(binding)
                .descriptor_type(translate::descriptor_type(kind));
            match resource {
                BoundResource::Buffer { .. } => {
                    write.buffer_info(std::slice::from_ref(&buffer_infos[i]))
                }
                BoundResource::Image { .. } | BoundResource::Sampler { .. } => {
                    write.image_info(std::slice::from_ref(&image_infos[i]))
                }
            }
        })
        .collect();

    device.update_descriptor_sets(&writes, &[]);
}

/// First `(group, binding)` declared by `groups` that is missing from
/// `staged`. Group `i` of `groups` is descriptor set `i`.
pub fn first_unbound(
    groups: &[BindingGroupLayout],
    staged: &BTreeSet<(u32, u32)>,
) -> Option<(u32, u32)> {
    (0_u32..)
        .zip(groups)
        .flat_map(|(group, layout)| layout.slots.iter().map(move |slot| (group, slot.binding)))
        .find(|key| !staged.contains(key))
}
