//! Vertex input layout and resource binding groups.

use crate::error::{Result, RhiError};
use crate::format::Format;
use crate::resource::ShaderStages;
use std::collections::HashSet;

/// How often a vertex buffer advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InputRate {
    #[default]
    Vertex,
    Instance,
}

/// One attribute read from a vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader input location.
    pub slot: u32,
    pub format: Format,
}

impl VertexAttribute {
    pub const fn new(slot: u32, format: Format) -> Self {
        Self { slot, format }
    }
}

/// Tightly packed attributes of one vertex buffer, in memory order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    pub attributes: Vec<VertexAttribute>,
    pub input_rate: InputRate,
}

/// A vertex buffer binding point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: InputRate,
}

/// A vertex attribute placed within a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttributeLocation {
    pub binding: u32,
    pub location: u32,
    pub format: Format,
    /// Byte offset within one vertex of the binding.
    pub offset: u32,
}

/// Resolved vertex input: one binding per buffer layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexInputLayout {
    pub bindings: Vec<VertexBinding>,
    pub attributes: Vec<VertexAttributeLocation>,
}

impl VertexInputLayout {
    /// Place every attribute at the running offset within its buffer.
    ///
    /// A binding's stride is the sum of its attribute sizes. Each shader
    /// location may be fed by one attribute only.
    pub fn resolve(buffers: &[VertexBufferLayout]) -> Result<Self> {
        let mut layout = Self::default();
        let mut locations = HashSet::new();

        for (binding, buffer) in buffers.iter().enumerate() {
            let binding = binding as u32;
            let mut offset = 0;
            for attribute in &buffer.attributes {
                if !locations.insert(attribute.slot) {
                    return Err(RhiError::invalid(format!(
                        "vertex location {} is fed by more than one attribute",
                        attribute.slot
                    )));
                }
                layout.attributes.push(VertexAttributeLocation {
                    binding,
                    location: attribute.slot,
                    format: attribute.format,
                    offset,
                });
                offset += attribute.format.size_in_bytes();
            }
            layout.bindings.push(VertexBinding {
                binding,
                stride: offset,
                input_rate: buffer.input_rate,
            });
        }

        Ok(layout)
    }
}

/// Kind of resource a binding slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    UniformBuffer,
    StorageBuffer,
    SampledTexture,
    Sampler,
    CombinedTextureSampler,
    StorageTexture,
    InputAttachment,
}

/// A slot in a binding group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingSlot {
    pub binding: u32,
    pub kind: BindingKind,
    pub count: u32,
    pub stages: ShaderStages,
}

impl BindingSlot {
    pub const fn new(binding: u32, kind: BindingKind, stages: ShaderStages) -> Self {
        Self {
            binding,
            kind,
            count: 1,
            stages,
        }
    }
}

/// Layout of one descriptor set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BindingGroupLayout {
    pub slots: Vec<BindingSlot>,
}

impl BindingGroupLayout {
    /// Slot with the given binding number.
    pub fn slot(&self, binding: u32) -> Option<&BindingSlot> {
        self.slots.iter().find(|slot| slot.binding == binding)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for slot in &self.slots {
            if !seen.insert(slot.binding) {
                return Err(RhiError::invalid(format!(
                    "binding {} declared twice in one group",
                    slot.binding
                )));
            }
            if slot.count == 0 {
                return Err(RhiError::invalid(format!(
                    "binding {} has a descriptor count of zero",
                    slot.binding
                )));
            }
        }
        Ok(())
    }
}

/// A range of push constants visible to some stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    pub stages: ShaderStages,
    pub offset: u32,
    pub size: u32,
}

impl PushConstantRange {
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 || self.offset % 4 != 0 || self.size % 4 != 0 {
            return Err(RhiError::invalid(format!(
                "push constant range {}+{} must be non-empty and 4-byte aligned",
                self.offset, self.size
            )));
        }
        Ok(())
    }

    /// Whether `[offset, offset + len)` lies inside this range.
    pub const fn contains(&self, offset: u32, len: u32) -> bool {
        match (offset.checked_add(len), self.offset.checked_add(self.size)) {
            (Some(end), Some(limit)) => offset >= self.offset && end <= limit,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_is_sum_of_attribute_sizes() {
        let buffers = [
            VertexBufferLayout {
                attributes: vec![
                    VertexAttribute::new(0, Format::R32G32B32Float),
                    VertexAttribute::new(1, Format::R32G32Float),
                    VertexAttribute::new(2, Format::R8G8B8A8Unorm),
                ],
                input_rate: InputRate::Vertex,
            },
            VertexBufferLayout {
                attributes: vec![VertexAttribute::new(3, Format::R32G32B32A32Float)],
                input_rate: InputRate::Instance,
            },
        ];

        let layout = VertexInputLayout::resolve(&buffers).unwrap();
        assert_eq!(layout.bindings.len(), 2);
        assert_eq!(layout.bindings[0].stride, 24);
        assert_eq!(layout.bindings[1].stride, 16);
        assert_eq!(layout.bindings[1].input_rate, InputRate::Instance);

        let offsets: Vec<_> = layout
            .attributes
            .iter()
            .map(|a| (a.binding, a.location, a.offset))
            .collect();
        assert_eq!(offsets, vec![(0, 0, 0), (0, 1, 12), (0, 2, 20), (1, 3, 0)]);
    }

    #[test]
    fn duplicate_location_is_rejected() {
        let buffers = [VertexBufferLayout {
            attributes: vec![
                VertexAttribute::new(0, Format::R32Float),
                VertexAttribute::new(0, Format::R32Float),
            ],
            input_rate: InputRate::Vertex,
        }];
        assert!(VertexInputLayout::resolve(&buffers).is_err());
    }

    #[test]
    fn binding_group_rejects_duplicates() {
        let group = BindingGroupLayout {
            slots: vec![
                BindingSlot::new(0, BindingKind::UniformBuffer, ShaderStages::VERTEX),
                BindingSlot::new(0, BindingKind::SampledTexture, ShaderStages::FRAGMENT),
            ],
        };
        assert!(group.validate().is_err());
    }

    #[test]
    fn push_constant_containment() {
        let range = PushConstantRange {
            stages: ShaderStages::VERTEX,
            offset: 16,
            size: 64,
        };
        assert!(range.validate().is_ok());
        assert!(range.contains(16, 64));
        assert!(!range.contains(0, 4));
        assert!(!range.contains(72, 16));
    }

    #[test]
    fn push_constant_containment_does_not_overflow() {
        let range = PushConstantRange {
            stages: ShaderStages::VERTEX,
            offset: 16,
            size: 64,
        };
        assert!(!range.contains(u32::MAX, 4));
        assert!(!range.contains(16, u32::MAX));

        let top = PushConstantRange {
            stages: ShaderStages::VERTEX,
            offset: u32::MAX - 3,
            size: 8,
        };
        assert!(!top.contains(u32::MAX - 3, 4));
    }
}
