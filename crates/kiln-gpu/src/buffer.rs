//! Host-visible buffers: uniform, vertex and index.
//!
//! Each buffer owns a dedicated host-visible, host-coherent allocation.
//! Updates map the memory, copy the caller's bytes to offset 0 and unmap.

use crate::context::GpuContext;
use crate::error::{Result, RhiError, VkResultExt};
use crate::memory::{self, HOST_VISIBLE_COHERENT};
use crate::translate;
use ash::vk;
use bytemuck::Pod;
use kiln_core::{
    GpuBufferDesc, GpuResource, IndexBufferDesc, IndexType, ResourceKind, VertexBufferDesc,
};
use std::sync::Arc;

/// A buffer with its bound memory. `buffer` and `memory` are both live or
/// both null.
pub(crate) struct RawBuffer {
    ctx: Arc<GpuContext>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: u64,
}

impl RawBuffer {
    pub(crate) fn new(ctx: Arc<GpuContext>, size: u64, usage: vk::BufferUsageFlags) -> Result<Self> {
        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let device = ctx.device();
        let buffer = unsafe { device.create_buffer(&create_info, None) }.or_rhi("buffer")?;
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory = match unsafe { memory::allocate(&ctx, requirements, HOST_VISIBLE_COHERENT) } {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(err);
            }
        };

        if let Err(e) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
            }
            return Err(crate::error::classify("bind buffer memory", e));
        }

        Ok(Self {
            ctx,
            buffer,
            memory,
            size,
        })
    }

    pub(crate) fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    fn is_live(&self) -> bool {
        self.buffer != vk::Buffer::null()
    }

    pub(crate) fn update(&self, bytes: &[u8]) -> Result<()> {
        if !self.is_live() {
            return Err(RhiError::invalid("update of a destroyed buffer"));
        }
        if bytes.len() as u64 > self.size {
            return Err(RhiError::invalid(format!(
                "update of {} bytes exceeds buffer size {}",
                bytes.len(),
                self.size
            )));
        }
        unsafe { memory::write_mapped(&self.ctx, self.memory, bytes) }
    }

    pub(crate) fn read(&self) -> Result<Vec<u8>> {
        if !self.is_live() {
            return Err(RhiError::invalid("read of a destroyed buffer"));
        }
        unsafe { memory::read_mapped(&self.ctx, self.memory, self.size as usize) }
    }

    pub(crate) fn destroy(&mut self) {
        if self.is_live() {
            unsafe {
                self.ctx.device().destroy_buffer(self.buffer, None);
                self.ctx.device().free_memory(self.memory, None);
            }
            self.buffer = vk::Buffer::null();
            self.memory = vk::DeviceMemory::null();
        }
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Usage shared by every buffer family. Transfer bits allow copies in both
/// directions.
const TRANSFER: vk::BufferUsageFlags = vk::BufferUsageFlags::from_raw(
    vk::BufferUsageFlags::TRANSFER_SRC.as_raw() | vk::BufferUsageFlags::TRANSFER_DST.as_raw(),
);

macro_rules! buffer_common {
    ($name:ident, $kind:expr) => {
        impl $name {
            pub fn handle(&self) -> vk::Buffer {
                self.raw.handle()
            }

            pub fn size(&self) -> u64 {
                self.raw.size()
            }

            /// Copy `bytes` to the start of the buffer.
            #[cfg_attr(
                feature = "profiling-tracy",
                tracing::instrument(level = "trace", skip_all)
            )]
            pub fn update(&self, bytes: &[u8]) -> Result<()> {
                self.raw.update(bytes)
            }

            /// Copy a slice of plain values to the start of the buffer.
            pub fn update_typed<T: Pod>(&self, values: &[T]) -> Result<()> {
                self.raw.update(bytemuck::cast_slice(values))
            }

            /// Read the whole buffer back.
            pub fn read(&self) -> Result<Vec<u8>> {
                self.raw.read()
            }
        }

        impl GpuResource for $name {
            fn kind(&self) -> ResourceKind {
                $kind
            }

            fn is_live(&self) -> bool {
                self.raw.is_live()
            }

            fn destroy(&mut self) {
                self.raw.destroy();
            }
        }
    };
}

/// Uniform buffer bound through descriptor sets.
pub struct GpuBuffer {
    raw: RawBuffer,
}

impl GpuBuffer {
    pub fn new(ctx: Arc<GpuContext>, desc: &GpuBufferDesc) -> Result<Self> {
        desc.validate()?;
        let raw = RawBuffer::new(ctx, desc.size, vk::BufferUsageFlags::UNIFORM_BUFFER | TRANSFER)?;
        tracing::debug!(size = desc.size, "Created GPU buffer");
        Ok(Self { raw })
    }
}

buffer_common!(GpuBuffer, ResourceKind::GpuBuffer);

pub struct VertexBuffer {
    raw: RawBuffer,
    stride: u32,
}

impl VertexBuffer {
    pub fn new(ctx: Arc<GpuContext>, desc: &VertexBufferDesc) -> Result<Self> {
        desc.validate()?;
        let raw = RawBuffer::new(ctx, desc.size, vk::BufferUsageFlags::VERTEX_BUFFER | TRANSFER)?;
        tracing::debug!(size = desc.size, stride = desc.stride, "Created vertex buffer");
        Ok(Self {
            raw,
            stride: desc.stride,
        })
    }

    /// Bytes between consecutive vertices.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Whole vertices the buffer holds.
    pub fn vertex_count(&self) -> u32 {
        (self.raw.size() / u64::from(self.stride)) as u32
    }
}

buffer_common!(VertexBuffer, ResourceKind::VertexBuffer);

pub struct IndexBuffer {
    raw: RawBuffer,
    index_type: IndexType,
}

impl IndexBuffer {
    /// Fails with invalid-argument unless the format is R16Uint or R32Uint.
    pub fn new(ctx: Arc<GpuContext>, desc: &IndexBufferDesc) -> Result<Self> {
        let index_type = desc.validate()?;
        let raw = RawBuffer::new(ctx, desc.size, vk::BufferUsageFlags::INDEX_BUFFER | TRANSFER)?;
        tracing::debug!(size = desc.size, ?index_type, "Created index buffer");
        Ok(Self { raw, index_type })
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    pub(crate) fn vk_index_type(&self) -> vk::IndexType {
        translate::index_type(self.index_type)
    }

    pub fn index_count(&self) -> u32 {
        (self.raw.size() / u64::from(self.index_type.size_in_bytes())) as u32
    }
}

buffer_common!(IndexBuffer, ResourceKind::IndexBuffer);
