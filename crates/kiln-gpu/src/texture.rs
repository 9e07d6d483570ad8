//! Textures: image, dedicated memory and a default view.

use crate::barrier::{self, ImageRange};
use crate::buffer::RawBuffer;
use crate::context::GpuContext;
use crate::error::{Result, RhiError, VkResultExt};
use crate::memory::{self, HOST_VISIBLE_COHERENT};
use crate::translate;
use ash::vk;
use kiln_core::{
    Format, GpuResource, ResourceKind, ResourceState, TextureDesc, TextureDimension,
    TextureFlags, Transition,
};
use parking_lot::Mutex;
use std::sync::Arc;

pub fn image_type(dimension: TextureDimension) -> vk::ImageType {
    match dimension {
        TextureDimension::D1 => vk::ImageType::TYPE_1D,
        TextureDimension::D2 => vk::ImageType::TYPE_2D,
        TextureDimension::D3 => vk::ImageType::TYPE_3D,
    }
}

pub fn view_type(dimension: TextureDimension) -> vk::ImageViewType {
    match dimension {
        TextureDimension::D1 => vk::ImageViewType::TYPE_1D,
        TextureDimension::D2 => vk::ImageViewType::TYPE_2D,
        TextureDimension::D3 => vk::ImageViewType::TYPE_3D,
    }
}

/// Image usage implied by the texture flags.
pub fn usage_flags(flags: TextureFlags) -> vk::ImageUsageFlags {
    const TABLE: [(TextureFlags, vk::ImageUsageFlags); 7] = [
        (
            TextureFlags::RENDER_TARGET,
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
        ),
        (
            TextureFlags::DEPTH_STENCIL,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        ),
        (TextureFlags::SHADER_RESOURCE, vk::ImageUsageFlags::SAMPLED),
        (TextureFlags::UNORDERED_ACCESS, vk::ImageUsageFlags::STORAGE),
        (TextureFlags::COPY_SRC, vk::ImageUsageFlags::TRANSFER_SRC),
        (TextureFlags::COPY_DST, vk::ImageUsageFlags::TRANSFER_DST),
        (
            TextureFlags::INPUT_ATTACHMENT,
            vk::ImageUsageFlags::INPUT_ATTACHMENT,
        ),
    ];

    TABLE
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .fold(vk::ImageUsageFlags::empty(), |acc, (_, usage)| acc | *usage)
}

/// Sharing mode and the queue families it names. Concurrent sharing needs at
/// least two distinct families.
pub fn sharing(flags: TextureFlags, families: &[u32]) -> Result<(vk::SharingMode, Vec<u32>)> {
    if !flags.contains(TextureFlags::CONCURRENT) {
        return Ok((vk::SharingMode::EXCLUSIVE, Vec::new()));
    }
    let mut distinct = families.to_vec();
    distinct.sort_unstable();
    distinct.dedup();
    if distinct.len() < 2 {
        return Err(RhiError::invalid(format!(
            "concurrent sharing needs two or more queue families, device has {}",
            distinct.len()
        )));
    }
    Ok((vk::SharingMode::CONCURRENT, distinct))
}

/// Byte size of mip 0, layer 0 with tightly packed texels.
pub fn base_level_size(desc: &TextureDesc) -> u64 {
    u64::from(desc.width)
        * u64::from(desc.height)
        * u64::from(desc.depth)
        * u64::from(desc.format.size_in_bytes())
}

pub struct Texture {
    ctx: Arc<GpuContext>,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    desc: TextureDesc,
    state: Mutex<ResourceState>,
}

impl Texture {
    pub fn new(ctx: Arc<GpuContext>, desc: &TextureDesc) -> Result<Self> {
        desc.validate()?;
        let (sharing_mode, families) = sharing(desc.flags, &[ctx.queue_family()])?;
        let usage = usage_flags(desc.flags);
        if usage.is_empty() {
            return Err(RhiError::invalid("texture has no usage flags"));
        }

        let linear = desc.flags.contains(TextureFlags::LINEAR_TILING);
        let create_info = vk::ImageCreateInfo::default()
            .image_type(image_type(desc.dimension()))
            .format(translate::format(desc.format))
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: desc.depth,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(desc.layer_count())
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(if linear {
                vk::ImageTiling::LINEAR
            } else {
                vk::ImageTiling::OPTIMAL
            })
            .usage(usage)
            .sharing_mode(sharing_mode)
            .queue_family_indices(&families)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let device = ctx.device();
        let image = unsafe { device.create_image(&create_info, None) }.or_rhi("image")?;
        let mut texture = Self {
            ctx: Arc::clone(&ctx),
            image,
            memory: vk::DeviceMemory::null(),
            view: vk::ImageView::null(),
            desc: *desc,
            state: Mutex::new(ResourceState::Undefined),
        };

        // On any failure below, dropping `texture` releases what exists.
        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let properties = if linear {
            HOST_VISIBLE_COHERENT
        } else {
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        };
        texture.memory = unsafe { memory::allocate(&ctx, requirements, properties) }?;
        unsafe { device.bind_image_memory(image, texture.memory, 0) }
            .or_rhi("bind image memory")?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(view_type(desc.dimension()))
            .format(translate::format(desc.format))
            .components(vk::ComponentMapping::default())
            .subresource_range(texture.full_range().subresource().layer_count(1));
        texture.view =
            unsafe { device.create_image_view(&view_info, None) }.or_rhi("image view")?;

        tracing::debug!(
            width = desc.width,
            height = desc.height,
            depth = desc.depth,
            format = ?desc.format,
            "Created texture"
        );
        Ok(texture)
    }

    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// Default view: all mips of layer 0.
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn format(&self) -> Format {
        self.desc.format
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    /// State the texture was last transitioned to.
    pub fn state(&self) -> ResourceState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: ResourceState) {
        *self.state.lock() = state;
    }

    /// Every mip and layer of the image.
    pub fn full_range(&self) -> ImageRange {
        ImageRange {
            aspect: translate::aspect_mask(self.desc.format),
            mip_levels: self.desc.mip_levels,
            array_layers: self.desc.layer_count(),
        }
    }

    /// Copy tightly packed texels into mip 0, layer 0 and leave the texture
    /// ready for shader reads.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn upload(&self, bytes: &[u8]) -> Result<()> {
        if !self.is_live() {
            return Err(RhiError::invalid("upload to a destroyed texture"));
        }
        if !self.desc.flags.contains(TextureFlags::COPY_DST) {
            return Err(RhiError::invalid("upload requires the COPY_DST flag"));
        }
        let expected = base_level_size(&self.desc);
        if bytes.len() as u64 != expected {
            return Err(RhiError::invalid(format!(
                "upload of {} bytes, base level holds {expected}",
                bytes.len()
            )));
        }

        let staging = RawBuffer::new(
            Arc::clone(&self.ctx),
            expected,
            vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        staging.update(bytes)?;

        let range = self.full_range();
        let before = self.state();
        let to_copy = Transition::new(before, ResourceState::CopyDest);
        let to_read = Transition::new(ResourceState::CopyDest, ResourceState::ShaderResource);
        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(range.aspect)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image_offset(vk::Offset3D::default())
            .image_extent(vk::Extent3D {
                width: self.desc.width,
                height: self.desc.height,
                depth: self.desc.depth,
            });

        unsafe {
            self.ctx.execute_one_shot(|device, cmd| {
                barrier::record(device, cmd, self.image, range, to_copy);
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging.handle(),
                    self.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
                barrier::record(device, cmd, self.image, range, to_read);
            })
        }?;

        self.set_state(ResourceState::ShaderResource);
        Ok(())
    }
}

impl GpuResource for Texture {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Texture
    }

    fn is_live(&self) -> bool {
        self.image != vk::Image::null()
    }

    fn destroy(&mut self) {
        let device = self.ctx.device();
        unsafe {
            if self.view != vk::ImageView::null() {
                device.destroy_image_view(self.view, None);
            }
            if self.image != vk::Image::null() {
                device.destroy_image(self.image, None);
            }
            if self.memory != vk::DeviceMemory::null() {
                device.free_memory(self.memory, None);
            }
        }
        self.view = vk::ImageView::null();
        self.image = vk::Image::null();
        self.memory = vk::DeviceMemory::null();
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_type_follows_extent() {
        let flags = TextureFlags::SHADER_RESOURCE;
        let line = TextureDesc::new_2d(64, 1, Format::R8Unorm, flags);
        let plane = TextureDesc::new_2d(64, 64, Format::R8Unorm, flags);
        let volume = TextureDesc {
            depth: 8,
            ..plane
        };
        assert_eq!(image_type(line.dimension()), vk::ImageType::TYPE_1D);
        assert_eq!(image_type(plane.dimension()), vk::ImageType::TYPE_2D);
        assert_eq!(image_type(volume.dimension()), vk::ImageType::TYPE_3D);
        assert_eq!(view_type(volume.dimension()), vk::ImageViewType::TYPE_3D);
    }

    #[test]
    fn usage_from_flags() {
        assert_eq!(
            usage_flags(TextureFlags::RENDER_TARGET | TextureFlags::SHADER_RESOURCE),
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED
        );
        assert_eq!(
            usage_flags(TextureFlags::DEPTH_STENCIL | TextureFlags::ARRAY),
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        );
        assert!(usage_flags(TextureFlags::LINEAR_TILING).is_empty());
    }

    #[test]
    fn concurrent_sharing_needs_distinct_families() {
        let (mode, families) = sharing(TextureFlags::empty(), &[0]).unwrap();
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(families.is_empty());

        let err = sharing(TextureFlags::CONCURRENT, &[0, 0]).unwrap_err();
        assert!(err.is_invalid_argument());

        let (mode, families) = sharing(TextureFlags::CONCURRENT, &[2, 0, 2]).unwrap();
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(families, vec![0, 2]);
    }

    #[test]
    fn base_level_size_is_tightly_packed() {
        let desc = TextureDesc::new_2d(4, 2, Format::R8G8B8A8Unorm, TextureFlags::COPY_DST);
        assert_eq!(base_level_size(&desc), 32);
    }
}
