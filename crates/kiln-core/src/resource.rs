//! Resource descriptors and the capability trait shared by every GPU resource.

use crate::error::{Result, RhiError};
use crate::format::Format;
use crate::state::CompareOp;
use bitflags::bitflags;

/// The family a resource belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Fence,
    Shader,
    Sampler,
    GpuBuffer,
    VertexBuffer,
    IndexBuffer,
    Texture,
    RenderPass,
    Framebuffer,
    PipelineState,
    CommandBuffer,
    SwapChain,
}

/// Capabilities common to every object that owns backend handles.
///
/// `destroy` releases the handles exactly once and nulls them; calling it
/// again is a no-op. Implementations also call it from `Drop`.
pub trait GpuResource {
    /// The resource family.
    fn kind(&self) -> ResourceKind;

    /// Whether the backend handles are still alive.
    fn is_live(&self) -> bool;

    /// Release the backend handles.
    fn destroy(&mut self);
}

/// Descriptor of a uniform (constant) buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuBufferDesc {
    pub size: u64,
}

/// Descriptor of a vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferDesc {
    pub size: u64,
    /// Bytes between consecutive vertices.
    pub stride: u32,
}

/// Descriptor of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexBufferDesc {
    pub size: u64,
    /// Must be [`Format::R16Uint`] or [`Format::R32Uint`].
    pub format: Format,
}

/// Width of one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    /// Index width implied by an index buffer format.
    pub fn from_format(format: Format) -> Result<Self> {
        match format {
            Format::R16Uint => Ok(Self::U16),
            Format::R32Uint => Ok(Self::U32),
            other => Err(RhiError::invalid(format!(
                "{other:?} is not an index format"
            ))),
        }
    }

    /// Size of one index in bytes.
    pub const fn size_in_bytes(self) -> u32 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

pub(crate) fn check_buffer_size(size: u64) -> Result<()> {
    if size == 0 {
        return Err(RhiError::invalid("buffer size must be non-zero"));
    }
    Ok(())
}

impl GpuBufferDesc {
    pub fn validate(&self) -> Result<()> {
        check_buffer_size(self.size)
    }
}

impl VertexBufferDesc {
    pub fn validate(&self) -> Result<()> {
        check_buffer_size(self.size)?;
        if self.stride == 0 {
            return Err(RhiError::invalid("vertex stride must be non-zero"));
        }
        Ok(())
    }
}

impl IndexBufferDesc {
    /// Validate and return the index width.
    pub fn validate(&self) -> Result<IndexType> {
        check_buffer_size(self.size)?;
        IndexType::from_format(self.format)
    }
}

bitflags! {
    /// Creation flags and intended usages of a texture.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureFlags: u32 {
        /// Honor `array_layers`; otherwise a single layer is created.
        const ARRAY = 1 << 0;
        /// Linear tiling instead of optimal.
        const LINEAR_TILING = 1 << 1;
        /// Concurrent sharing between queue families.
        const CONCURRENT = 1 << 2;
        const RENDER_TARGET = 1 << 3;
        const DEPTH_STENCIL = 1 << 4;
        const SHADER_RESOURCE = 1 << 5;
        const UNORDERED_ACCESS = 1 << 6;
        const COPY_SRC = 1 << 7;
        const COPY_DST = 1 << 8;
        const INPUT_ATTACHMENT = 1 << 9;
    }
}

/// Dimensionality of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D1,
    D2,
    D3,
}

/// Descriptor of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    /// Only used when [`TextureFlags::ARRAY`] is set.
    pub array_layers: u32,
    pub format: Format,
    pub flags: TextureFlags,
}

impl TextureDesc {
    /// A single-mip 2D texture.
    pub const fn new_2d(width: u32, height: u32, format: Format, flags: TextureFlags) -> Self {
        Self {
            width,
            height,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            format,
            flags,
        }
    }

    /// Dimensionality inferred from the extent.
    pub const fn dimension(&self) -> TextureDimension {
        if self.depth > 1 {
            TextureDimension::D3
        } else if self.height > 1 {
            TextureDimension::D2
        } else {
            TextureDimension::D1
        }
    }

    /// Number of array layers the image is created with.
    pub fn layer_count(&self) -> u32 {
        if self.flags.contains(TextureFlags::ARRAY) {
            self.array_layers.max(1)
        } else {
            1
        }
    }

    /// Largest mip chain the extent supports.
    pub fn max_mip_levels(&self) -> u32 {
        let largest = self.width.max(self.height).max(self.depth).max(1);
        u32::BITS - largest.leading_zeros()
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return Err(RhiError::invalid(format!(
                "texture extent {}x{}x{} has a zero dimension",
                self.width, self.height, self.depth
            )));
        }
        if self.mip_levels == 0 || self.mip_levels > self.max_mip_levels() {
            return Err(RhiError::invalid(format!(
                "{} mip levels requested, extent allows 1..={}",
                self.mip_levels,
                self.max_mip_levels()
            )));
        }
        if self.dimension() == TextureDimension::D3 && self.layer_count() > 1 {
            return Err(RhiError::invalid("3D textures cannot have array layers"));
        }
        if self.flags.contains(TextureFlags::DEPTH_STENCIL) && !self.format.has_depth() {
            return Err(RhiError::invalid(format!(
                "depth-stencil usage requires a depth format, got {:?}",
                self.format
            )));
        }
        Ok(())
    }
}

/// Texel filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Filter between mip levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MipmapMode {
    Nearest,
    Linear,
}

/// Handling of texture coordinates outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Wrap,
    Mirror,
    Clamp,
    Border,
    MirrorOnce,
}

/// Descriptor of a sampler.
///
/// The border color is always opaque black and coordinates are always
/// normalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub mipmap_mode: MipmapMode,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub anisotropy_enable: bool,
    pub max_anisotropy: f32,
    pub compare_enable: bool,
    pub compare_op: CompareOp,
    pub mip_lod_bias: f32,
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            mipmap_mode: MipmapMode::Linear,
            address_u: AddressMode::Wrap,
            address_v: AddressMode::Wrap,
            address_w: AddressMode::Wrap,
            anisotropy_enable: false,
            max_anisotropy: 1.0,
            compare_enable: false,
            compare_op: CompareOp::Never,
            mip_lod_bias: 0.0,
            min_lod: 0.0,
            max_lod: f32::MAX,
        }
    }
}

impl SamplerDesc {
    pub fn validate(&self) -> Result<()> {
        if self.anisotropy_enable && (self.max_anisotropy.is_nan() || self.max_anisotropy < 1.0) {
            return Err(RhiError::invalid(format!(
                "max anisotropy {} must be at least 1",
                self.max_anisotropy
            )));
        }
        if self.min_lod.is_nan() || self.max_lod.is_nan() || self.mip_lod_bias.is_nan() {
            return Err(RhiError::invalid("sampler LOD parameters must not be NaN"));
        }
        if self.min_lod > self.max_lod {
            return Err(RhiError::invalid(format!(
                "min LOD {} exceeds max LOD {}",
                self.min_lod, self.max_lod
            )));
        }
        Ok(())
    }
}

/// A programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
    Mesh,
}

impl ShaderStage {
    /// Stages in the order pipeline stage lists are built.
    pub const ALL: [Self; 4] = [Self::Vertex, Self::Fragment, Self::Compute, Self::Mesh];
}

bitflags! {
    /// A set of shader stages.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
        const MESH = 1 << 3;
        const ALL_GRAPHICS = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

impl From<ShaderStage> for ShaderStages {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => Self::VERTEX,
            ShaderStage::Fragment => Self::FRAGMENT,
            ShaderStage::Compute => Self::COMPUTE,
            ShaderStage::Mesh => Self::MESH,
        }
    }
}

/// Compiled byte-code for up to four stages. Empty blobs are absent stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderDesc {
    pub vertex: Vec<u8>,
    pub fragment: Vec<u8>,
    pub compute: Vec<u8>,
    pub mesh: Vec<u8>,
}

impl ShaderDesc {
    /// Byte-code of one stage, if present.
    pub fn blob(&self, stage: ShaderStage) -> Option<&[u8]> {
        let bytes = match stage {
            ShaderStage::Vertex => &self.vertex,
            ShaderStage::Fragment => &self.fragment,
            ShaderStage::Compute => &self.compute,
            ShaderStage::Mesh => &self.mesh,
        };
        (!bytes.is_empty()).then_some(bytes.as_slice())
    }

    /// Present stages with their byte-code, in [`ShaderStage::ALL`] order.
    pub fn blobs(&self) -> impl Iterator<Item = (ShaderStage, &[u8])> {
        ShaderStage::ALL
            .into_iter()
            .filter_map(|stage| self.blob(stage).map(|bytes| (stage, bytes)))
    }
}

/// Convert shader byte-code into little-endian 32-bit words.
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(RhiError::invalid(format!(
            "shader byte-code length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Presentation model of a swap chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SwapChainEffect {
    /// Present immediately, possibly tearing.
    Discard,
    /// Vsync that tears when a frame is late.
    Sequential,
    /// Vsync with a strict queue of frames.
    #[default]
    FlipSequential,
    /// Vsync that replaces the queued frame with the newest one.
    FlipDiscard,
}

/// Kind of command list to allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandListType {
    /// Directly submittable.
    #[default]
    Direct,
    /// Executed from a direct command list.
    Bundle,
    Compute,
    Copy,
}

impl CommandListType {
    /// Whether command buffers of this type are submitted directly.
    pub const fn is_primary(self) -> bool {
        matches!(self, Self::Direct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_type_from_format() {
        assert_eq!(IndexType::from_format(Format::R16Uint), Ok(IndexType::U16));
        assert_eq!(IndexType::from_format(Format::R32Uint), Ok(IndexType::U32));
        assert_eq!(IndexType::U16.size_in_bytes(), 2);
        assert_eq!(IndexType::U32.size_in_bytes(), 4);

        for format in Format::ALL {
            if !format.is_index() {
                let err = IndexType::from_format(format).unwrap_err();
                assert!(err.is_invalid_argument(), "{format:?}");
            }
        }
    }

    #[test]
    fn texture_dimension_from_extent() {
        let mut desc = TextureDesc::new_2d(64, 1, Format::R8Unorm, TextureFlags::empty());
        assert_eq!(desc.dimension(), TextureDimension::D1);
        desc.height = 64;
        assert_eq!(desc.dimension(), TextureDimension::D2);
        desc.depth = 4;
        assert_eq!(desc.dimension(), TextureDimension::D3);
    }

    #[test]
    fn array_layers_need_array_flag() {
        let mut desc =
            TextureDesc::new_2d(16, 16, Format::R8G8B8A8Unorm, TextureFlags::SHADER_RESOURCE);
        desc.array_layers = 6;
        assert_eq!(desc.layer_count(), 1);
        desc.flags |= TextureFlags::ARRAY;
        assert_eq!(desc.layer_count(), 6);
    }

    #[test]
    fn texture_validation() {
        let desc = TextureDesc::new_2d(256, 128, Format::R8G8B8A8Unorm, TextureFlags::empty());
        assert_eq!(desc.max_mip_levels(), 9);
        assert!(desc.validate().is_ok());

        let too_many_mips = TextureDesc {
            mip_levels: 10,
            ..desc
        };
        assert!(too_many_mips.validate().is_err());

        let empty = TextureDesc { width: 0, ..desc };
        assert!(empty.validate().is_err());

        let bad_depth = TextureDesc::new_2d(4, 4, Format::R8Unorm, TextureFlags::DEPTH_STENCIL);
        assert!(bad_depth.validate().is_err());
    }

    #[test]
    fn sampler_validation() {
        assert!(SamplerDesc::default().validate().is_ok());

        let bad_aniso = SamplerDesc {
            anisotropy_enable: true,
            max_anisotropy: 0.5,
            ..SamplerDesc::default()
        };
        assert!(bad_aniso.validate().is_err());

        let bad_lod = SamplerDesc {
            min_lod: 4.0,
            max_lod: 1.0,
            ..SamplerDesc::default()
        };
        assert!(bad_lod.validate().is_err());
    }

    #[test]
    fn spirv_words_are_little_endian() {
        let words = spirv_words(&[0x03, 0x02, 0x23, 0x07, 1, 0, 0, 0]).unwrap();
        assert_eq!(words, vec![0x0723_0203, 1]);
        assert!(spirv_words(&[1, 2, 3]).is_err());
    }

    #[test]
    fn shader_blobs_skip_empty_stages() {
        let desc = ShaderDesc {
            vertex: vec![0; 4],
            compute: vec![0; 8],
            ..ShaderDesc::default()
        };
        let stages: Vec<_> = desc.blobs().map(|(stage, _)| stage).collect();
        assert_eq!(stages, vec![ShaderStage::Vertex, ShaderStage::Compute]);
    }

    #[test]
    fn buffer_descriptors_validate() {
        assert!(GpuBufferDesc { size: 0 }.validate().is_err());
        assert!(VertexBufferDesc { size: 48, stride: 0 }.validate().is_err());
        let index = IndexBufferDesc {
            size: 12,
            format: Format::R32Float,
        };
        assert!(index.validate().is_err());
    }
}
