//! Translation from neutral descriptors to Vulkan values.
//!
//! Every function is pure. Mappings over closed enums are total; the few
//! inputs that can fall outside the Vulkan domain (sample counts, reverse
//! format lookups) return an invalid-argument error.

use ash::vk;
use kiln_core::{
    AccessFlags, AddressMode, BindingKind, BlendFactor, BlendOp, BlendState, ColorWriteMask,
    CompareOp, CullMode, DepthStencilState, FillMode, FilterMode, Format, IndexType, InputRate,
    LoadOp, MipmapMode, PipelineStages, PrimitiveTopology, RasterizerState, ResourceState,
    RhiError, ShaderStage, ShaderStages, StencilFaceState, StencilOp, StoreOp, SwapChainEffect,
    Topology, MAX_RENDER_TARGETS,
};

use crate::error::Result;

pub const fn blend_factor(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
        BlendFactor::InvSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::InvSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DestAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::InvDestAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        BlendFactor::DestColor => vk::BlendFactor::DST_COLOR,
        BlendFactor::InvDestColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlphaSaturate => vk::BlendFactor::SRC_ALPHA_SATURATE,
        BlendFactor::BlendFactor => vk::BlendFactor::CONSTANT_COLOR,
        BlendFactor::InvBlendFactor => vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
        BlendFactor::Src1Color => vk::BlendFactor::SRC1_COLOR,
        BlendFactor::InvSrc1Color => vk::BlendFactor::ONE_MINUS_SRC1_COLOR,
        BlendFactor::Src1Alpha => vk::BlendFactor::SRC1_ALPHA,
        BlendFactor::InvSrc1Alpha => vk::BlendFactor::ONE_MINUS_SRC1_ALPHA,
    }
}

pub const fn blend_op(op: BlendOp) -> vk::BlendOp {
    match op {
        BlendOp::Add => vk::BlendOp::ADD,
        BlendOp::Subtract => vk::BlendOp::SUBTRACT,
        BlendOp::RevSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOp::Min => vk::BlendOp::MIN,
        BlendOp::Max => vk::BlendOp::MAX,
    }
}

pub const fn compare_op(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::Equal => vk::CompareOp::EQUAL,
        CompareOp::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Greater => vk::CompareOp::GREATER,
        CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareOp::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

pub const fn stencil_op(op: StencilOp) -> vk::StencilOp {
    match op {
        StencilOp::Keep => vk::StencilOp::KEEP,
        StencilOp::Zero => vk::StencilOp::ZERO,
        StencilOp::Replace => vk::StencilOp::REPLACE,
        StencilOp::IncrementSaturate => vk::StencilOp::INCREMENT_AND_CLAMP,
        StencilOp::DecrementSaturate => vk::StencilOp::DECREMENT_AND_CLAMP,
        StencilOp::Invert => vk::StencilOp::INVERT,
        StencilOp::IncrementWrap => vk::StencilOp::INCREMENT_AND_WRAP,
        StencilOp::DecrementWrap => vk::StencilOp::DECREMENT_AND_WRAP,
    }
}

pub const fn fill_mode(mode: FillMode) -> vk::PolygonMode {
    match mode {
        FillMode::Solid => vk::PolygonMode::FILL,
        FillMode::Wireframe => vk::PolygonMode::LINE,
        FillMode::Point => vk::PolygonMode::POINT,
    }
}

pub const fn cull_mode(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
        CullMode::FrontAndBack => vk::CullModeFlags::FRONT_AND_BACK,
    }
}

pub const fn front_face(counter_clockwise: bool) -> vk::FrontFace {
    if counter_clockwise {
        vk::FrontFace::COUNTER_CLOCKWISE
    } else {
        vk::FrontFace::CLOCKWISE
    }
}

pub const fn primitive_topology(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
        PrimitiveTopology::LineListWithAdjacency => {
            vk::PrimitiveTopology::LINE_LIST_WITH_ADJACENCY
        }
        PrimitiveTopology::LineStripWithAdjacency => {
            vk::PrimitiveTopology::LINE_STRIP_WITH_ADJACENCY
        }
        PrimitiveTopology::TriangleListWithAdjacency => {
            vk::PrimitiveTopology::TRIANGLE_LIST_WITH_ADJACENCY
        }
        PrimitiveTopology::TriangleStripWithAdjacency => {
            vk::PrimitiveTopology::TRIANGLE_STRIP_WITH_ADJACENCY
        }
        PrimitiveTopology::PatchList => vk::PrimitiveTopology::PATCH_LIST,
    }
}

/// Topology baked into the pipeline. Dynamic topology bakes a triangle list
/// that recording overrides.
pub const fn pipeline_topology(topology: Topology) -> vk::PrimitiveTopology {
    match topology {
        Topology::Static(t) => primitive_topology(t),
        Topology::Dynamic => vk::PrimitiveTopology::TRIANGLE_LIST,
    }
}

pub const fn format(format: Format) -> vk::Format {
    match format {
        Format::R8Unorm => vk::Format::R8_UNORM,
        Format::R8Snorm => vk::Format::R8_SNORM,
        Format::R8Uint => vk::Format::R8_UINT,
        Format::R8Sint => vk::Format::R8_SINT,
        Format::R8G8Unorm => vk::Format::R8G8_UNORM,
        Format::R8G8Uint => vk::Format::R8G8_UINT,
        Format::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
        Format::R8G8B8A8Srgb => vk::Format::R8G8B8A8_SRGB,
        Format::R8G8B8A8Snorm => vk::Format::R8G8B8A8_SNORM,
        Format::R8G8B8A8Uint => vk::Format::R8G8B8A8_UINT,
        Format::R8G8B8A8Sint => vk::Format::R8G8B8A8_SINT,
        Format::B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,
        Format::B8G8R8A8Srgb => vk::Format::B8G8R8A8_SRGB,
        Format::R10G10B10A2Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
        Format::R11G11B10Float => vk::Format::B10G11R11_UFLOAT_PACK32,
        Format::R16Unorm => vk::Format::R16_UNORM,
        Format::R16Uint => vk::Format::R16_UINT,
        Format::R16Sint => vk::Format::R16_SINT,
        Format::R16Float => vk::Format::R16_SFLOAT,
        Format::R16G16Uint => vk::Format::R16G16_UINT,
        Format::R16G16Float => vk::Format::R16G16_SFLOAT,
        Format::R16G16B16A16Unorm => vk::Format::R16G16B16A16_UNORM,
        Format::R16G16B16A16Uint => vk::Format::R16G16B16A16_UINT,
        Format::R16G16B16A16Float => vk::Format::R16G16B16A16_SFLOAT,
        Format::R32Uint => vk::Format::R32_UINT,
        Format::R32Sint => vk::Format::R32_SINT,
        Format::R32Float => vk::Format::R32_SFLOAT,
        Format::R32G32Uint => vk::Format::R32G32_UINT,
        Format::R32G32Sint => vk::Format::R32G32_SINT,
        Format::R32G32Float => vk::Format::R32G32_SFLOAT,
        Format::R32G32B32Uint => vk::Format::R32G32B32_UINT,
        Format::R32G32B32Sint => vk::Format::R32G32B32_SINT,
        Format::R32G32B32Float => vk::Format::R32G32B32_SFLOAT,
        Format::R32G32B32A32Uint => vk::Format::R32G32B32A32_UINT,
        Format::R32G32B32A32Sint => vk::Format::R32G32B32A32_SINT,
        Format::R32G32B32A32Float => vk::Format::R32G32B32A32_SFLOAT,
        Format::D16Unorm => vk::Format::D16_UNORM,
        Format::D32Float => vk::Format::D32_SFLOAT,
        Format::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
        Format::D32FloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

/// Reverse of [`format`].
pub fn format_from_vk(raw: vk::Format) -> Result<Format> {
    Format::ALL
        .into_iter()
        .find(|&f| format(f) == raw)
        .ok_or_else(|| RhiError::invalid(format!("{raw:?} has no neutral format")))
}

/// Image aspects a view of `format` covers.
pub fn aspect_mask(format: Format) -> vk::ImageAspectFlags {
    if format.has_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if format.has_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

pub const fn filter(mode: FilterMode) -> vk::Filter {
    match mode {
        FilterMode::Nearest => vk::Filter::NEAREST,
        FilterMode::Linear => vk::Filter::LINEAR,
    }
}

pub const fn mipmap_mode(mode: MipmapMode) -> vk::SamplerMipmapMode {
    match mode {
        MipmapMode::Nearest => vk::SamplerMipmapMode::NEAREST,
        MipmapMode::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

pub const fn address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::Wrap => vk::SamplerAddressMode::REPEAT,
        AddressMode::Mirror => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::Clamp => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::Border => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        AddressMode::MirrorOnce => vk::SamplerAddressMode::MIRROR_CLAMP_TO_EDGE,
    }
}

pub fn sample_count(count: u32) -> Result<vk::SampleCountFlags> {
    Ok(match count {
        1 => vk::SampleCountFlags::TYPE_1,
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        16 => vk::SampleCountFlags::TYPE_16,
        32 => vk::SampleCountFlags::TYPE_32,
        64 => vk::SampleCountFlags::TYPE_64,
        other => {
            return Err(RhiError::invalid(format!(
                "sample count {other} is not a power of two in 1..=64"
            )))
        }
    })
}

pub const fn load_op(op: LoadOp) -> vk::AttachmentLoadOp {
    match op {
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

pub const fn store_op(op: StoreOp) -> vk::AttachmentStoreOp {
    match op {
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
        StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

pub fn access_flags(access: AccessFlags) -> vk::AccessFlags {
    const TABLE: [(AccessFlags, vk::AccessFlags); 17] = [
        (
            AccessFlags::INDIRECT_COMMAND_READ,
            vk::AccessFlags::INDIRECT_COMMAND_READ,
        ),
        (AccessFlags::INDEX_READ, vk::AccessFlags::INDEX_READ),
        (
            AccessFlags::VERTEX_ATTRIBUTE_READ,
            vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
        ),
        (AccessFlags::UNIFORM_READ, vk::AccessFlags::UNIFORM_READ),
        (
            AccessFlags::INPUT_ATTACHMENT_READ,
            vk::AccessFlags::INPUT_ATTACHMENT_READ,
        ),
        (AccessFlags::SHADER_READ, vk::AccessFlags::SHADER_READ),
        (AccessFlags::SHADER_WRITE, vk::AccessFlags::SHADER_WRITE),
        (
            AccessFlags::COLOR_ATTACHMENT_READ,
            vk::AccessFlags::COLOR_ATTACHMENT_READ,
        ),
        (
            AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ),
        (
            AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
        ),
        (
            AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        (AccessFlags::TRANSFER_READ, vk::AccessFlags::TRANSFER_READ),
        (AccessFlags::TRANSFER_WRITE, vk::AccessFlags::TRANSFER_WRITE),
        (AccessFlags::HOST_READ, vk::AccessFlags::HOST_READ),
        (AccessFlags::HOST_WRITE, vk::AccessFlags::HOST_WRITE),
        (AccessFlags::MEMORY_READ, vk::AccessFlags::MEMORY_READ),
        (AccessFlags::MEMORY_WRITE, vk::AccessFlags::MEMORY_WRITE),
    ];

    TABLE
        .iter()
        .filter(|(neutral, _)| access.contains(*neutral))
        .fold(vk::AccessFlags::empty(), |acc, (_, raw)| acc | *raw)
}

pub fn pipeline_stages(stages: PipelineStages) -> vk::PipelineStageFlags {
    const TABLE: [(PipelineStages, vk::PipelineStageFlags); 14] = [
        (PipelineStages::TOP_OF_PIPE, vk::PipelineStageFlags::TOP_OF_PIPE),
        (
            PipelineStages::DRAW_INDIRECT,
            vk::PipelineStageFlags::DRAW_INDIRECT,
        ),
        (
            PipelineStages::VERTEX_INPUT,
            vk::PipelineStageFlags::VERTEX_INPUT,
        ),
        (
            PipelineStages::VERTEX_SHADER,
            vk::PipelineStageFlags::VERTEX_SHADER,
        ),
        (
            PipelineStages::FRAGMENT_SHADER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        (
            PipelineStages::EARLY_FRAGMENT_TESTS,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        ),
        (
            PipelineStages::LATE_FRAGMENT_TESTS,
            vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ),
        (
            PipelineStages::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        (
            PipelineStages::COMPUTE_SHADER,
            vk::PipelineStageFlags::COMPUTE_SHADER,
        ),
        (PipelineStages::TRANSFER, vk::PipelineStageFlags::TRANSFER),
        (
            PipelineStages::BOTTOM_OF_PIPE,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        ),
        (PipelineStages::HOST, vk::PipelineStageFlags::HOST),
        (
            PipelineStages::ALL_GRAPHICS,
            vk::PipelineStageFlags::ALL_GRAPHICS,
        ),
        (
            PipelineStages::ALL_COMMANDS,
            vk::PipelineStageFlags::ALL_COMMANDS,
        ),
    ];

    TABLE
        .iter()
        .filter(|(neutral, _)| stages.contains(*neutral))
        .fold(vk::PipelineStageFlags::empty(), |acc, (_, raw)| acc | *raw)
}

pub const fn image_layout(state: ResourceState) -> vk::ImageLayout {
    match state {
        ResourceState::Undefined => vk::ImageLayout::UNDEFINED,
        ResourceState::Common | ResourceState::UnorderedAccess => vk::ImageLayout::GENERAL,
        ResourceState::RenderTarget => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ResourceState::DepthWrite => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ResourceState::DepthRead => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        ResourceState::ShaderResource => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ResourceState::CopyDest => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ResourceState::CopySource => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ResourceState::Present => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

pub fn color_write_mask(mask: ColorWriteMask) -> vk::ColorComponentFlags {
    let mut flags = vk::ColorComponentFlags::empty();
    if mask.contains(ColorWriteMask::RED) {
        flags |= vk::ColorComponentFlags::R;
    }
    if mask.contains(ColorWriteMask::GREEN) {
        flags |= vk::ColorComponentFlags::G;
    }
    if mask.contains(ColorWriteMask::BLUE) {
        flags |= vk::ColorComponentFlags::B;
    }
    if mask.contains(ColorWriteMask::ALPHA) {
        flags |= vk::ColorComponentFlags::A;
    }
    flags
}

pub const fn present_mode(effect: SwapChainEffect) -> vk::PresentModeKHR {
    match effect {
        SwapChainEffect::Discard => vk::PresentModeKHR::IMMEDIATE,
        SwapChainEffect::Sequential => vk::PresentModeKHR::FIFO_RELAXED,
        SwapChainEffect::FlipSequential => vk::PresentModeKHR::FIFO,
        SwapChainEffect::FlipDiscard => vk::PresentModeKHR::MAILBOX,
    }
}

pub const fn shader_stage(stage: ShaderStage) -> vk::ShaderStageFlags {
    match stage {
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        ShaderStage::Mesh => vk::ShaderStageFlags::MESH_EXT,
    }
}

pub fn shader_stages(stages: ShaderStages) -> vk::ShaderStageFlags {
    ShaderStage::ALL
        .into_iter()
        .filter(|&stage| stages.contains(stage.into()))
        .fold(vk::ShaderStageFlags::empty(), |acc, stage| {
            acc | shader_stage(stage)
        })
}

pub const fn descriptor_type(kind: BindingKind) -> vk::DescriptorType {
    match kind {
        BindingKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        BindingKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        BindingKind::SampledTexture => vk::DescriptorType::SAMPLED_IMAGE,
        BindingKind::Sampler => vk::DescriptorType::SAMPLER,
        BindingKind::CombinedTextureSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        BindingKind::StorageTexture => vk::DescriptorType::STORAGE_IMAGE,
        BindingKind::InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT,
    }
}

pub const fn index_type(index: IndexType) -> vk::IndexType {
    match index {
        IndexType::U16 => vk::IndexType::UINT16,
        IndexType::U32 => vk::IndexType::UINT32,
    }
}

pub const fn input_rate(rate: InputRate) -> vk::VertexInputRate {
    match rate {
        InputRate::Vertex => vk::VertexInputRate::VERTEX,
        InputRate::Instance => vk::VertexInputRate::INSTANCE,
    }
}

/// Rasterizer state as a Vulkan create info.
pub fn rasterization_state(
    state: &RasterizerState,
) -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(!state.depth_clip_enable)
        .rasterizer_discard_enable(false)
        .polygon_mode(fill_mode(state.fill_mode))
        .cull_mode(cull_mode(state.cull_mode))
        .front_face(front_face(state.front_counter_clockwise))
        .depth_bias_enable(state.has_depth_bias())
        .depth_bias_constant_factor(state.depth_bias as f32)
        .depth_bias_clamp(state.depth_bias_clamp)
        .depth_bias_slope_factor(state.slope_scaled_depth_bias)
        .line_width(state.line_width)
}

fn stencil_face(face: &StencilFaceState, read_mask: u8, write_mask: u8) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: stencil_op(face.fail_op),
        pass_op: stencil_op(face.pass_op),
        depth_fail_op: stencil_op(face.depth_fail_op),
        compare_op: compare_op(face.compare),
        compare_mask: u32::from(read_mask),
        write_mask: u32::from(write_mask),
        reference: 0,
    }
}

/// Depth-stencil state as a Vulkan create info.
pub fn depth_stencil_state(
    state: &DepthStencilState,
) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
    vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(state.depth_enable)
        .depth_write_enable(state.depth_enable && state.depth_write)
        .depth_compare_op(compare_op(state.depth_compare))
        .depth_bounds_test_enable(false)
        .stencil_test_enable(state.stencil_enable)
        .front(stencil_face(
            &state.front,
            state.stencil_read_mask,
            state.stencil_write_mask,
        ))
        .back(stencil_face(
            &state.back,
            state.stencil_read_mask,
            state.stencil_write_mask,
        ))
        .min_depth_bounds(0.0)
        .max_depth_bounds(1.0)
}

/// Per-target blend attachments for `render_target_count` targets, clamped
/// to [`MAX_RENDER_TARGETS`].
pub fn color_blend_attachments(
    state: &BlendState,
    render_target_count: usize,
) -> Vec<vk::PipelineColorBlendAttachmentState> {
    (0..render_target_count.min(MAX_RENDER_TARGETS))
        .map(|i| {
            let target = state.target(i);
            vk::PipelineColorBlendAttachmentState::default()
                .blend_enable(target.is_enabled())
                .src_color_blend_factor(blend_factor(target.src_color))
                .dst_color_blend_factor(blend_factor(target.dst_color))
                .color_blend_op(blend_op(target.color_op))
                .src_alpha_blend_factor(blend_factor(target.src_alpha))
                .dst_alpha_blend_factor(blend_factor(target.dst_alpha))
                .alpha_blend_op(blend_op(target.alpha_op))
                .color_write_mask(color_write_mask(target.write_mask))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use kiln_core::RenderTargetBlend;

    #[test]
    fn format_round_trip() {
        for f in Format::ALL {
            let raw = format(f);
            assert_ne!(raw, vk::Format::UNDEFINED, "{f:?}");
            assert_eq!(format_from_vk(raw), Ok(f));
        }
    }

    #[test]
    fn unknown_backend_format_is_invalid() {
        let err = format_from_vk(vk::Format::BC7_UNORM_BLOCK).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(format_from_vk(vk::Format::UNDEFINED).is_err());
    }

    #[test]
    fn sample_count_domain() {
        assert_eq!(sample_count(1), Ok(vk::SampleCountFlags::TYPE_1));
        assert_eq!(sample_count(8), Ok(vk::SampleCountFlags::TYPE_8));
        assert!(sample_count(0).is_err());
        assert!(sample_count(3).is_err());
        assert!(sample_count(128).is_err());
    }

    #[test]
    fn present_states_map_to_layouts() {
        assert_eq!(
            image_layout(ResourceState::RenderTarget),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        assert_eq!(
            image_layout(ResourceState::Present),
            vk::ImageLayout::PRESENT_SRC_KHR
        );
        assert_eq!(
            image_layout(ResourceState::CopyDest),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        );
    }

    #[test]
    fn flag_sets_translate_bit_by_bit() {
        let stages = PipelineStages::COLOR_ATTACHMENT_OUTPUT | PipelineStages::FRAGMENT_SHADER;
        assert_eq!(
            pipeline_stages(stages),
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::FRAGMENT_SHADER
        );
        assert_eq!(access_flags(AccessFlags::empty()), vk::AccessFlags::empty());
        assert_eq!(
            access_flags(AccessFlags::SHADER_READ | AccessFlags::TRANSFER_WRITE),
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::TRANSFER_WRITE
        );
        assert_eq!(
            shader_stages(ShaderStages::ALL_GRAPHICS),
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(
            color_write_mask(ColorWriteMask::ALL),
            vk::ColorComponentFlags::RGBA
        );
    }

    #[test]
    fn swap_chain_effects() {
        assert_eq!(
            present_mode(SwapChainEffect::FlipSequential),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            present_mode(SwapChainEffect::FlipDiscard),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn dynamic_topology_bakes_triangle_list() {
        assert_eq!(
            pipeline_topology(Topology::Dynamic),
            vk::PrimitiveTopology::TRIANGLE_LIST
        );
        assert_eq!(
            pipeline_topology(Topology::Static(PrimitiveTopology::LineStrip)),
            vk::PrimitiveTopology::LINE_STRIP
        );
    }

    #[test]
    fn rasterizer_aggregate() {
        let state = RasterizerState {
            fill_mode: FillMode::Wireframe,
            cull_mode: CullMode::None,
            front_counter_clockwise: true,
            depth_bias: 4,
            slope_scaled_depth_bias: 1.25,
            depth_clip_enable: false,
            ..RasterizerState::default()
        };
        let info = rasterization_state(&state);
        assert_eq!(info.polygon_mode, vk::PolygonMode::LINE);
        assert_eq!(info.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(info.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
        assert_eq!(info.depth_bias_enable, vk::TRUE);
        assert_eq!(info.depth_clamp_enable, vk::TRUE);
        assert_relative_eq!(info.depth_bias_constant_factor, 4.0);
        assert_relative_eq!(info.depth_bias_slope_factor, 1.25);
        assert_relative_eq!(info.line_width, 1.0);
    }

    #[test]
    fn depth_write_requires_depth_test() {
        let state = DepthStencilState {
            depth_enable: false,
            depth_write: true,
            ..DepthStencilState::default()
        };
        let info = depth_stencil_state(&state);
        assert_eq!(info.depth_test_enable, vk::FALSE);
        assert_eq!(info.depth_write_enable, vk::FALSE);

        let info = depth_stencil_state(&DepthStencilState::default());
        assert_eq!(info.depth_compare_op, vk::CompareOp::LESS);
        assert_eq!(info.front.compare_mask, 0xff);
    }

    #[test]
    fn blend_attachments_are_clamped_and_derive_enable() {
        let mut state = BlendState {
            independent_blend: true,
            ..BlendState::default()
        };
        state.render_targets[1] = RenderTargetBlend::alpha_blending();

        let attachments = color_blend_attachments(&state, 12);
        assert_eq!(attachments.len(), MAX_RENDER_TARGETS);
        assert_eq!(attachments[0].blend_enable, vk::FALSE);
        assert_eq!(attachments[1].blend_enable, vk::TRUE);
        assert_eq!(
            attachments[1].src_color_blend_factor,
            vk::BlendFactor::SRC_ALPHA
        );
        assert_eq!(
            attachments[1].dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );

        assert_eq!(color_blend_attachments(&state, 2).len(), 2);
    }

    #[test]
    fn aspect_follows_format_class() {
        assert_eq!(
            aspect_mask(Format::B8G8R8A8Unorm),
            vk::ImageAspectFlags::COLOR
        );
        assert_eq!(aspect_mask(Format::D32Float), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspect_mask(Format::D24UnormS8Uint),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }
}
