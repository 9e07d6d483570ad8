//! Backend-neutral contract of the Kiln render hardware interface.
//!
//! This crate provides:
//! - Error kinds shared by every backend
//! - Texel and attribute formats
//! - Fixed-function pipeline state
//! - Resource, render pass and binding-group descriptors
//! - The command buffer recording state machine
//!
//! Nothing here talks to a GPU; `kiln-gpu` realizes these descriptors
//! against Vulkan.

pub mod barrier;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod recording;
pub mod render_pass;
pub mod resource;
pub mod state;

pub use barrier::{AccessFlags, PipelineStages, ResourceState, Transition};
pub use error::{Result, RhiError};
pub use format::Format;
pub use pipeline::{
    BindingGroupLayout, BindingKind, BindingSlot, InputRate, PushConstantRange, VertexAttribute,
    VertexBufferLayout, VertexInputLayout,
};
pub use recording::{ActivePass, CommandState, RecordingState};
pub use render_pass::{
    validate_framebuffer, AttachmentDesc, AttachmentRef, FramebufferAttachment, LoadOp,
    RenderPassDesc, StoreOp, SubpassDependency, SubpassDesc, SubpassIndex,
};
pub use resource::{
    spirv_words, AddressMode, CommandListType, FilterMode, GpuBufferDesc, GpuResource,
    IndexBufferDesc, IndexType, MipmapMode, ResourceKind, SamplerDesc, ShaderDesc, ShaderStage,
    ShaderStages, SwapChainEffect, TextureDesc, TextureDimension, TextureFlags, VertexBufferDesc,
};
pub use state::{
    BlendFactor, BlendOp, BlendState, ColorWriteMask, CompareOp, CullMode, DepthStencilState,
    FillMode, MultisampleState, PrimitiveTopology, RasterizerState, Rect, RenderTargetBlend,
    StencilFaceState, StencilOp, Topology, Viewport, MAX_RENDER_TARGETS,
};

/// Clear color used when a pass is restarted implicitly by a pipeline change.
pub const PURPLE: [f32; 4] = [1.0, 0.0, 1.0, 1.0];
