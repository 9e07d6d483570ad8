//! Vulkan realization of the Kiln render hardware interface.
//!
//! This crate provides:
//! - Instance, device and queue management
//! - Resources with dedicated device memory (buffers, textures, samplers)
//! - Render passes, framebuffers and graphics pipeline states
//! - Command buffer recording with descriptor and barrier handling
//! - Swap chain acquisition and presentation
//!
//! [`RenderDevice`] is the entry point; every resource is created through
//! it and keeps the shared [`GpuContext`] alive.

pub mod barrier;
pub mod buffer;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod fence;
pub mod framebuffer;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod texture;
pub mod translate;

pub use buffer::{GpuBuffer, IndexBuffer, VertexBuffer};
pub use command::CommandBuffer;
pub use context::{ContextDesc, GpuContext, SurfaceTarget};
pub use device::{back_buffer_pass_desc, DeviceBuilder, RenderDevice};
pub use error::{Result, RhiError};
pub use fence::{Fence, FenceStatus};
pub use framebuffer::Framebuffer;
pub use pipeline::{PipelineState, PipelineStateDesc};
pub use render_pass::RenderPass;
pub use sampler::Sampler;
pub use shader::Shader;
pub use surface::{Surface, SurfaceSupport};
pub use swapchain::{
    AcquireStatus, FrameRing, PresentStatus, SwapChain, SwapChainDesc, SWAP_CHAIN_FORMAT,
};
pub use texture::Texture;

pub use ash::vk;
pub use kiln_core as core;
