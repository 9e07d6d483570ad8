//! The render device: lifecycle, frame pacing and resource factories.

use crate::buffer::{GpuBuffer, IndexBuffer, VertexBuffer};
use crate::command::CommandBuffer;
use crate::context::{ContextDesc, GpuContext, SurfaceTarget};
use crate::error::{Result, RhiError, VkResultExt};
use crate::fence::{Fence, FenceStatus};
use crate::framebuffer::Framebuffer;
use crate::memory;
use crate::pipeline::{PipelineState, PipelineStateDesc};
use crate::render_pass::RenderPass;
use crate::sampler::Sampler;
use crate::shader::Shader;
use crate::surface::Surface;
use crate::swapchain::{AcquireStatus, SwapChain, SwapChainDesc, SWAP_CHAIN_FORMAT};
use crate::texture::Texture;
use ash::vk;
use kiln_core::{
    CommandListType, GpuBufferDesc, GpuResource, IndexBufferDesc, RenderPassDesc, ResourceState,
    SamplerDesc, ShaderDesc, SwapChainEffect, TextureDesc, VertexBufferDesc,
};
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

/// Configuration of a [`RenderDevice`].
#[derive(Debug, Clone)]
pub struct DeviceBuilder {
    app_name: String,
    enable_validation: bool,
    frame_count: u32,
    width: u32,
    height: u32,
    effect: SwapChainEffect,
}

impl Default for DeviceBuilder {
    fn default() -> Self {
        Self {
            app_name: "Kiln".to_string(),
            enable_validation: cfg!(debug_assertions),
            frame_count: 2,
            width: 1280,
            height: 720,
            effect: SwapChainEffect::default(),
        }
    }
}

impl DeviceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable the Khronos validation layer. On by default in debug builds.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Requested swap-chain image count.
    pub fn frame_count(mut self, count: u32) -> Self {
        self.frame_count = count;
        self
    }

    /// Initial swap-chain extent.
    pub fn extent(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn effect(mut self, effect: SwapChainEffect) -> Self {
        self.effect = effect;
        self
    }

    fn context_desc(&self, target: Option<SurfaceTarget>) -> ContextDesc {
        ContextDesc {
            app_name: self.app_name.clone(),
            enable_validation: self.enable_validation,
            target,
        }
    }

    /// A device without surface or swap chain, for off-screen work.
    pub fn build_headless(self) -> Result<RenderDevice> {
        let (ctx, _) = GpuContext::new(&self.context_desc(None))?;
        tracing::info!("Headless render device ready");
        Ok(RenderDevice {
            swap_chain: None,
            back_buffer_pass: None,
            surface: None,
            ctx: Arc::new(ctx),
        })
    }

    /// A device presenting to `window`.
    pub fn build_with_window<W>(self, window: &W) -> Result<RenderDevice>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window.display_handle().map_err(|e| RhiError::CreationFailed {
            what: "surface",
            reason: format!("display handle unavailable: {e}"),
        })?;
        let handle = window.window_handle().map_err(|e| RhiError::CreationFailed {
            what: "surface",
            reason: format!("window handle unavailable: {e}"),
        })?;
        let target = SurfaceTarget {
            display: display.as_raw(),
            window: handle.as_raw(),
        };

        let (ctx, surface) = GpuContext::new(&self.context_desc(Some(target)))?;
        let ctx = Arc::new(ctx);
        let surface = surface.ok_or_else(|| RhiError::CreationFailed {
            what: "surface",
            reason: "context returned no surface".to_string(),
        })?;
        let surface = Arc::new(Surface::new(Arc::clone(&ctx), surface));

        let back_buffer_pass = Arc::new(RenderPass::new(
            Arc::clone(&ctx),
            &back_buffer_pass_desc(),
        )?);
        let swap_chain = SwapChain::new(
            Arc::clone(&ctx),
            Arc::clone(&surface),
            Arc::clone(&back_buffer_pass),
            &SwapChainDesc {
                frame_count: self.frame_count,
                width: self.width,
                height: self.height,
                effect: self.effect,
            },
        )?;

        tracing::info!(
            frames = swap_chain.frame_count(),
            "Render device ready on {}",
            ctx.device_name()
        );
        Ok(RenderDevice {
            swap_chain: Some(Arc::new(Mutex::new(swap_chain))),
            back_buffer_pass: Some(back_buffer_pass),
            surface: Some(surface),
            ctx,
        })
    }
}

/// Render pass the swap-chain framebuffers are built with. The image is
/// cleared and left as a render target; the frame's last barrier moves it to
/// the present state.
pub fn back_buffer_pass_desc() -> RenderPassDesc {
    RenderPassDesc::single_color(
        SWAP_CHAIN_FORMAT,
        ResourceState::Undefined,
        ResourceState::RenderTarget,
    )
}

/// Owns the GPU context and, when windowed, the surface and swap chain.
///
/// Fields drop in declaration order: the swap chain goes before the pass its
/// framebuffers use, then the surface, then the context.
pub struct RenderDevice {
    swap_chain: Option<Arc<Mutex<SwapChain>>>,
    back_buffer_pass: Option<Arc<RenderPass>>,
    surface: Option<Arc<Surface>>,
    ctx: Arc<GpuContext>,
}

impl RenderDevice {
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::default()
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    pub fn device_name(&self) -> &str {
        self.ctx.device_name()
    }

    pub fn swap_chain(&self) -> Option<&Arc<Mutex<SwapChain>>> {
        self.swap_chain.as_ref()
    }

    /// Render pass of the swap-chain framebuffers.
    pub fn back_buffer_pass(&self) -> Option<&Arc<RenderPass>> {
        self.back_buffer_pass.as_ref()
    }

    /// Frames in flight; 1 without a swap chain.
    pub fn frame_count(&self) -> usize {
        self.swap_chain
            .as_ref()
            .map_or(1, |swap_chain| swap_chain.lock().frame_count())
    }

    pub fn frame_index(&self) -> usize {
        self.swap_chain
            .as_ref()
            .map_or(0, |swap_chain| swap_chain.lock().frame_index())
    }

    /// Memory type index allowed by `type_filter` with `required` properties.
    pub fn find_memory_type(&self, type_filter: u32, required: vk::MemoryPropertyFlags) -> Result<u32> {
        memory::find_memory_type(self.ctx.memory_properties(), type_filter, required)
    }

    pub fn create_fence(&self, signaled: bool) -> Result<Fence> {
        Fence::new(Arc::clone(&self.ctx), signaled)
    }

    pub fn create_shader(&self, desc: &ShaderDesc) -> Result<Arc<Shader>> {
        Shader::new(Arc::clone(&self.ctx), desc).map(Arc::new)
    }

    pub fn create_sampler(&self, desc: &SamplerDesc) -> Result<Sampler> {
        Sampler::new(Arc::clone(&self.ctx), desc)
    }

    pub fn create_gpu_buffer(&self, desc: &GpuBufferDesc) -> Result<GpuBuffer> {
        GpuBuffer::new(Arc::clone(&self.ctx), desc)
    }

    pub fn create_vertex_buffer(&self, desc: &VertexBufferDesc) -> Result<VertexBuffer> {
        VertexBuffer::new(Arc::clone(&self.ctx), desc)
    }

    pub fn create_index_buffer(&self, desc: &IndexBufferDesc) -> Result<IndexBuffer> {
        IndexBuffer::new(Arc::clone(&self.ctx), desc)
    }

    pub fn create_texture(&self, desc: &TextureDesc) -> Result<Texture> {
        Texture::new(Arc::clone(&self.ctx), desc)
    }

    pub fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<Arc<RenderPass>> {
        RenderPass::new(Arc::clone(&self.ctx), desc).map(Arc::new)
    }

    pub fn create_framebuffer(
        &self,
        render_pass: &Arc<RenderPass>,
        attachments: &[&Texture],
    ) -> Result<Arc<Framebuffer>> {
        Framebuffer::new(Arc::clone(&self.ctx), Arc::clone(render_pass), attachments).map(Arc::new)
    }

    pub fn create_pipeline_state(&self, desc: &PipelineStateDesc) -> Result<Arc<PipelineState>> {
        PipelineState::new(Arc::clone(&self.ctx), desc).map(Arc::new)
    }

    /// A command buffer that can present to this device's swap chain.
    pub fn create_command_buffer(&self, list_type: CommandListType) -> Result<CommandBuffer> {
        CommandBuffer::new(Arc::clone(&self.ctx), list_type, self.swap_chain.clone())
    }

    /// Submit a closed command buffer, signaling `fence` on completion.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn submit(&self, command_buffer: &CommandBuffer, fence: Option<&Fence>) -> Result<()> {
        let cmd = command_buffer.submittable("submit")?;
        let fence = match fence {
            Some(fence) if !fence.is_live() => {
                return Err(RhiError::invalid("submit with a destroyed fence"));
            }
            Some(fence) => fence.handle(),
            None => vk::Fence::null(),
        };
        let cmds = [cmd];
        let submit_info = vk::SubmitInfo::default().command_buffers(&cmds);
        let queue = self.ctx.queue().lock();
        unsafe {
            self.ctx
                .device()
                .queue_submit(*queue, &[submit_info], fence)
        }
        .or_rhi("queue submit")
    }

    /// Block until all submitted work completed.
    pub fn wait_gpu(&self) -> Result<()> {
        self.ctx.wait_idle()
    }

    /// Acquire the swap-chain image the next frame renders into.
    pub fn acquire_next_image(&self) -> Result<AcquireStatus> {
        self.windowed("acquire_next_image")?.lock().acquire_next_image()
    }

    /// Wait until the current frame's previous submission completed, so its
    /// command buffer and semaphores can be reused. Presenting advances the
    /// frame index; without a swap chain this waits for the whole queue.
    pub fn move_to_next_frame(&self) -> Result<()> {
        match &self.swap_chain {
            Some(swap_chain) => match swap_chain.lock().wait_current_frame(u64::MAX)? {
                FenceStatus::Signaled => Ok(()),
                FenceStatus::Timeout => Err(RhiError::Timeout("frame fence".to_string())),
            },
            None => self.wait_gpu(),
        }
    }

    /// Rebuild the swap chain for a new window size.
    pub fn resize(&self, width: u32, height: u32) -> Result<()> {
        self.windowed("resize")?.lock().resize(width, height)
    }

    fn windowed(&self, op: &str) -> Result<&Arc<Mutex<SwapChain>>> {
        self.swap_chain
            .as_ref()
            .ok_or_else(|| RhiError::invalid(format!("{op} on a headless device")))
    }

    /// Wait for the GPU, then release the swap chain, its render pass and
    /// the surface. The context goes once the last resource drops.
    pub fn shutdown(&mut self) {
        if let Err(err) = self.wait_gpu() {
            tracing::warn!("Wait before shutdown failed: {err}");
        }
        if let Some(swap_chain) = self.swap_chain.take() {
            swap_chain.lock().destroy();
        }
        self.back_buffer_pass = None;
        self.surface = None;
        tracing::info!("Render device shut down");
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::{self, DescriptorPool};
    use crate::swapchain::PresentStatus;
    use kiln_core::{
        BindingGroupLayout, BindingKind, BindingSlot, Format, PrimitiveTopology, Rect,
        RecordingState, ShaderStages, TextureFlags, Topology, Transition, Viewport, PURPLE,
    };

    const CLEAR: [f32; 4] = [0.1, 0.2, 0.3, 1.0];

    fn headless() -> RenderDevice {
        DeviceBuilder::new()
            .app_name("kiln-gpu tests")
            .validation(false)
            .build_headless()
            .unwrap()
    }

    /// SPIR-V of an empty `main` for an execution model (0 vertex, 4 fragment).
    fn empty_stage(model: u32) -> Vec<u8> {
        let mut words = vec![
            0x0723_0203, 0x0001_0000, 0, 5, 0,
            0x0002_0011, 1, // OpCapability Shader
            0x0003_000E, 0, 1, // OpMemoryModel Logical GLSL450
            0x0005_000F, model, 1, 0x6E69_616D, 0, // OpEntryPoint %1 "main"
        ];
        if model == 4 {
            words.extend([0x0003_0010, 1, 7]); // OpExecutionMode %1 OriginUpperLeft
        }
        words.extend([
            0x0002_0013, 2, // OpTypeVoid %2
            0x0003_0021, 3, 2, // OpTypeFunction %3 %2
            0x0005_0036, 2, 1, 0, 3, // OpFunction %1
            0x0002_00F8, 4, // OpLabel %4
            0x0001_00FD, // OpReturn
            0x0001_0038, // OpFunctionEnd
        ]);
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    fn empty_shader(device: &RenderDevice) -> Arc<Shader> {
        device
            .create_shader(&ShaderDesc {
                vertex: empty_stage(0),
                fragment: empty_stage(4),
                ..ShaderDesc::default()
            })
            .unwrap()
    }

    fn color_pass(device: &RenderDevice, subpasses: usize) -> Arc<RenderPass> {
        let mut desc = RenderPassDesc::single_color(
            Format::R8G8B8A8Unorm,
            ResourceState::Undefined,
            ResourceState::ShaderResource,
        );
        while desc.subpasses.len() < subpasses {
            desc.subpasses.push(desc.subpasses[0].clone());
        }
        device.create_render_pass(&desc).unwrap()
    }

    fn color_target(device: &RenderDevice, size: u32, format: Format) -> Texture {
        device
            .create_texture(&TextureDesc::new_2d(
                size,
                size,
                format,
                TextureFlags::RENDER_TARGET,
            ))
            .unwrap()
    }

    fn pipeline_for(
        device: &RenderDevice,
        render_pass: &Arc<RenderPass>,
        configure: impl FnOnce(&mut PipelineStateDesc),
    ) -> Arc<PipelineState> {
        let mut desc = PipelineStateDesc::new(empty_shader(device), Arc::clone(render_pass));
        desc.rasterizer.cull_mode = kiln_core::CullMode::None;
        configure(&mut desc);
        device.create_pipeline_state(&desc).unwrap()
    }

    fn submit_and_wait(device: &RenderDevice, cmd: &CommandBuffer) {
        let fence = device.create_fence(false).unwrap();
        device.submit(cmd, Some(&fence)).unwrap();
        assert_eq!(fence.wait(u64::MAX).unwrap(), FenceStatus::Signaled);
    }

    #[test]
    fn builder_defaults() {
        let builder = DeviceBuilder::default();
        assert_eq!(builder.frame_count, 2);
        assert_eq!(builder.enable_validation, cfg!(debug_assertions));
        assert_eq!(builder.effect, SwapChainEffect::FlipSequential);

        let builder = builder.frame_count(3).extent(800, 600).validation(true);
        assert_eq!((builder.width, builder.height), (800, 600));
        assert_eq!(builder.frame_count, 3);
        assert!(builder.enable_validation);
    }

    #[test]
    fn back_buffer_pass_ends_as_render_target() {
        let desc = back_buffer_pass_desc();
        assert_eq!(desc.attachments.len(), 1);
        assert_eq!(desc.attachments[0].format, Format::B8G8R8A8Unorm);
        assert_eq!(desc.attachments[0].final_state, ResourceState::RenderTarget);
        assert!(desc.validate().is_ok());
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn fence_roundtrip() {
        let device = headless();
        let fence = device.create_fence(false).unwrap();
        assert!(!fence.is_signaled().unwrap());
        assert_eq!(fence.wait(0).unwrap(), FenceStatus::Timeout);

        let mut cmd = device.create_command_buffer(CommandListType::Direct).unwrap();
        cmd.begin().unwrap();
        cmd.close().unwrap();
        device.submit(&cmd, Some(&fence)).unwrap();
        assert_eq!(fence.wait(u64::MAX).unwrap(), FenceStatus::Signaled);

        fence.reset().unwrap();
        assert!(!fence.is_signaled().unwrap());
        fence.reset().unwrap();
        assert!(!fence.is_signaled().unwrap());
        assert_eq!(fence.wait(0).unwrap(), FenceStatus::Timeout);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn rearm_refuses_unsignaled_fence_and_signal_restores_it() {
        let device = headless();
        let fence = device.create_fence(false).unwrap();
        assert!(fence.rearm().unwrap_err().is_invalid_argument());

        device.context().signal_fence(fence.handle()).unwrap();
        assert_eq!(fence.wait(u64::MAX).unwrap(), FenceStatus::Signaled);
        fence.rearm().unwrap();
        assert!(!fence.is_signaled().unwrap());
        assert!(fence.rearm().unwrap_err().is_invalid_argument());

        let mut cmd = device.create_command_buffer(CommandListType::Direct).unwrap();
        cmd.begin().unwrap();
        cmd.close().unwrap();
        device.submit(&cmd, Some(&fence)).unwrap();
        assert_eq!(fence.wait(u64::MAX).unwrap(), FenceStatus::Signaled);
        fence.rearm().unwrap();
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn vertex_buffer_update_reads_back() {
        let device = headless();
        let buffer = device
            .create_vertex_buffer(&VertexBufferDesc {
                size: 48,
                stride: 12,
            })
            .unwrap();
        let bytes: Vec<u8> = (0..48).collect();
        buffer.update(&bytes).unwrap();
        assert_eq!(buffer.read().unwrap(), bytes);
        assert_eq!(buffer.vertex_count(), 4);
        assert!(buffer.update(&[0; 49]).unwrap_err().is_invalid_argument());
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn framebuffer_must_match_render_pass() {
        let device = headless();
        let mut desc = RenderPassDesc::single_color(
            Format::R8G8B8A8Unorm,
            ResourceState::Undefined,
            ResourceState::ShaderResource,
        );
        desc.attachments.push(desc.attachments[0]);
        let render_pass = device.create_render_pass(&desc).unwrap();
        let target = device
            .create_texture(&TextureDesc::new_2d(
                64,
                64,
                Format::R8G8B8A8Unorm,
                TextureFlags::RENDER_TARGET,
            ))
            .unwrap();
        let err = device
            .create_framebuffer(&render_pass, &[&target])
            .unwrap_err();
        assert!(err.is_invalid_argument());

        let small = color_target(&device, 32, Format::R8G8B8A8Unorm);
        let err = device
            .create_framebuffer(&render_pass, &[&target, &small])
            .unwrap_err();
        assert!(err.is_invalid_argument());

        let single = color_pass(&device, 1);
        let wrong_format = color_target(&device, 64, Format::B8G8R8A8Unorm);
        let err = device
            .create_framebuffer(&single, &[&wrong_format])
            .unwrap_err();
        assert!(err.is_invalid_argument());

        let second = color_target(&device, 64, Format::R8G8B8A8Unorm);
        let framebuffer = device
            .create_framebuffer(&render_pass, &[&target, &second])
            .unwrap();
        assert_eq!((framebuffer.width(), framebuffer.height()), (64, 64));
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn destroy_is_idempotent() {
        let device = headless();
        let mut buffer = device
            .create_gpu_buffer(&GpuBufferDesc { size: 256 })
            .unwrap();
        assert!(buffer.is_live());
        buffer.destroy();
        assert!(!buffer.is_live());
        assert_eq!(buffer.handle(), vk::Buffer::null());
        buffer.destroy();
        assert!(buffer.update(&[1, 2, 3]).unwrap_err().is_invalid_argument());

        let mut fence = device.create_fence(true).unwrap();
        fence.destroy();
        fence.destroy();
        assert!(fence.wait(0).unwrap_err().is_invalid_argument());
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn command_buffer_lifecycle() {
        let device = headless();
        let mut cmd = device.create_command_buffer(CommandListType::Direct).unwrap();
        assert!(cmd.close().unwrap_err().is_invalid_argument());
        assert!(device.submit(&cmd, None).unwrap_err().is_invalid_argument());

        cmd.begin().unwrap();
        assert!(cmd.begin().unwrap_err().is_invalid_argument());
        assert!(cmd
            .set_topology(kiln_core::PrimitiveTopology::LineList)
            .unwrap_err()
            .is_invalid_argument());
        cmd.close().unwrap();
        assert!(cmd.end_render_pass().unwrap_err().is_invalid_argument());

        cmd.reset(None).unwrap();
        cmd.close().unwrap();
        device.submit(&cmd, None).unwrap();
        device.wait_gpu().unwrap();
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn texture_upload_and_barrier() {
        let device = headless();
        let texture = device
            .create_texture(&TextureDesc::new_2d(
                4,
                4,
                Format::R8G8B8A8Unorm,
                TextureFlags::SHADER_RESOURCE | TextureFlags::COPY_DST,
            ))
            .unwrap();
        assert_eq!(texture.state(), ResourceState::Undefined);
        texture.upload(&[255; 64]).unwrap();
        assert_eq!(texture.state(), ResourceState::ShaderResource);
        assert!(texture.upload(&[0; 10]).unwrap_err().is_invalid_argument());

        let mut cmd = device.create_command_buffer(CommandListType::Direct).unwrap();
        cmd.begin().unwrap();
        cmd.resource_barrier(&texture, ResourceState::CopyDest).unwrap();
        cmd.resource_barrier(&texture, ResourceState::ShaderResource)
            .unwrap();
        cmd.close().unwrap();
        let fence = device.create_fence(false).unwrap();
        device.submit(&cmd, Some(&fence)).unwrap();
        assert_eq!(fence.wait(u64::MAX).unwrap(), FenceStatus::Signaled);
        assert_eq!(texture.state(), ResourceState::ShaderResource);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn headless_device_rejects_presentation() {
        let device = headless();
        assert!(device.swap_chain().is_none());
        assert_eq!(device.frame_count(), 1);
        assert!(device
            .acquire_next_image()
            .unwrap_err()
            .is_invalid_argument());
        assert!(device.resize(1024, 768).unwrap_err().is_invalid_argument());
        device.move_to_next_frame().unwrap();
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn pipeline_bound_before_pass_takes_framebuffer_extent() {
        let device = headless();
        let render_pass = color_pass(&device, 1);
        let target = color_target(&device, 64, Format::R8G8B8A8Unorm);
        let framebuffer = device.create_framebuffer(&render_pass, &[&target]).unwrap();
        let pipeline = pipeline_for(&device, &render_pass, |_| {});

        let mut cmd = device.create_command_buffer(CommandListType::Direct).unwrap();
        cmd.begin().unwrap();
        cmd.set_pipeline_state(&pipeline).unwrap();
        assert_eq!(cmd.current_viewport(), None);
        assert!(cmd.draw_instanced(3, 1, 0, 0).unwrap_err().is_invalid_argument());

        cmd.begin_render_pass(&render_pass, &framebuffer, &[CLEAR]).unwrap();
        assert_eq!(cmd.current_viewport(), Some(Viewport::from_size(64, 64)));
        assert_eq!(cmd.current_scissor(), Some(Rect::from_size(64, 64)));
        cmd.draw_instanced(3, 1, 0, 0).unwrap();
        cmd.end_render_pass().unwrap();
        cmd.close().unwrap();
        submit_and_wait(&device, &cmd);

        cmd.reset(Some(&pipeline)).unwrap();
        assert_eq!(cmd.current_viewport(), None);
        cmd.begin_render_pass(&render_pass, &framebuffer, &[CLEAR]).unwrap();
        assert_eq!(cmd.current_viewport(), Some(Viewport::from_size(64, 64)));
        cmd.draw_instanced(3, 1, 0, 0).unwrap();
        cmd.end_render_pass().unwrap();
        cmd.close().unwrap();
        submit_and_wait(&device, &cmd);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn dynamic_topology_pipeline_accepts_set_topology() {
        let device = headless();
        let render_pass = color_pass(&device, 1);
        let target = color_target(&device, 16, Format::R8G8B8A8Unorm);
        let framebuffer = device.create_framebuffer(&render_pass, &[&target]).unwrap();
        let dynamic = pipeline_for(&device, &render_pass, |desc| {
            desc.topology = Topology::Dynamic;
        });
        let fixed = pipeline_for(&device, &render_pass, |_| {});

        let mut cmd = device.create_command_buffer(CommandListType::Direct).unwrap();
        cmd.begin().unwrap();
        cmd.begin_render_pass(&render_pass, &framebuffer, &[CLEAR]).unwrap();
        cmd.set_pipeline_state(&fixed).unwrap();
        assert!(cmd
            .set_topology(PrimitiveTopology::LineList)
            .unwrap_err()
            .is_invalid_argument());
        cmd.set_pipeline_state(&dynamic).unwrap();
        cmd.set_topology(PrimitiveTopology::TriangleStrip).unwrap();
        cmd.draw_instanced(4, 1, 0, 0).unwrap();
        cmd.set_topology(PrimitiveTopology::TriangleList).unwrap();
        cmd.draw_instanced(3, 1, 0, 0).unwrap();
        cmd.end_render_pass().unwrap();
        cmd.close().unwrap();
        submit_and_wait(&device, &cmd);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn foreign_pipeline_restarts_pass_cleared_purple() {
        let device = headless();
        let pass_a = color_pass(&device, 1);
        let pass_b = color_pass(&device, 1);
        let target = color_target(&device, 32, Format::R8G8B8A8Unorm);
        let framebuffer = device.create_framebuffer(&pass_a, &[&target]).unwrap();
        let pipeline = pipeline_for(&device, &pass_b, |_| {});

        let mut cmd = device.create_command_buffer(CommandListType::Direct).unwrap();
        cmd.begin().unwrap();
        cmd.begin_render_pass(&pass_a, &framebuffer, &[CLEAR]).unwrap();
        assert!(Arc::ptr_eq(&cmd.active_render_pass().unwrap(), &pass_a));

        cmd.set_pipeline_state(&pipeline).unwrap();
        assert!(Arc::ptr_eq(&cmd.active_render_pass().unwrap(), &pass_b));
        let values = cmd.pass_clear_values();
        assert_eq!(values.len(), 1);
        assert_eq!(unsafe { values[0].color.float32 }, PURPLE);
        cmd.draw_instanced(3, 1, 0, 0).unwrap();
        cmd.end_render_pass().unwrap();
        assert!(cmd.active_render_pass().is_none());
        cmd.close().unwrap();
        submit_and_wait(&device, &cmd);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn subpass_reentry_keeps_begin_clear_values() {
        let device = headless();
        let render_pass = color_pass(&device, 2);
        let target = color_target(&device, 16, Format::R8G8B8A8Unorm);
        let framebuffer = device.create_framebuffer(&render_pass, &[&target]).unwrap();

        let mut cmd = device.create_command_buffer(CommandListType::Direct).unwrap();
        cmd.begin().unwrap();
        cmd.begin_render_pass_at(&render_pass, &framebuffer, &[CLEAR], 1)
            .unwrap();
        assert_eq!(cmd.state().active_pass().unwrap().subpass, 1);

        cmd.set_subpass_index(0).unwrap();
        assert_eq!(cmd.state().active_pass().unwrap().subpass, 0);
        assert!(Arc::ptr_eq(&cmd.active_render_pass().unwrap(), &render_pass));
        let values = cmd.pass_clear_values();
        assert_eq!(values.len(), 1);
        assert_eq!(unsafe { values[0].color.float32 }, CLEAR);

        cmd.set_subpass_index(1).unwrap();
        assert!(cmd.set_subpass_index(2).unwrap_err().is_invalid_argument());
        cmd.end_render_pass().unwrap();
        cmd.close().unwrap();
        submit_and_wait(&device, &cmd);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn every_declared_binding_must_be_set_before_drawing() {
        let device = headless();
        let render_pass = color_pass(&device, 1);
        let target = color_target(&device, 16, Format::R8G8B8A8Unorm);
        let framebuffer = device.create_framebuffer(&render_pass, &[&target]).unwrap();
        let pipeline = pipeline_for(&device, &render_pass, |desc| {
            desc.binding_groups = vec![BindingGroupLayout {
                slots: vec![
                    BindingSlot::new(0, BindingKind::Sampler, ShaderStages::FRAGMENT),
                    BindingSlot::new(1, BindingKind::UniformBuffer, ShaderStages::VERTEX),
                ],
            }];
        });
        let sampler = device.create_sampler(&SamplerDesc::default()).unwrap();
        let uniforms = device
            .create_gpu_buffer(&GpuBufferDesc { size: 64 })
            .unwrap();

        let mut cmd = device.create_command_buffer(CommandListType::Direct).unwrap();
        cmd.begin().unwrap();
        cmd.begin_render_pass(&render_pass, &framebuffer, &[CLEAR]).unwrap();
        cmd.set_pipeline_state(&pipeline).unwrap();
        cmd.set_sampler(0, 0, &sampler).unwrap();
        assert!(cmd
            .set_sampler(0, 1, &sampler)
            .unwrap_err()
            .is_invalid_argument());
        assert!(cmd.draw_instanced(3, 1, 0, 0).unwrap_err().is_invalid_argument());

        cmd.set_gpu_buffer(0, 1, &uniforms).unwrap();
        cmd.draw_instanced(3, 1, 0, 0).unwrap();
        cmd.end_render_pass().unwrap();
        cmd.close().unwrap();
        submit_and_wait(&device, &cmd);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn push_constants_outside_declared_ranges_are_rejected() {
        let device = headless();
        let render_pass = color_pass(&device, 1);
        let pipeline = pipeline_for(&device, &render_pass, |desc| {
            desc.push_constants = vec![kiln_core::PushConstantRange {
                stages: ShaderStages::VERTEX,
                offset: 0,
                size: 16,
            }];
        });

        let mut cmd = device.create_command_buffer(CommandListType::Direct).unwrap();
        cmd.begin().unwrap();
        cmd.set_pipeline_state(&pipeline).unwrap();
        cmd.push_constants(ShaderStages::VERTEX, 0, &[0; 16]).unwrap();
        assert!(cmd
            .push_constants(ShaderStages::VERTEX, u32::MAX - 3, &[0; 8])
            .unwrap_err()
            .is_invalid_argument());
        assert!(cmd
            .push_constants(ShaderStages::VERTEX, 8, &[0; 16])
            .unwrap_err()
            .is_invalid_argument());
        assert!(cmd
            .push_constants(ShaderStages::FRAGMENT, 0, &[0; 4])
            .unwrap_err()
            .is_invalid_argument());
        cmd.close().unwrap();
        submit_and_wait(&device, &cmd);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn descriptor_pool_grows_when_a_block_runs_out() {
        let device = headless();
        let raw = device.context().device();
        let group = BindingGroupLayout {
            slots: vec![BindingSlot::new(
                0,
                BindingKind::UniformBuffer,
                ShaderStages::VERTEX,
            )],
        };
        unsafe {
            let layout = descriptors::create_set_layout(raw, &group).unwrap();
            let mut pool = DescriptorPool::new(raw).unwrap();
            for _ in 0..=DescriptorPool::MAX_SETS {
                pool.allocate(raw, layout).unwrap();
            }
            assert_eq!(pool.block_count(), 2);

            pool.reset(raw).unwrap();
            for _ in 0..=DescriptorPool::MAX_SETS {
                pool.allocate(raw, layout).unwrap();
            }
            assert_eq!(pool.block_count(), 2);

            pool.destroy(raw);
            assert!(pool.allocate(raw, layout).unwrap_err().is_invalid_argument());
            raw.destroy_descriptor_set_layout(layout, None);
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    #[ignore = "Requires GPU hardware and a display"]
    fn swap_chain_resize_rebuilds_and_presents() {
        use winit::dpi::PhysicalSize;
        use winit::event_loop::EventLoop;
        use winit::platform::x11::EventLoopBuilderExtX11;
        use winit::window::Window;

        let event_loop = EventLoop::builder().with_any_thread(true).build().unwrap();
        #[allow(deprecated)]
        let window = event_loop
            .create_window(
                Window::default_attributes()
                    .with_inner_size(PhysicalSize::new(800, 600))
                    .with_visible(false),
            )
            .unwrap();
        let device = DeviceBuilder::new()
            .validation(false)
            .frame_count(2)
            .extent(800, 600)
            .build_with_window(&window)
            .unwrap();

        let swap_chain = Arc::clone(device.swap_chain().unwrap());
        let old_handle = swap_chain.lock().handle();
        assert!(device.frame_count() >= 2);

        device.resize(1024, 768).unwrap();
        {
            let chain = swap_chain.lock();
            assert_ne!(chain.handle(), old_handle);
            assert_eq!(chain.frame_count(), chain.image_count());
            assert_eq!(chain.frame_index(), 0);
            let extent = chain.extent();
            for index in 0..chain.image_count() {
                let framebuffer = chain.framebuffer(index).unwrap();
                assert_eq!(
                    (framebuffer.width(), framebuffer.height()),
                    (extent.width, extent.height)
                );
            }
        }

        let mut cmd = device.create_command_buffer(CommandListType::Direct).unwrap();
        for _ in 0..3 {
            device.move_to_next_frame().unwrap();
            if device.acquire_next_image().unwrap() == AcquireStatus::NeedsRebuild {
                device.resize(1024, 768).unwrap();
                continue;
            }
            if cmd.state().state() == RecordingState::Initial {
                cmd.begin().unwrap();
            } else {
                cmd.reset(None).unwrap();
            }
            cmd.begin_swap_chain_pass(&[CLEAR]).unwrap();
            cmd.end_render_pass().unwrap();
            cmd.resource_barrier_swap_chain(Transition::render_target_to_present())
                .unwrap();
            cmd.close().unwrap();
            let status = cmd.present().unwrap();
            assert!(matches!(
                status,
                PresentStatus::Presented | PresentStatus::NeedsRebuild
            ));
            device.wait_gpu().unwrap();
        }
    }
}
