//! Command buffers.
//!
//! A [`CommandBuffer`] wraps one Vulkan command buffer and a transient
//! descriptor pool. Lifecycle and render pass rules are enforced by
//! [`CommandState`] before anything reaches Vulkan. Bound pipelines, passes
//! and framebuffers are held weakly; an operation that needs one upgrades it
//! and fails with invalid-argument if it has been dropped.
//!
//! Buffer and texture bindings are staged per binding group and written into
//! a freshly allocated descriptor set right before the next draw.

use crate::barrier::{self, ImageRange};
use crate::buffer::{GpuBuffer, IndexBuffer, VertexBuffer};
use crate::context::GpuContext;
use crate::descriptors::{self, BoundResource, DescriptorPool};
use crate::error::{Result, RhiError, VkResultExt};
use crate::framebuffer::Framebuffer;
use crate::pipeline::PipelineState;
use crate::render_pass::RenderPass;
use crate::sampler::Sampler;
use crate::swapchain::{PresentStatus, SwapChain};
use crate::texture::Texture;
use crate::translate;
use ash::vk;
use kiln_core::{
    AttachmentDesc, BindingKind, CommandListType, CommandState, GpuResource, PrimitiveTopology,
    Rect, ResourceKind, ResourceState, ShaderStages, Transition, Viewport, PURPLE,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};

/// Color used for attachments a caller gave no clear color for.
const DEFAULT_CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

pub fn viewport(v: &Viewport) -> vk::Viewport {
    vk::Viewport {
        x: v.x,
        y: v.y,
        width: v.width,
        height: v.height,
        min_depth: v.min_depth,
        max_depth: v.max_depth,
    }
}

pub fn rect(r: &Rect) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: r.x, y: r.y },
        extent: vk::Extent2D {
            width: r.width,
            height: r.height,
        },
    }
}

/// One clear value per attachment. Color attachments take `colors` in
/// order; depth attachments clear to depth 1 and stencil 0.
pub fn clear_values(attachments: &[AttachmentDesc], colors: &[[f32; 4]]) -> Vec<vk::ClearValue> {
    let mut next_color = colors.iter();
    attachments
        .iter()
        .map(|attachment| {
            if attachment.format.has_depth() || attachment.format.has_stencil() {
                vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                }
            } else {
                vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: *next_color.next().unwrap_or(&DEFAULT_CLEAR),
                    },
                }
            }
        })
        .collect()
}

/// Bindings staged for one group.
#[derive(Default)]
struct GroupBindings {
    entries: BTreeMap<u32, (BindingKind, BoundResource)>,
    dirty: bool,
}

/// What a render pass was begun with, for restarts.
struct PassScope {
    render_pass: Weak<RenderPass>,
    framebuffer: Weak<Framebuffer>,
    clear_values: Vec<vk::ClearValue>,
}

pub struct CommandBuffer {
    ctx: Arc<GpuContext>,
    cmd: vk::CommandBuffer,
    list_type: CommandListType,
    state: CommandState,
    descriptor_pool: DescriptorPool,
    swap_chain: Option<Arc<Mutex<SwapChain>>>,
    pipeline: Weak<PipelineState>,
    pending_pipeline: Weak<PipelineState>,
    scope: Option<PassScope>,
    groups: BTreeMap<u32, GroupBindings>,
    viewport: Option<Viewport>,
    scissor: Option<Rect>,
}

impl CommandBuffer {
    /// Allocate a command buffer of `list_type`. Command buffers created
    /// with a swap chain can present to it.
    pub fn new(
        ctx: Arc<GpuContext>,
        list_type: CommandListType,
        swap_chain: Option<Arc<Mutex<SwapChain>>>,
    ) -> Result<Self> {
        let descriptor_pool = unsafe { DescriptorPool::new(ctx.device()) }?;
        let mut command_buffer = Self {
            ctx,
            cmd: vk::CommandBuffer::null(),
            list_type,
            state: CommandState::new(),
            descriptor_pool,
            swap_chain,
            pipeline: Weak::new(),
            pending_pipeline: Weak::new(),
            scope: None,
            groups: BTreeMap::new(),
            viewport: None,
            scissor: None,
        };
        command_buffer.cmd = command_buffer.allocate(list_type)?;
        Ok(command_buffer)
    }

    fn allocate(&self, list_type: CommandListType) -> Result<vk::CommandBuffer> {
        let level = if list_type.is_primary() {
            vk::CommandBufferLevel::PRIMARY
        } else {
            vk::CommandBufferLevel::SECONDARY
        };
        let pool = self.ctx.command_pool().lock();
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(level)
            .command_buffer_count(1);
        let buffers = unsafe { self.ctx.device().allocate_command_buffers(&alloc_info) }
            .or_rhi("command buffer")?;
        buffers.into_iter().next().ok_or_else(|| RhiError::CreationFailed {
            what: "command buffer",
            reason: "allocation returned no handle".to_string(),
        })
    }

    fn free(&mut self) {
        if self.cmd != vk::CommandBuffer::null() {
            let pool = self.ctx.command_pool().lock();
            unsafe { self.ctx.device().free_command_buffers(*pool, &[self.cmd]) };
            self.cmd = vk::CommandBuffer::null();
        }
    }

    fn live(&self, op: &str) -> Result<vk::CommandBuffer> {
        if self.cmd == vk::CommandBuffer::null() {
            Err(RhiError::invalid(format!("{op} on a destroyed command buffer")))
        } else {
            Ok(self.cmd)
        }
    }

    fn clear_refs(&mut self) {
        self.pipeline = Weak::new();
        self.scope = None;
        self.groups.clear();
        self.viewport = None;
        self.scissor = None;
    }

    /// Reallocate as `list_type` and return to the initial state. `pipeline`
    /// is bound when recording begins.
    pub fn init(
        &mut self,
        list_type: CommandListType,
        pipeline: Option<&Arc<PipelineState>>,
    ) -> Result<()> {
        self.free();
        self.cmd = self.allocate(list_type)?;
        self.list_type = list_type;
        self.state.init();
        self.clear_refs();
        self.pending_pipeline = pipeline.map_or_else(Weak::new, Arc::downgrade);
        Ok(())
    }

    /// Start recording. Binds the pipeline given to [`Self::init`], if any.
    pub fn begin(&mut self) -> Result<()> {
        let cmd = self.live("begin")?;
        self.state.begin()?;
        self.begin_backend(cmd)?;
        if let Some(pipeline) = std::mem::take(&mut self.pending_pipeline).upgrade() {
            self.set_pipeline_state(&pipeline)?;
        }
        Ok(())
    }

    fn begin_backend(&self, cmd: vk::CommandBuffer) -> Result<()> {
        let inheritance = vk::CommandBufferInheritanceInfo::default();
        let mut begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        if !self.list_type.is_primary() {
            begin_info = begin_info.inheritance_info(&inheritance);
        }
        unsafe { self.ctx.device().begin_command_buffer(cmd, &begin_info) }
            .or_rhi("begin command buffer")
    }

    /// Drop every reference, reset the backend buffer and its descriptor
    /// pool, start recording again and bind `pipeline`.
    ///
    /// The GPU must have finished the previous submission of this buffer.
    pub fn reset(&mut self, pipeline: Option<&Arc<PipelineState>>) -> Result<()> {
        let cmd = self.live("reset")?;
        self.state.reset()?;
        self.clear_refs();
        self.pending_pipeline = Weak::new();
        let device = self.ctx.device();
        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .or_rhi("reset command buffer")?;
            self.descriptor_pool.reset(device)?;
        }
        self.begin_backend(cmd)?;
        if let Some(pipeline) = pipeline {
            self.set_pipeline_state(pipeline)?;
        }
        Ok(())
    }

    /// Finish recording.
    pub fn close(&mut self) -> Result<()> {
        let cmd = self.live("close")?;
        self.state.close()?;
        unsafe { self.ctx.device().end_command_buffer(cmd) }.or_rhi("end command buffer")
    }

    /// Bind `pipeline` and apply its viewport and scissor. A pass begun with
    /// a different render pass is ended and the pipeline's pass begun on the
    /// same framebuffer, with every attachment cleared to purple.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn set_pipeline_state(&mut self, pipeline: &Arc<PipelineState>) -> Result<()> {
        let cmd = self.live("set_pipeline_state")?;
        self.state.require_recording("set_pipeline_state")?;

        if self.state.active_pass().is_some() {
            let active = self.scope.as_ref().and_then(|s| s.render_pass.upgrade());
            let compatible = active.is_some_and(|rp| Arc::ptr_eq(&rp, pipeline.render_pass()));
            if !compatible {
                self.restart_pass_for(pipeline)?;
            }
        }

        unsafe {
            self.ctx.device().cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.handle(),
            );
        }
        if !self.pipeline.ptr_eq(&Arc::downgrade(pipeline)) {
            self.groups.clear();
        }
        self.pipeline = Arc::downgrade(pipeline);
        self.apply_view_state(pipeline)
    }

    fn restart_pass_for(&mut self, pipeline: &Arc<PipelineState>) -> Result<()> {
        let framebuffer = self
            .scope
            .as_ref()
            .and_then(|s| s.framebuffer.upgrade())
            .ok_or_else(|| RhiError::invalid("active framebuffer was dropped"))?;
        let render_pass = pipeline.render_pass();
        if framebuffer.views().len() != render_pass.attachment_count() {
            return Err(RhiError::invalid(format!(
                "pipeline render pass has {} attachments, active framebuffer has {}",
                render_pass.attachment_count(),
                framebuffer.views().len()
            )));
        }
        tracing::debug!("Pipeline render pass differs from the active pass, restarting it");
        self.end_render_pass()?;
        let purple = vec![PURPLE; render_pass.attachment_count()];
        let values = clear_values(&render_pass.desc().attachments, &purple);
        self.begin_pass_with(render_pass, &framebuffer, values, pipeline.subpass())
    }

    /// Set the pipeline's viewport and scissor, or the active framebuffer's
    /// extent for those it leaves open. Without a pass the open ones are set
    /// when the pass begins.
    fn apply_view_state(&mut self, pipeline: &PipelineState) -> Result<()> {
        let cmd = self.live("set_pipeline_state")?;
        let extent = self
            .state
            .active_pass()
            .and(self.scope.as_ref())
            .and_then(|s| s.framebuffer.upgrade())
            .map(|fb| fb.extent());
        let view = pipeline
            .desc()
            .viewport
            .or_else(|| extent.map(|e| Viewport::from_size(e.width, e.height)));
        let scissor = pipeline
            .desc()
            .scissor
            .or_else(|| extent.map(|e| Rect::from_size(e.width, e.height)));
        let device = self.ctx.device();
        unsafe {
            if let Some(view) = view {
                device.cmd_set_viewport(cmd, 0, &[viewport(&view)]);
            }
            if let Some(scissor) = scissor {
                device.cmd_set_scissor(cmd, 0, &[rect(&scissor)]);
            }
        }
        self.viewport = view.or(self.viewport);
        self.scissor = scissor.or(self.scissor);
        Ok(())
    }

    /// Begin `render_pass` on `framebuffer` at subpass 0. Color attachments
    /// are cleared to `clear_colors` in order.
    pub fn begin_render_pass(
        &mut self,
        render_pass: &Arc<RenderPass>,
        framebuffer: &Arc<Framebuffer>,
        clear_colors: &[[f32; 4]],
    ) -> Result<()> {
        self.begin_render_pass_at(render_pass, framebuffer, clear_colors, 0)
    }

    /// Begin `render_pass` and step to `subpass`.
    pub fn begin_render_pass_at(
        &mut self,
        render_pass: &Arc<RenderPass>,
        framebuffer: &Arc<Framebuffer>,
        clear_colors: &[[f32; 4]],
        subpass: u32,
    ) -> Result<()> {
        if framebuffer.views().len() != render_pass.attachment_count() {
            return Err(RhiError::invalid(format!(
                "render pass has {} attachments, framebuffer has {}",
                render_pass.attachment_count(),
                framebuffer.views().len()
            )));
        }
        let values = clear_values(&render_pass.desc().attachments, clear_colors);
        self.begin_pass_with(render_pass, framebuffer, values, subpass)
    }

    /// Begin the swap chain's render pass on the framebuffer of the acquired
    /// image.
    pub fn begin_swap_chain_pass(&mut self, clear_colors: &[[f32; 4]]) -> Result<()> {
        let (render_pass, framebuffer) = {
            let swap_chain = self
                .swap_chain
                .as_ref()
                .ok_or_else(|| RhiError::invalid("command buffer has no swap chain"))?
                .lock();
            let framebuffer = swap_chain
                .current_framebuffer()
                .cloned()
                .ok_or_else(|| RhiError::invalid("no swap-chain image acquired"))?;
            (Arc::clone(swap_chain.render_pass()), framebuffer)
        };
        self.begin_render_pass(&render_pass, &framebuffer, clear_colors)
    }

    fn begin_pass_with(
        &mut self,
        render_pass: &Arc<RenderPass>,
        framebuffer: &Arc<Framebuffer>,
        clear_values: Vec<vk::ClearValue>,
        subpass: u32,
    ) -> Result<()> {
        let cmd = self.live("begin_render_pass")?;
        self.state.require_recording("begin_render_pass")?;
        self.state.begin_pass(render_pass.subpass_count(), subpass)?;

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass.handle())
            .framebuffer(framebuffer.handle())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: framebuffer.extent(),
            })
            .clear_values(&clear_values);
        let device = self.ctx.device();
        unsafe {
            device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
            for _ in 0..subpass {
                device.cmd_next_subpass(cmd, vk::SubpassContents::INLINE);
            }
        }

        self.scope = Some(PassScope {
            render_pass: Arc::downgrade(render_pass),
            framebuffer: Arc::downgrade(framebuffer),
            clear_values,
        });
        if let Some(pipeline) = self.pipeline.upgrade() {
            self.apply_view_state(&pipeline)?;
        }
        Ok(())
    }

    pub fn next_subpass(&mut self) -> Result<()> {
        let cmd = self.live("next_subpass")?;
        self.state.next_subpass()?;
        unsafe {
            self.ctx
                .device()
                .cmd_next_subpass(cmd, vk::SubpassContents::INLINE);
        }
        Ok(())
    }

    /// Move to subpass `index`. Moving backwards restarts the pass with the
    /// clear values it was begun with and steps forward from subpass 0.
    pub fn set_subpass_index(&mut self, index: u32) -> Result<()> {
        let active = self.state.require_pass("set_subpass_index")?;
        if index >= active.subpass_count {
            return Err(RhiError::invalid(format!(
                "subpass {index} out of range, render pass has {}",
                active.subpass_count
            )));
        }
        if index < active.subpass {
            tracing::warn!(
                from = active.subpass,
                to = index,
                "Re-entering an earlier subpass restarts the render pass"
            );
            let scope = self
                .scope
                .take()
                .ok_or_else(|| RhiError::invalid("no render pass scope to restart"))?;
            let render_pass = scope
                .render_pass
                .upgrade()
                .ok_or_else(|| RhiError::invalid("active render pass was dropped"))?;
            let framebuffer = scope
                .framebuffer
                .upgrade()
                .ok_or_else(|| RhiError::invalid("active framebuffer was dropped"))?;
            self.end_render_pass()?;
            return self.begin_pass_with(&render_pass, &framebuffer, scope.clear_values, index);
        }
        for _ in active.subpass..index {
            self.next_subpass()?;
        }
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> Result<()> {
        let cmd = self.live("end_render_pass")?;
        self.state.end_pass()?;
        unsafe { self.ctx.device().cmd_end_render_pass(cmd) };
        Ok(())
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: &VertexBuffer) -> Result<()> {
        self.set_vertex_buffers(slot, &[buffer])
    }

    /// Bind `buffers` to consecutive slots starting at `first_slot`.
    pub fn set_vertex_buffers(&mut self, first_slot: u32, buffers: &[&VertexBuffer]) -> Result<()> {
        let cmd = self.live("set_vertex_buffers")?;
        self.state.require_recording("set_vertex_buffers")?;
        if buffers.iter().any(|b| !b.is_live()) {
            return Err(RhiError::invalid("binding a destroyed vertex buffer"));
        }
        let handles: Vec<vk::Buffer> = buffers.iter().map(|b| b.handle()).collect();
        let offsets = vec![0_u64; handles.len()];
        unsafe {
            self.ctx
                .device()
                .cmd_bind_vertex_buffers(cmd, first_slot, &handles, &offsets);
        }
        Ok(())
    }

    pub fn set_index_buffer(&mut self, buffer: &IndexBuffer) -> Result<()> {
        let cmd = self.live("set_index_buffer")?;
        self.state.require_recording("set_index_buffer")?;
        if !buffer.is_live() {
            return Err(RhiError::invalid("binding a destroyed index buffer"));
        }
        unsafe {
            self.ctx
                .device()
                .cmd_bind_index_buffer(cmd, buffer.handle(), 0, buffer.vk_index_type());
        }
        Ok(())
    }

    fn require_view_state(&self, op: &str) -> Result<()> {
        if self.viewport.is_none() || self.scissor.is_none() {
            return Err(RhiError::invalid(format!(
                "{op} before a viewport and scissor were set"
            )));
        }
        Ok(())
    }

    fn bound_pipeline(&self, op: &str) -> Result<Arc<PipelineState>> {
        self.pipeline
            .upgrade()
            .ok_or_else(|| RhiError::invalid(format!("{op} without a bound pipeline state")))
    }

    fn stage(
        &mut self,
        op: &str,
        group: u32,
        binding: u32,
        accepted: &[BindingKind],
        resource: BoundResource,
    ) -> Result<()> {
        self.state.require_recording(op)?;
        let pipeline = self.bound_pipeline(op)?;
        let slot = pipeline
            .binding_group(group)
            .and_then(|g| g.slot(binding))
            .ok_or_else(|| {
                RhiError::invalid(format!(
                    "{op}: pipeline has no binding {binding} in group {group}"
                ))
            })?;
        if !accepted.contains(&slot.kind) {
            return Err(RhiError::invalid(format!(
                "{op}: binding {binding} in group {group} is {:?}",
                slot.kind
            )));
        }
        let bindings = self.groups.entry(group).or_default();
        bindings.entries.insert(binding, (slot.kind, resource));
        bindings.dirty = true;
        Ok(())
    }

    /// Bind a uniform or storage buffer to `binding` of `group`.
    pub fn set_gpu_buffer(&mut self, group: u32, binding: u32, buffer: &GpuBuffer) -> Result<()> {
        if !buffer.is_live() {
            return Err(RhiError::invalid("binding a destroyed GPU buffer"));
        }
        self.stage(
            "set_gpu_buffer",
            group,
            binding,
            &[BindingKind::UniformBuffer, BindingKind::StorageBuffer],
            BoundResource::Buffer {
                buffer: buffer.handle(),
                range: buffer.size(),
            },
        )
    }

    /// Bind `buffers` to consecutive bindings of `group`.
    pub fn set_gpu_buffers(
        &mut self,
        group: u32,
        first_binding: u32,
        buffers: &[&GpuBuffer],
    ) -> Result<()> {
        for (binding, buffer) in (first_binding..).zip(buffers) {
            self.set_gpu_buffer(group, binding, buffer)?;
        }
        Ok(())
    }

    /// Bind `texture` in its tracked state, with `sampler` when the slot
    /// samples.
    pub fn set_texture(
        &mut self,
        group: u32,
        binding: u32,
        texture: &Texture,
        sampler: Option<&Sampler>,
    ) -> Result<()> {
        if !texture.is_live() {
            return Err(RhiError::invalid("binding a destroyed texture"));
        }
        let accepted: &[BindingKind] = match sampler {
            Some(_) => &[BindingKind::CombinedTextureSampler],
            None => &[
                BindingKind::SampledTexture,
                BindingKind::StorageTexture,
                BindingKind::InputAttachment,
            ],
        };
        self.stage(
            "set_texture",
            group,
            binding,
            accepted,
            BoundResource::Image {
                view: texture.view(),
                sampler: sampler.map_or_else(vk::Sampler::null, Sampler::handle),
                layout: translate::image_layout(texture.state()),
            },
        )
    }

    /// Bind a separate sampler to `binding` of `group`.
    pub fn set_sampler(&mut self, group: u32, binding: u32, sampler: &Sampler) -> Result<()> {
        if !sampler.is_live() {
            return Err(RhiError::invalid("binding a destroyed sampler"));
        }
        self.stage(
            "set_sampler",
            group,
            binding,
            &[BindingKind::Sampler],
            BoundResource::Sampler {
                sampler: sampler.handle(),
            },
        )
    }

    /// Write every dirty group into a new descriptor set and bind it. Every
    /// binding the pipeline declares must have been set.
    fn flush_bindings(&mut self, pipeline: &PipelineState) -> Result<()> {
        let cmd = self.live("draw")?;
        let staged: BTreeSet<(u32, u32)> = self
            .groups
            .iter()
            .flat_map(|(&group, bindings)| bindings.entries.keys().map(move |&b| (group, b)))
            .collect();
        if let Some((group, binding)) =
            descriptors::first_unbound(&pipeline.desc().binding_groups, &staged)
        {
            return Err(RhiError::invalid(format!(
                "draw with binding {binding} of group {group} never set"
            )));
        }
        let device = self.ctx.device();
        for (&group, bindings) in &mut self.groups {
            if !bindings.dirty {
                continue;
            }
            let layout = pipeline.set_layout(group).ok_or_else(|| {
                RhiError::invalid(format!("pipeline has no binding group {group}"))
            })?;
            let writes: Vec<(u32, BindingKind, BoundResource)> = bindings
                .entries
                .iter()
                .map(|(&binding, &(kind, resource))| (binding, kind, resource))
                .collect();
            unsafe {
                let set = self.descriptor_pool.allocate(device, layout)?;
                descriptors::write_set(device, set, &writes);
                device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    pipeline.layout(),
                    group,
                    &[set],
                    &[],
                );
            }
            bindings.dirty = false;
        }
        Ok(())
    }

    /// Push `bytes` at `offset` for `stages`. Some declared range must cover
    /// the write for those stages.
    pub fn push_constants(&mut self, stages: ShaderStages, offset: u32, bytes: &[u8]) -> Result<()> {
        let cmd = self.live("push_constants")?;
        self.state.require_recording("push_constants")?;
        let pipeline = self.bound_pipeline("push_constants")?;
        let end = u32::try_from(bytes.len())
            .ok()
            .and_then(|len| offset.checked_add(len).map(|end| (len, end)));
        let Some((len, end)) = end else {
            return Err(RhiError::invalid(format!(
                "push constants of {} bytes at {offset} overflow the address range",
                bytes.len()
            )));
        };
        let covered = pipeline
            .push_constants()
            .iter()
            .any(|range| range.stages.contains(stages) && range.contains(offset, len));
        if !covered {
            return Err(RhiError::invalid(format!(
                "push constants at {offset}..{end} outside the declared ranges"
            )));
        }
        unsafe {
            self.ctx.device().cmd_push_constants(
                cmd,
                pipeline.layout(),
                translate::shader_stages(stages),
                offset,
                bytes,
            );
        }
        Ok(())
    }

    pub fn set_rect(&mut self, view: &Viewport) -> Result<()> {
        let cmd = self.live("set_rect")?;
        self.state.require_recording("set_rect")?;
        unsafe { self.ctx.device().cmd_set_viewport(cmd, 0, &[viewport(view)]) };
        self.viewport = Some(*view);
        Ok(())
    }

    pub fn set_scissor_rect(&mut self, scissor: &Rect) -> Result<()> {
        let cmd = self.live("set_scissor_rect")?;
        self.state.require_recording("set_scissor_rect")?;
        unsafe { self.ctx.device().cmd_set_scissor(cmd, 0, &[rect(scissor)]) };
        self.scissor = Some(*scissor);
        Ok(())
    }

    /// Set the topology of a pipeline built with dynamic topology. The
    /// pipeline bakes a triangle list, so the device may only accept other
    /// triangle topologies here.
    pub fn set_topology(&mut self, topology: PrimitiveTopology) -> Result<()> {
        let cmd = self.live("set_topology")?;
        self.state.require_recording("set_topology")?;
        let pipeline = self.bound_pipeline("set_topology")?;
        if !pipeline.topology().is_dynamic() {
            return Err(RhiError::invalid(
                "set_topology on a pipeline built with static topology",
            ));
        }
        unsafe {
            self.ctx
                .device()
                .cmd_set_primitive_topology(cmd, translate::primitive_topology(topology));
        }
        Ok(())
    }

    pub fn clear_render_target(&mut self, color: [f32; 4]) -> Result<()> {
        self.clear_render_targets(&[color])
    }

    /// Inside a pass, clear the color attachments of the current subpass in
    /// order. Outside a pass, clear the acquired swap-chain image, which must
    /// be in the copy-destination state, to the first color.
    pub fn clear_render_targets(&mut self, colors: &[[f32; 4]]) -> Result<()> {
        let cmd = self.live("clear_render_targets")?;
        self.state.require_recording("clear_render_targets")?;
        if colors.is_empty() {
            return Ok(());
        }
        let device = self.ctx.device();

        if let Some(active) = self.state.active_pass() {
            let (render_pass, framebuffer) = self.scope_objects()?;
            let subpass = &render_pass.subpasses()[active.subpass as usize];
            if colors.len() > subpass.colors.len() {
                return Err(RhiError::invalid(format!(
                    "{} clear colors for {} color attachments",
                    colors.len(),
                    subpass.colors.len()
                )));
            }
            let clears: Vec<vk::ClearAttachment> = (0_u32..)
                .zip(colors)
                .map(|(i, color)| vk::ClearAttachment {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    color_attachment: i,
                    clear_value: vk::ClearValue {
                        color: vk::ClearColorValue { float32: *color },
                    },
                })
                .collect();
            let rects = [full_clear_rect(framebuffer.extent())];
            unsafe { device.cmd_clear_attachments(cmd, &clears, &rects) };
            return Ok(());
        }

        let image = self.swap_chain_image("clear_render_targets")?;
        let clear = vk::ClearColorValue { float32: colors[0] };
        unsafe {
            device.cmd_clear_color_image(
                cmd,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &clear,
                &[ImageRange::COLOR.subresource()],
            );
        }
        Ok(())
    }

    /// Clear the depth-stencil attachment of the current subpass.
    pub fn clear_depth_stencil(&mut self, depth: f32, stencil: u32) -> Result<()> {
        let cmd = self.live("clear_depth_stencil")?;
        let active = self.state.require_pass("clear_depth_stencil")?;
        let (render_pass, framebuffer) = self.scope_objects()?;
        let reference = render_pass.subpasses()[active.subpass as usize]
            .depth_stencil
            .ok_or_else(|| RhiError::invalid("subpass has no depth-stencil attachment"))?;
        let format = render_pass.desc().attachments[reference.index as usize].format;
        let clear = vk::ClearAttachment {
            aspect_mask: translate::aspect_mask(format),
            color_attachment: 0,
            clear_value: vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        };
        let rects = [full_clear_rect(framebuffer.extent())];
        unsafe {
            self.ctx
                .device()
                .cmd_clear_attachments(cmd, &[clear], &rects);
        }
        Ok(())
    }

    fn scope_objects(&self) -> Result<(Arc<RenderPass>, Arc<Framebuffer>)> {
        let scope = self
            .scope
            .as_ref()
            .ok_or_else(|| RhiError::invalid("no render pass scope"))?;
        let render_pass = scope
            .render_pass
            .upgrade()
            .ok_or_else(|| RhiError::invalid("active render pass was dropped"))?;
        let framebuffer = scope
            .framebuffer
            .upgrade()
            .ok_or_else(|| RhiError::invalid("active framebuffer was dropped"))?;
        Ok((render_pass, framebuffer))
    }

    fn swap_chain_image(&self, op: &str) -> Result<vk::Image> {
        self.swap_chain
            .as_ref()
            .ok_or_else(|| RhiError::invalid(format!("{op}: command buffer has no swap chain")))?
            .lock()
            .current_image_handle()
            .ok_or_else(|| RhiError::invalid(format!("{op}: no swap-chain image acquired")))
    }

    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()> {
        let cmd = self.live("draw_instanced")?;
        self.state.require_pass("draw_instanced")?;
        let pipeline = self.bound_pipeline("draw_instanced")?;
        self.require_view_state("draw_instanced")?;
        self.flush_bindings(&pipeline)?;
        unsafe {
            self.ctx.device().cmd_draw(
                cmd,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
        Ok(())
    }

    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<()> {
        let cmd = self.live("draw_indexed")?;
        self.state.require_pass("draw_indexed")?;
        let pipeline = self.bound_pipeline("draw_indexed")?;
        self.require_view_state("draw_indexed")?;
        self.flush_bindings(&pipeline)?;
        unsafe {
            self.ctx.device().cmd_draw_indexed(
                cmd,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
        Ok(())
    }

    /// Transition the acquired swap-chain image.
    pub fn resource_barrier_swap_chain(&mut self, transition: Transition) -> Result<()> {
        let cmd = self.live("resource_barrier_swap_chain")?;
        self.state.require_recording("resource_barrier_swap_chain")?;
        self.state.require_no_pass("resource_barrier_swap_chain")?;
        let image = self.swap_chain_image("resource_barrier_swap_chain")?;
        unsafe { barrier::record(self.ctx.device(), cmd, image, ImageRange::COLOR, transition) };
        Ok(())
    }

    /// Transition every subresource of `texture` from its tracked state to
    /// `after`.
    pub fn resource_barrier(&mut self, texture: &Texture, after: ResourceState) -> Result<()> {
        let cmd = self.live("resource_barrier")?;
        self.state.require_recording("resource_barrier")?;
        self.state.require_no_pass("resource_barrier")?;
        if !texture.is_live() {
            return Err(RhiError::invalid("barrier on a destroyed texture"));
        }
        if after == ResourceState::Undefined {
            return Err(RhiError::invalid("cannot transition into the undefined state"));
        }
        let transition = Transition::new(texture.state(), after);
        if transition.is_noop() {
            return Ok(());
        }
        unsafe {
            barrier::record(
                self.ctx.device(),
                cmd,
                texture.image(),
                texture.full_range(),
                transition,
            );
        }
        texture.set_state(after);
        Ok(())
    }

    /// Submit against the current frame and present the acquired image.
    pub fn present(&mut self) -> Result<PresentStatus> {
        let cmd = self.submittable("present")?;
        let swap_chain = self
            .swap_chain
            .as_ref()
            .ok_or_else(|| RhiError::invalid("present: command buffer has no swap chain"))?;
        let mut swap_chain = swap_chain.lock();
        unsafe { swap_chain.present(cmd) }
    }

    /// The backend handle, if the buffer is closed and primary.
    pub(crate) fn submittable(&self, op: &str) -> Result<vk::CommandBuffer> {
        let cmd = self.live(op)?;
        self.state.require_executable(op)?;
        if !self.list_type.is_primary() {
            return Err(RhiError::invalid(format!(
                "{op}: {:?} command buffers are not submitted directly",
                self.list_type
            )));
        }
        Ok(cmd)
    }

    /// Render pass of the open pass scope, if it is still alive.
    pub fn active_render_pass(&self) -> Option<Arc<RenderPass>> {
        self.state.active_pass()?;
        self.scope.as_ref().and_then(|s| s.render_pass.upgrade())
    }

    /// Clear values the open pass was begun with, one per attachment.
    pub fn pass_clear_values(&self) -> &[vk::ClearValue] {
        match (self.state.active_pass(), &self.scope) {
            (Some(_), Some(scope)) => &scope.clear_values,
            _ => &[],
        }
    }

    /// Viewport last set while recording.
    pub fn current_viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    /// Scissor rectangle last set while recording.
    pub fn current_scissor(&self) -> Option<Rect> {
        self.scissor
    }

    pub fn handle(&self) -> vk::CommandBuffer {
        self.cmd
    }

    pub fn list_type(&self) -> CommandListType {
        self.list_type
    }

    pub fn state(&self) -> &CommandState {
        &self.state
    }
}

fn full_clear_rect(extent: vk::Extent2D) -> vk::ClearRect {
    vk::ClearRect {
        rect: vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        },
        base_array_layer: 0,
        layer_count: 1,
    }
}

impl GpuResource for CommandBuffer {
    fn kind(&self) -> ResourceKind {
        ResourceKind::CommandBuffer
    }

    fn is_live(&self) -> bool {
        self.cmd != vk::CommandBuffer::null()
    }

    fn destroy(&mut self) {
        self.free();
        unsafe { self.descriptor_pool.destroy(self.ctx.device()) };
        self.state.init();
        self.clear_refs();
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::Format;

    #[test]
    fn viewport_and_scissor_translate_field_by_field() {
        let v = viewport(&Viewport {
            x: 4.0,
            y: 8.0,
            width: 640.0,
            height: 480.0,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        assert_eq!((v.x, v.y, v.width, v.height), (4.0, 8.0, 640.0, 480.0));
        assert_eq!((v.min_depth, v.max_depth), (0.0, 1.0));

        let r = rect(&Rect {
            x: -2,
            y: 3,
            width: 100,
            height: 50,
        });
        assert_eq!((r.offset.x, r.offset.y), (-2, 3));
        assert_eq!((r.extent.width, r.extent.height), (100, 50));
    }

    #[test]
    fn clear_values_follow_attachment_kinds() {
        let attachments = [
            AttachmentDesc::new(
                Format::B8G8R8A8Unorm,
                ResourceState::Undefined,
                ResourceState::RenderTarget,
            ),
            AttachmentDesc::new(
                Format::D24UnormS8Uint,
                ResourceState::Undefined,
                ResourceState::DepthWrite,
            ),
            AttachmentDesc::new(
                Format::R8G8B8A8Unorm,
                ResourceState::Undefined,
                ResourceState::ShaderResource,
            ),
        ];
        let values = clear_values(&attachments, &[[0.1, 0.2, 0.3, 1.0]]);
        assert_eq!(values.len(), 3);
        unsafe {
            assert_eq!(values[0].color.float32, [0.1, 0.2, 0.3, 1.0]);
            assert_eq!(values[1].depth_stencil.depth, 1.0);
            assert_eq!(values[1].depth_stencil.stencil, 0);
            assert_eq!(values[2].color.float32, DEFAULT_CLEAR);
        }
    }

    #[test]
    fn purple_restart_clears_every_color_attachment() {
        let attachments = [
            AttachmentDesc::new(
                Format::B8G8R8A8Unorm,
                ResourceState::Undefined,
                ResourceState::RenderTarget,
            );
            2
        ];
        let values = clear_values(&attachments, &[PURPLE; 2]);
        unsafe {
            assert!(values.iter().all(|v| v.color.float32 == PURPLE));
        }
    }
}
