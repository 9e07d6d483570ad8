//! Graphics pipeline state objects.

use crate::context::GpuContext;
use crate::descriptors;
use crate::error::{classify, Result, RhiError, VkResultExt};
use crate::render_pass::RenderPass;
use crate::shader::Shader;
use crate::translate;
use ash::vk;
use kiln_core::pipeline::VertexInputLayout;
use kiln_core::{
    BindingGroupLayout, BlendState, DepthStencilState, GpuResource, MultisampleState,
    PushConstantRange, RasterizerState, Rect, ResourceKind, ShaderStage, Topology,
    VertexBufferLayout, Viewport,
};
use std::sync::Arc;

/// Everything a graphics pipeline is built from.
#[derive(Clone)]
pub struct PipelineStateDesc {
    pub shader: Arc<Shader>,
    /// One entry per vertex buffer slot.
    pub vertex_buffers: Vec<VertexBufferLayout>,
    pub topology: Topology,
    /// Applied when the pipeline is bound. `None` covers the framebuffer.
    pub viewport: Option<Viewport>,
    /// Applied when the pipeline is bound. `None` covers the framebuffer.
    pub scissor: Option<Rect>,
    pub rasterizer: RasterizerState,
    pub multisample: MultisampleState,
    pub depth_stencil: DepthStencilState,
    pub blend: BlendState,
    /// Binding group `i` becomes descriptor set `i`.
    pub binding_groups: Vec<BindingGroupLayout>,
    pub push_constants: Vec<PushConstantRange>,
    pub render_pass: Arc<RenderPass>,
    pub subpass: u32,
}

impl PipelineStateDesc {
    /// Default fixed-function state for `shader` in subpass 0 of `render_pass`.
    pub fn new(shader: Arc<Shader>, render_pass: Arc<RenderPass>) -> Self {
        Self {
            shader,
            vertex_buffers: Vec::new(),
            topology: Topology::default(),
            viewport: None,
            scissor: None,
            rasterizer: RasterizerState::default(),
            multisample: MultisampleState::default(),
            depth_stencil: DepthStencilState::disabled(),
            blend: BlendState::default(),
            binding_groups: Vec::new(),
            push_constants: Vec::new(),
            render_pass,
            subpass: 0,
        }
    }
}

/// Binding and attribute descriptions of a resolved vertex layout.
pub fn vertex_input_descriptions(
    layout: &VertexInputLayout,
) -> (
    Vec<vk::VertexInputBindingDescription>,
    Vec<vk::VertexInputAttributeDescription>,
) {
    let bindings = layout
        .bindings
        .iter()
        .map(|b| vk::VertexInputBindingDescription {
            binding: b.binding,
            stride: b.stride,
            input_rate: translate::input_rate(b.input_rate),
        })
        .collect();
    let attributes = layout
        .attributes
        .iter()
        .map(|a| vk::VertexInputAttributeDescription {
            location: a.location,
            binding: a.binding,
            format: translate::format(a.format),
            offset: a.offset,
        })
        .collect();
    (bindings, attributes)
}

/// Dynamic states of a pipeline with `topology`.
pub fn dynamic_states(topology: Topology) -> Vec<vk::DynamicState> {
    let mut states = vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    if topology.is_dynamic() {
        states.push(vk::DynamicState::PRIMITIVE_TOPOLOGY);
    }
    states
}

pub struct PipelineState {
    ctx: Arc<GpuContext>,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    desc: PipelineStateDesc,
}

impl PipelineState {
    pub fn new(ctx: Arc<GpuContext>, desc: &PipelineStateDesc) -> Result<Self> {
        if desc.shader.module(ShaderStage::Vertex).is_none()
            && desc.shader.module(ShaderStage::Mesh).is_none()
        {
            return Err(RhiError::NotImplemented(
                "pipeline states without a vertex or mesh stage",
            ));
        }
        let subpass = desc
            .render_pass
            .subpasses()
            .get(desc.subpass as usize)
            .ok_or_else(|| {
                RhiError::invalid(format!(
                    "subpass {} out of range, render pass has {}",
                    desc.subpass,
                    desc.render_pass.subpass_count()
                ))
            })?;
        for group in &desc.binding_groups {
            group.validate()?;
        }
        for range in &desc.push_constants {
            range.validate()?;
        }
        let vertex_layout = VertexInputLayout::resolve(&desc.vertex_buffers)?;
        let samples = translate::sample_count(desc.multisample.sample_count)?;

        let mut state = Self {
            ctx: Arc::clone(&ctx),
            pipeline: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
            set_layouts: Vec::with_capacity(desc.binding_groups.len()),
            desc: desc.clone(),
        };

        // Partially created handles are released when `state` drops.
        let device = ctx.device();
        for group in &desc.binding_groups {
            let layout = unsafe { descriptors::create_set_layout(device, group) }?;
            state.set_layouts.push(layout);
        }

        let push_ranges: Vec<vk::PushConstantRange> = desc
            .push_constants
            .iter()
            .map(|r| vk::PushConstantRange {
                stage_flags: translate::shader_stages(r.stages),
                offset: r.offset,
                size: r.size,
            })
            .collect();
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&state.set_layouts)
            .push_constant_ranges(&push_ranges);
        state.layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .or_rhi("pipeline layout")?;

        let stages: Vec<vk::PipelineShaderStageCreateInfo> = desc
            .shader
            .modules()
            .iter()
            .filter(|(stage, _)| *stage != ShaderStage::Compute)
            .map(|&(stage, module)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(translate::shader_stage(stage))
                    .module(module)
                    .name(c"main")
            })
            .collect();

        let (bindings, attributes) = vertex_input_descriptions(&vertex_layout);
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(translate::pipeline_topology(desc.topology))
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic; only the counts matter here.
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = translate::rasterization_state(&desc.rasterizer);

        let sample_mask = [desc.multisample.sample_mask];
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(samples)
            .sample_mask(&sample_mask)
            .alpha_to_coverage_enable(
                desc.multisample.alpha_to_coverage || desc.blend.alpha_to_coverage,
            );

        let depth_stencil = translate::depth_stencil_state(&desc.depth_stencil);

        let blend_attachments = translate::color_blend_attachments(&desc.blend, subpass.colors.len());
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic = dynamic_states(desc.topology);
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(state.layout)
            .render_pass(desc.render_pass.handle())
            .subpass(desc.subpass);

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, e)| classify("graphics pipeline", e))?;
        state.pipeline = pipelines[0];

        tracing::debug!(
            stages = stages.len(),
            dynamic_topology = desc.topology.is_dynamic(),
            "Created pipeline state"
        );
        Ok(state)
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Descriptor set layout of binding group `group`.
    pub fn set_layout(&self, group: u32) -> Option<vk::DescriptorSetLayout> {
        self.set_layouts.get(group as usize).copied()
    }

    pub fn binding_group(&self, group: u32) -> Option<&BindingGroupLayout> {
        self.desc.binding_groups.get(group as usize)
    }

    pub fn desc(&self) -> &PipelineStateDesc {
        &self.desc
    }

    pub fn render_pass(&self) -> &Arc<RenderPass> {
        &self.desc.render_pass
    }

    pub fn subpass(&self) -> u32 {
        self.desc.subpass
    }

    pub fn topology(&self) -> Topology {
        self.desc.topology
    }

    pub fn push_constants(&self) -> &[PushConstantRange] {
        &self.desc.push_constants
    }
}

impl GpuResource for PipelineState {
    fn kind(&self) -> ResourceKind {
        ResourceKind::PipelineState
    }

    fn is_live(&self) -> bool {
        self.pipeline != vk::Pipeline::null()
    }

    fn destroy(&mut self) {
        let device = self.ctx.device();
        unsafe {
            if self.pipeline != vk::Pipeline::null() {
                device.destroy_pipeline(self.pipeline, None);
            }
            if self.layout != vk::PipelineLayout::null() {
                device.destroy_pipeline_layout(self.layout, None);
            }
            for layout in self.set_layouts.drain(..) {
                device.destroy_descriptor_set_layout(layout, None);
            }
        }
        self.pipeline = vk::Pipeline::null();
        self.layout = vk::PipelineLayout::null();
    }
}

impl Drop for PipelineState {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{Format, InputRate, PrimitiveTopology, VertexAttribute};

    #[test]
    fn vertex_arrays_are_wired() {
        let layout = VertexInputLayout::resolve(&[
            VertexBufferLayout {
                attributes: vec![
                    VertexAttribute::new(0, Format::R32G32B32Float),
                    VertexAttribute::new(1, Format::R32G32B32A32Float),
                ],
                input_rate: InputRate::Vertex,
            },
            VertexBufferLayout {
                attributes: vec![VertexAttribute::new(2, Format::R32G32Float)],
                input_rate: InputRate::Instance,
            },
        ])
        .unwrap();

        let (bindings, attributes) = vertex_input_descriptions(&layout);
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].stride, 28);
        assert_eq!(bindings[1].stride, 8);
        assert_eq!(bindings[1].input_rate, vk::VertexInputRate::INSTANCE);

        assert_eq!(attributes.len(), 3);
        assert_eq!(attributes[1].location, 1);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[1].format, vk::Format::R32G32B32A32_SFLOAT);
        assert_eq!(attributes[2].binding, 1);
        assert_eq!(attributes[2].offset, 0);
    }

    #[test]
    fn dynamic_topology_adds_a_dynamic_state() {
        let fixed = dynamic_states(Topology::Static(PrimitiveTopology::TriangleList));
        assert_eq!(
            fixed,
            vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
        let dynamic = dynamic_states(Topology::Dynamic);
        assert!(dynamic.contains(&vk::DynamicState::PRIMITIVE_TOPOLOGY));
    }
}
