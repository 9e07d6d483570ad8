//! Render passes.

use crate::context::GpuContext;
use crate::error::{Result, VkResultExt};
use crate::translate;
use ash::vk;
use kiln_core::{
    AttachmentDesc, AttachmentRef, GpuResource, RenderPassDesc, ResourceKind, SubpassDependency,
    SubpassDesc, SubpassIndex,
};
use std::sync::Arc;

pub fn attachment_description(desc: &AttachmentDesc) -> Result<vk::AttachmentDescription> {
    Ok(vk::AttachmentDescription::default()
        .format(translate::format(desc.format))
        .samples(translate::sample_count(desc.sample_count)?)
        .load_op(translate::load_op(desc.load_op))
        .store_op(translate::store_op(desc.store_op))
        .stencil_load_op(translate::load_op(desc.stencil_load_op))
        .stencil_store_op(translate::store_op(desc.stencil_store_op))
        .initial_layout(translate::image_layout(desc.initial_state))
        .final_layout(translate::image_layout(desc.final_state)))
}

pub fn attachment_reference(reference: &AttachmentRef) -> vk::AttachmentReference {
    vk::AttachmentReference {
        attachment: reference.index,
        layout: translate::image_layout(reference.state),
    }
}

const fn subpass_index(index: SubpassIndex) -> u32 {
    match index {
        SubpassIndex::External => vk::SUBPASS_EXTERNAL,
        SubpassIndex::Index(i) => i,
    }
}

pub fn dependency(dep: &SubpassDependency) -> vk::SubpassDependency {
    vk::SubpassDependency::default()
        .src_subpass(subpass_index(dep.src_subpass))
        .dst_subpass(subpass_index(dep.dst_subpass))
        .src_stage_mask(translate::pipeline_stages(dep.src_stages))
        .dst_stage_mask(translate::pipeline_stages(dep.dst_stages))
        .src_access_mask(translate::access_flags(dep.src_access))
        .dst_access_mask(translate::access_flags(dep.dst_access))
        .dependency_flags(if dep.by_region {
            vk::DependencyFlags::BY_REGION
        } else {
            vk::DependencyFlags::empty()
        })
}

/// Translated references of one subpass, kept alive while the subpass
/// descriptions point into them.
struct SubpassRefs {
    inputs: Vec<vk::AttachmentReference>,
    colors: Vec<vk::AttachmentReference>,
    resolves: Vec<vk::AttachmentReference>,
    depth_stencil: Option<vk::AttachmentReference>,
}

impl SubpassRefs {
    fn new(subpass: &SubpassDesc) -> Self {
        Self {
            inputs: subpass.inputs.iter().map(attachment_reference).collect(),
            colors: subpass.colors.iter().map(attachment_reference).collect(),
            resolves: subpass.resolves.iter().map(attachment_reference).collect(),
            depth_stencil: subpass.depth_stencil.as_ref().map(attachment_reference),
        }
    }
}

/// An immutable render pass and the description it was built from.
pub struct RenderPass {
    ctx: Arc<GpuContext>,
    render_pass: vk::RenderPass,
    desc: RenderPassDesc,
}

impl RenderPass {
    pub fn new(ctx: Arc<GpuContext>, desc: &RenderPassDesc) -> Result<Self> {
        desc.validate()?;

        let attachments = desc
            .attachments
            .iter()
            .map(attachment_description)
            .collect::<Result<Vec<_>>>()?;
        let refs: Vec<SubpassRefs> = desc.subpasses.iter().map(SubpassRefs::new).collect();
        let subpasses: Vec<vk::SubpassDescription> = desc
            .subpasses
            .iter()
            .zip(&refs)
            .map(|(subpass, refs)| {
                let mut description = vk::SubpassDescription::default()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .input_attachments(&refs.inputs)
                    .color_attachments(&refs.colors)
                    .preserve_attachments(&subpass.preserves);
                if !refs.resolves.is_empty() {
                    description = description.resolve_attachments(&refs.resolves);
                }
                if let Some(depth) = &refs.depth_stencil {
                    description = description.depth_stencil_attachment(depth);
                }
                description
            })
            .collect();
        let dependencies: Vec<vk::SubpassDependency> =
            desc.dependencies.iter().map(dependency).collect();

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass =
            unsafe { ctx.device().create_render_pass(&create_info, None) }.or_rhi("render pass")?;

        tracing::debug!(
            attachments = attachments.len(),
            subpasses = subpasses.len(),
            "Created render pass"
        );
        Ok(Self {
            ctx,
            render_pass,
            desc: desc.clone(),
        })
    }

    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn desc(&self) -> &RenderPassDesc {
        &self.desc
    }

    pub fn subpass_count(&self) -> u32 {
        self.desc.subpass_count()
    }

    pub fn subpasses(&self) -> &[SubpassDesc] {
        &self.desc.subpasses
    }

    pub fn attachment_count(&self) -> usize {
        self.desc.attachments.len()
    }
}

impl GpuResource for RenderPass {
    fn kind(&self) -> ResourceKind {
        ResourceKind::RenderPass
    }

    fn is_live(&self) -> bool {
        self.render_pass != vk::RenderPass::null()
    }

    fn destroy(&mut self) {
        if self.render_pass != vk::RenderPass::null() {
            unsafe { self.ctx.device().destroy_render_pass(self.render_pass, None) };
            self.render_pass = vk::RenderPass::null();
        }
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{Format, LoadOp, ResourceState};

    #[test]
    fn attachment_layouts_and_stencil_defaults() {
        let desc = AttachmentDesc::new(
            Format::B8G8R8A8Unorm,
            ResourceState::Undefined,
            ResourceState::Present,
        );
        let vk_desc = attachment_description(&desc).unwrap();
        assert_eq!(vk_desc.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(vk_desc.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(vk_desc.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(vk_desc.stencil_load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(vk_desc.stencil_store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(vk_desc.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(vk_desc.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        let bad = AttachmentDesc {
            sample_count: 3,
            load_op: LoadOp::Load,
            ..desc
        };
        assert!(attachment_description(&bad).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn default_dependency_is_color_to_fragment_by_region() {
        let dep = dependency(&SubpassDependency::default());
        assert_eq!(dep.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dep.dst_subpass, 0);
        assert_eq!(
            dep.src_stage_mask,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(dep.dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(dep.dependency_flags, vk::DependencyFlags::BY_REGION);
    }

    #[test]
    fn dependencies_follow_their_neutral_fields() {
        let desc = RenderPassDesc::single_color(
            Format::R8G8B8A8Unorm,
            ResourceState::Undefined,
            ResourceState::ShaderResource,
        );
        let dep = dependency(&desc.dependencies[0]);
        assert_eq!(
            dep.dst_stage_mask,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(dep.src_access_mask, vk::AccessFlags::empty());
        assert_eq!(dep.dst_access_mask, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(dep.dependency_flags, vk::DependencyFlags::empty());

        let color = attachment_reference(&desc.subpasses[0].colors[0]);
        assert_eq!(color.attachment, 0);
        assert_eq!(color.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }
}
