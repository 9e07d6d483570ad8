//! Image memory barriers built from neutral state transitions.

use crate::translate;
use ash::vk;
use kiln_core::Transition;

/// Subresources a barrier covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRange {
    pub aspect: vk::ImageAspectFlags,
    pub mip_levels: u32,
    pub array_layers: u32,
}

impl ImageRange {
    /// A single-mip, single-layer color image such as a swap-chain image.
    pub const COLOR: Self = Self {
        aspect: vk::ImageAspectFlags::COLOR,
        mip_levels: 1,
        array_layers: 1,
    };

    pub fn subresource(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange::default()
            .aspect_mask(self.aspect)
            .base_mip_level(0)
            .level_count(self.mip_levels)
            .base_array_layer(0)
            .layer_count(self.array_layers)
    }
}

/// Source and destination stage masks of `transition`.
pub fn stage_masks(transition: Transition) -> (vk::PipelineStageFlags, vk::PipelineStageFlags) {
    (
        translate::pipeline_stages(transition.before.stages()),
        translate::pipeline_stages(transition.after.stages()),
    )
}

/// Layout and access change of `image` for `transition`.
pub fn image_barrier(
    image: vk::Image,
    range: ImageRange,
    transition: Transition,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .src_access_mask(translate::access_flags(transition.before.access()))
        .dst_access_mask(translate::access_flags(transition.after.access()))
        .old_layout(translate::image_layout(transition.before))
        .new_layout(translate::image_layout(transition.after))
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range.subresource())
}

/// Record the barrier for `transition` into `cmd`.
///
/// # Safety
/// `cmd` must be recording outside a render pass and `image` must be live.
pub unsafe fn record(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    range: ImageRange,
    transition: Transition,
) {
    let (src_stage, dst_stage) = stage_masks(transition);
    let barrier = image_barrier(image, range, transition);
    device.cmd_pipeline_barrier(
        cmd,
        src_stage,
        dst_stage,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[barrier],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::ResourceState;

    #[test]
    fn render_target_to_present() {
        let image = vk::Image::null();
        let transition = Transition::render_target_to_present();
        let barrier = image_barrier(image, ImageRange::COLOR, transition);

        assert_eq!(barrier.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(
            barrier.src_access_mask,
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        );
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags::empty());
        assert_eq!(barrier.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(barrier.subresource_range.level_count, 1);
        assert_eq!(barrier.subresource_range.layer_count, 1);

        assert_eq!(
            stage_masks(transition),
            (
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE
            )
        );
    }

    #[test]
    fn present_to_render_target_is_the_inverse() {
        let transition = Transition::present_to_render_target();
        let barrier = image_barrier(vk::Image::null(), ImageRange::COLOR, transition);
        assert_eq!(barrier.old_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(barrier.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(
            stage_masks(transition),
            (
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            )
        );
    }

    #[test]
    fn upload_transitions() {
        let range = ImageRange {
            aspect: vk::ImageAspectFlags::COLOR,
            mip_levels: 4,
            array_layers: 2,
        };
        let to_copy = Transition::new(ResourceState::Undefined, ResourceState::CopyDest);
        let barrier = image_barrier(vk::Image::null(), range, to_copy);
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(barrier.subresource_range.level_count, 4);
        assert_eq!(barrier.subresource_range.layer_count, 2);
        assert_eq!(
            stage_masks(to_copy),
            (
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER
            )
        );

        let to_read = Transition::new(ResourceState::CopyDest, ResourceState::ShaderResource);
        let barrier = image_barrier(vk::Image::null(), range, to_read);
        assert_eq!(barrier.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags::SHADER_READ);
    }
}
