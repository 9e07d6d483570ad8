//! Render pass and framebuffer descriptions.

use crate::barrier::{AccessFlags, PipelineStages, ResourceState};
use crate::error::{Result, RhiError};
use crate::format::Format;

/// What happens to an attachment's contents when a pass begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

/// What happens to an attachment's contents when a pass ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Store,
    DontCare,
}

/// One attachment of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentDesc {
    pub format: Format,
    pub sample_count: u32,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    pub initial_state: ResourceState,
    pub final_state: ResourceState,
}

impl AttachmentDesc {
    /// A single-sampled attachment that is cleared and stored, with stencil
    /// contents ignored.
    pub const fn new(format: Format, initial: ResourceState, final_state: ResourceState) -> Self {
        Self {
            format,
            sample_count: 1,
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
            stencil_load_op: LoadOp::DontCare,
            stencil_store_op: StoreOp::DontCare,
            initial_state: initial,
            final_state,
        }
    }
}

/// Reference from a subpass to an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentRef {
    pub index: u32,
    /// State the attachment is in during the subpass.
    pub state: ResourceState,
}

impl AttachmentRef {
    pub const fn new(index: u32, state: ResourceState) -> Self {
        Self { index, state }
    }
}

/// One subpass of a render pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SubpassDesc {
    pub inputs: Vec<AttachmentRef>,
    pub colors: Vec<AttachmentRef>,
    pub depth_stencil: Option<AttachmentRef>,
    /// Either empty or one entry per color reference.
    pub resolves: Vec<AttachmentRef>,
    /// Attachments whose contents must survive this subpass untouched.
    pub preserves: Vec<u32>,
}

/// A subpass index or the "outside the render pass" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubpassIndex {
    External,
    Index(u32),
}

/// Execution and memory dependency between two subpasses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubpassDependency {
    pub src_subpass: SubpassIndex,
    pub dst_subpass: SubpassIndex,
    pub src_stages: PipelineStages,
    pub dst_stages: PipelineStages,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub by_region: bool,
}

impl SubpassDependency {
    /// Color output of `src` feeding fragment shader reads of `dst`, per region.
    pub const fn color_to_fragment(src: SubpassIndex, dst: SubpassIndex) -> Self {
        Self {
            src_subpass: src,
            dst_subpass: dst,
            src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
            dst_stages: PipelineStages::FRAGMENT_SHADER,
            src_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_access: AccessFlags::INPUT_ATTACHMENT_READ,
            by_region: true,
        }
    }
}

impl Default for SubpassDependency {
    fn default() -> Self {
        Self::color_to_fragment(SubpassIndex::External, SubpassIndex::Index(0))
    }
}

/// Complete description of a render pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RenderPassDesc {
    pub attachments: Vec<AttachmentDesc>,
    pub subpasses: Vec<SubpassDesc>,
    pub dependencies: Vec<SubpassDependency>,
}

impl RenderPassDesc {
    /// A single subpass writing one color attachment.
    pub fn single_color(format: Format, initial: ResourceState, final_state: ResourceState) -> Self {
        Self {
            attachments: vec![AttachmentDesc::new(format, initial, final_state)],
            subpasses: vec![SubpassDesc {
                colors: vec![AttachmentRef::new(0, ResourceState::RenderTarget)],
                ..SubpassDesc::default()
            }],
            dependencies: vec![SubpassDependency {
                src_subpass: SubpassIndex::External,
                dst_subpass: SubpassIndex::Index(0),
                src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                dst_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                src_access: AccessFlags::empty(),
                dst_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
                by_region: false,
            }],
        }
    }

    /// Number of subpasses.
    pub fn subpass_count(&self) -> u32 {
        self.subpasses.len() as u32
    }

    /// Check that every attachment and subpass index is in range.
    pub fn validate(&self) -> Result<()> {
        if self.subpasses.is_empty() {
            return Err(RhiError::invalid("render pass needs at least one subpass"));
        }

        let attachment_count = self.attachments.len() as u32;
        let check = |subpass: usize, what: &str, index: u32| {
            if index < attachment_count {
                Ok(())
            } else {
                Err(RhiError::invalid(format!(
                    "subpass {subpass} {what} references attachment {index}, \
                     render pass has {attachment_count}"
                )))
            }
        };

        for (i, subpass) in self.subpasses.iter().enumerate() {
            for r in &subpass.inputs {
                check(i, "input", r.index)?;
            }
            for r in &subpass.colors {
                check(i, "color", r.index)?;
            }
            if let Some(r) = &subpass.depth_stencil {
                check(i, "depth-stencil", r.index)?;
                if !self.attachments[r.index as usize].format.has_depth() {
                    return Err(RhiError::invalid(format!(
                        "subpass {i} depth-stencil attachment {} has color format {:?}",
                        r.index, self.attachments[r.index as usize].format
                    )));
                }
            }
            if !subpass.resolves.is_empty() && subpass.resolves.len() != subpass.colors.len() {
                return Err(RhiError::invalid(format!(
                    "subpass {i} has {} resolve references for {} color references",
                    subpass.resolves.len(),
                    subpass.colors.len()
                )));
            }
            for r in &subpass.resolves {
                check(i, "resolve", r.index)?;
            }
            for &index in &subpass.preserves {
                check(i, "preserve", index)?;
            }
        }

        let subpass_count = self.subpass_count();
        for (i, dep) in self.dependencies.iter().enumerate() {
            for index in [dep.src_subpass, dep.dst_subpass] {
                if let SubpassIndex::Index(s) = index {
                    if s >= subpass_count {
                        return Err(RhiError::invalid(format!(
                            "dependency {i} names subpass {s}, render pass has {subpass_count}"
                        )));
                    }
                }
            }
            if dep.src_subpass == SubpassIndex::External && dep.dst_subpass == SubpassIndex::External
            {
                return Err(RhiError::invalid(format!(
                    "dependency {i} is external on both sides"
                )));
            }
        }

        Ok(())
    }
}

/// Format and size of one view bound to a framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferAttachment {
    pub format: Format,
    pub width: u32,
    pub height: u32,
}

/// Check that `attachments` conform to `pass` and share one size.
///
/// Returns the common `(width, height)`.
pub fn validate_framebuffer(
    pass: &RenderPassDesc,
    attachments: &[FramebufferAttachment],
) -> Result<(u32, u32)> {
    let first = attachments
        .first()
        .ok_or_else(|| RhiError::invalid("framebuffer needs at least one attachment"))?;

    if attachments.len() != pass.attachments.len() {
        return Err(RhiError::invalid(format!(
            "framebuffer has {} attachments, render pass expects {}",
            attachments.len(),
            pass.attachments.len()
        )));
    }

    for (i, (attachment, expected)) in attachments.iter().zip(&pass.attachments).enumerate() {
        if attachment.width != first.width || attachment.height != first.height {
            return Err(RhiError::invalid(format!(
                "attachment {i} is {}x{}, attachment 0 is {}x{}",
                attachment.width, attachment.height, first.width, first.height
            )));
        }
        if attachment.format != expected.format {
            return Err(RhiError::invalid(format!(
                "attachment {i} has format {:?}, render pass expects {:?}",
                attachment.format, expected.format
            )));
        }
    }

    Ok((first.width, first.height))
}
