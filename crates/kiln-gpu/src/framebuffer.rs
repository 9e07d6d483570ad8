//! Framebuffers binding image views to a render pass.

use crate::context::GpuContext;
use crate::error::{Result, VkResultExt};
use crate::render_pass::RenderPass;
use crate::texture::Texture;
use ash::vk;
use kiln_core::{validate_framebuffer, Format, FramebufferAttachment, GpuResource, ResourceKind};
use std::sync::Arc;

pub struct Framebuffer {
    ctx: Arc<GpuContext>,
    framebuffer: vk::Framebuffer,
    render_pass: Arc<RenderPass>,
    views: Vec<vk::ImageView>,
    width: u32,
    height: u32,
}

impl Framebuffer {
    /// Bind the default views of `textures`, in attachment order.
    pub fn new(
        ctx: Arc<GpuContext>,
        render_pass: Arc<RenderPass>,
        textures: &[&Texture],
    ) -> Result<Self> {
        let attachments: Vec<FramebufferAttachment> = textures
            .iter()
            .map(|t| FramebufferAttachment {
                format: t.format(),
                width: t.width(),
                height: t.height(),
            })
            .collect();
        let views: Vec<vk::ImageView> = textures.iter().map(|t| t.view()).collect();
        Self::build(ctx, render_pass, &attachments, views)
    }

    /// Bind externally owned views, such as swap-chain images, that all have
    /// `format` and `extent`.
    pub fn from_views(
        ctx: Arc<GpuContext>,
        render_pass: Arc<RenderPass>,
        views: &[vk::ImageView],
        format: Format,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let attachments = vec![
            FramebufferAttachment {
                format,
                width: extent.width,
                height: extent.height,
            };
            views.len()
        ];
        Self::build(ctx, render_pass, &attachments, views.to_vec())
    }

    fn build(
        ctx: Arc<GpuContext>,
        render_pass: Arc<RenderPass>,
        attachments: &[FramebufferAttachment],
        views: Vec<vk::ImageView>,
    ) -> Result<Self> {
        let (width, height) = validate_framebuffer(render_pass.desc(), attachments)?;

        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(&views)
            .width(width)
            .height(height)
            .layers(1);

        let framebuffer =
            unsafe { ctx.device().create_framebuffer(&create_info, None) }.or_rhi("framebuffer")?;

        Ok(Self {
            ctx,
            framebuffer,
            render_pass,
            views,
            width,
            height,
        })
    }

    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    pub fn render_pass(&self) -> &Arc<RenderPass> {
        &self.render_pass
    }

    /// Bound views in attachment order.
    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

impl GpuResource for Framebuffer {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Framebuffer
    }

    fn is_live(&self) -> bool {
        self.framebuffer != vk::Framebuffer::null()
    }

    fn destroy(&mut self) {
        if self.framebuffer != vk::Framebuffer::null() {
            unsafe { self.ctx.device().destroy_framebuffer(self.framebuffer, None) };
            self.framebuffer = vk::Framebuffer::null();
            self.views.clear();
        }
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("framebuffer", &self.framebuffer)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}
