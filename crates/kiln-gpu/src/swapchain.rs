//! Swap chain, per-image framebuffers and per-frame synchronization.

use crate::context::GpuContext;
use crate::error::{classify, Result, RhiError, VkResultExt};
use crate::fence::{Fence, FenceStatus};
use crate::framebuffer::Framebuffer;
use crate::render_pass::RenderPass;
use crate::surface::Surface;
use crate::translate;
use ash::vk;
use kiln_core::{Format, GpuResource, ResourceKind, SwapChainEffect};
use std::sync::Arc;

/// Color format of every swap-chain image.
pub const SWAP_CHAIN_FORMAT: Format = Format::B8G8R8A8Unorm;

/// Result of acquiring the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStatus {
    /// The image at this index is the target of the current frame.
    Acquired(u32),
    /// The swap chain no longer matches the surface; resize before drawing.
    NeedsRebuild,
}

/// Result of queueing an image for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    /// Presented or dropped, and the swap chain should be rebuilt.
    NeedsRebuild,
}

/// Parameters of swap-chain creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainDesc {
    /// Requested number of images. The surface may grant a different count.
    pub frame_count: u32,
    pub width: u32,
    pub height: u32,
    pub effect: SwapChainEffect,
}

/// Index of the current frame within a fixed ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRing {
    count: usize,
    index: usize,
}

impl FrameRing {
    /// A ring of `count` frames, at least one.
    pub fn new(count: usize) -> Self {
        Self {
            count: count.max(1),
            index: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Step to the next frame and return its index.
    pub fn advance(&mut self) -> usize {
        self.index = (self.index + 1) % self.count;
        self.index
    }
}

/// Image count to request, within what the surface allows. A maximum of
/// zero means unbounded.
pub fn image_count(requested: u32, caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = requested.max(caps.min_image_count);
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

/// `requested` clamped to the surface's extent limits.
pub fn clamp_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// Identity when supported, otherwise whatever the surface currently uses.
pub fn pre_transform(caps: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
    if caps
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        caps.current_transform
    }
}

/// The mode `effect` maps to when the surface offers it, FIFO otherwise.
pub fn select_present_mode(
    effect: SwapChainEffect,
    available: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    let wanted = translate::present_mode(effect);
    if available.contains(&wanted) {
        wanted
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Whether the surface accepts B8G8R8A8_UNORM in the sRGB non-linear space.
pub fn supports_swap_chain_format(formats: &[vk::SurfaceFormatKHR]) -> bool {
    formats.iter().any(|f| {
        f.format == translate::format(SWAP_CHAIN_FORMAT)
            && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    })
}

pub struct SwapChain {
    ctx: Arc<GpuContext>,
    surface: Arc<Surface>,
    loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    framebuffers: Vec<Arc<Framebuffer>>,
    render_pass: Arc<RenderPass>,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    desc: SwapChainDesc,
    fences: Vec<Fence>,
    image_available: Vec<vk::Semaphore>,
    render_finished: Vec<vk::Semaphore>,
    frames: FrameRing,
    current_image: Option<u32>,
}

impl SwapChain {
    /// Create the swap chain and one framebuffer per image bound to
    /// `render_pass`, which must take a single swap-chain color attachment.
    pub fn new(
        ctx: Arc<GpuContext>,
        surface: Arc<Surface>,
        render_pass: Arc<RenderPass>,
        desc: &SwapChainDesc,
    ) -> Result<Self> {
        if desc.frame_count == 0 {
            return Err(RhiError::invalid("swap chain needs at least one frame"));
        }
        let loader = ash::khr::swapchain::Device::new(ctx.instance(), ctx.device());
        let mut swap_chain = Self {
            ctx,
            surface,
            loader,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            views: Vec::new(),
            framebuffers: Vec::new(),
            render_pass,
            extent: vk::Extent2D::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            desc: *desc,
            fences: Vec::new(),
            image_available: Vec::new(),
            render_finished: Vec::new(),
            frames: FrameRing::new(1),
            current_image: None,
        };
        swap_chain.build(desc.width, desc.height)?;
        Ok(swap_chain)
    }

    /// Rebuild for a new window size, retiring the current handle.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(RhiError::invalid(format!(
                "swap chain resize to {width}x{height}"
            )));
        }
        self.build(width, height)
    }

    /// Rebuild the per-image framebuffers against another render pass.
    pub fn set_render_pass(&mut self, render_pass: Arc<RenderPass>) -> Result<()> {
        self.render_pass = render_pass;
        self.build(self.extent.width, self.extent.height)
    }

    fn build(&mut self, width: u32, height: u32) -> Result<()> {
        let support = self.surface.support()?;
        if !supports_swap_chain_format(&support.formats) {
            return Err(RhiError::CreationFailed {
                what: "swap chain",
                reason: "surface does not support B8G8R8A8_UNORM with sRGB non-linear color"
                    .to_string(),
            });
        }
        let caps = &support.capabilities;
        let extent = clamp_extent(caps, width, height);
        let present_mode = select_present_mode(self.desc.effect, &support.present_modes);
        let families = [self.ctx.queue_family()];
        let old = self.swapchain;

        if old != vk::SwapchainKHR::null() {
            self.ctx.wait_idle()?;
        }

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface.handle())
            .min_image_count(image_count(self.desc.frame_count, caps))
            .image_format(translate::format(SWAP_CHAIN_FORMAT))
            .image_color_space(vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .queue_family_indices(&families)
            .pre_transform(pre_transform(caps))
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old);

        let swapchain =
            unsafe { self.loader.create_swapchain(&create_info, None) }.or_rhi("swap chain")?;

        // The retired chain and everything built on it go before the new
        // images are wired up.
        self.release_frames();
        self.release_images();
        if old != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(old, None) };
        }
        self.swapchain = swapchain;
        self.extent = extent;
        self.present_mode = present_mode;
        self.current_image = None;

        self.images =
            unsafe { self.loader.get_swapchain_images(swapchain) }.or_rhi("swap chain images")?;
        let image_total = self.images.len();
        if image_total != self.desc.frame_count as usize {
            tracing::warn!(
                requested = self.desc.frame_count,
                granted = image_total,
                "Swap chain image count differs from the requested frame count"
            );
        }

        for &image in &self.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(translate::format(SWAP_CHAIN_FORMAT))
                .components(vk::ComponentMapping::default())
                .subresource_range(crate::barrier::ImageRange::COLOR.subresource());
            let view = unsafe { self.ctx.device().create_image_view(&view_info, None) }
                .or_rhi("swap chain image view")?;
            self.views.push(view);
        }

        for &view in &self.views {
            let framebuffer = Framebuffer::from_views(
                Arc::clone(&self.ctx),
                Arc::clone(&self.render_pass),
                &[view],
                SWAP_CHAIN_FORMAT,
                extent,
            )?;
            self.framebuffers.push(Arc::new(framebuffer));
        }

        self.create_frames(image_total)?;

        tracing::info!(
            width = extent.width,
            height = extent.height,
            images = image_total,
            ?present_mode,
            "Swap chain built"
        );
        Ok(())
    }

    fn create_frames(&mut self, count: usize) -> Result<()> {
        let device = self.ctx.device();
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        for _ in 0..count {
            self.fences.push(Fence::new(Arc::clone(&self.ctx), true)?);
            let available = unsafe { device.create_semaphore(&semaphore_info, None) }
                .or_rhi("image available semaphore")?;
            self.image_available.push(available);
            let finished = unsafe { device.create_semaphore(&semaphore_info, None) }
                .or_rhi("render finished semaphore")?;
            self.render_finished.push(finished);
        }
        self.frames = FrameRing::new(count);
        Ok(())
    }

    fn release_frames(&mut self) {
        let device = self.ctx.device();
        unsafe {
            for semaphore in self.image_available.drain(..) {
                device.destroy_semaphore(semaphore, None);
            }
            for semaphore in self.render_finished.drain(..) {
                device.destroy_semaphore(semaphore, None);
            }
        }
        self.fences.clear();
    }

    fn release_images(&mut self) {
        for framebuffer in &self.framebuffers {
            if Arc::strong_count(framebuffer) > 1 {
                tracing::warn!("Swap chain framebuffer still referenced while rebuilding");
            }
        }
        self.framebuffers.clear();
        for view in self.views.drain(..) {
            unsafe { self.ctx.device().destroy_image_view(view, None) };
        }
        self.images.clear();
    }

    /// Acquire the image the current frame renders into. An image still held
    /// from a frame whose submission failed is handed out again.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn acquire_next_image(&mut self) -> Result<AcquireStatus> {
        if !self.is_live() {
            return Err(RhiError::invalid("acquire from a destroyed swap chain"));
        }
        if let Some(index) = self.current_image {
            return Ok(AcquireStatus::Acquired(index));
        }
        let semaphore = self.image_available[self.frames.index()];
        let result = unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        };
        match result {
            // A suboptimal image is still signaled and usable; present reports it.
            Ok((index, _suboptimal)) => {
                self.current_image = Some(index);
                Ok(AcquireStatus::Acquired(index))
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireStatus::NeedsRebuild),
            Err(e) => Err(classify("acquire next image", e)),
        }
    }

    /// Submit `cmd` for the acquired image against the frame fence, queue the
    /// image for presentation and advance the frame index.
    ///
    /// The frame fence must be signaled, so wait for the frame first. If the
    /// submit fails the fence is signaled again and the image stays acquired
    /// with its semaphore pending, ready for the next attempt.
    ///
    /// # Safety
    /// `cmd` must be an executable primary command buffer from this device.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub(crate) unsafe fn present(&mut self, cmd: vk::CommandBuffer) -> Result<PresentStatus> {
        let image = self
            .current_image
            .ok_or_else(|| RhiError::invalid("present without an acquired image"))?;
        let frame = self.frames.index();
        let fence = &self.fences[frame];
        fence.rearm()?;

        let wait_semaphores = [self.image_available[frame]];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::TRANSFER];
        let signal_semaphores = [self.render_finished[image as usize]];
        let cmds = [cmd];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&cmds)
            .signal_semaphores(&signal_semaphores);

        let swapchains = [self.swapchain];
        let image_indices = [image];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = {
            let queue = self.ctx.queue().lock();
            match self
                .ctx
                .device()
                .queue_submit(*queue, &[submit_info], fence.handle())
            {
                Ok(()) => Ok(self.loader.queue_present(*queue, &present_info)),
                Err(e) => Err(e),
            }
        };
        let result = match result {
            Ok(presented) => presented,
            Err(e) => {
                if let Err(signal) = self.ctx.signal_fence(fence.handle()) {
                    tracing::error!("Frame fence could not be signaled again: {signal}");
                }
                return Err(classify("frame submit", e));
            }
        };
        self.current_image = None;
        self.frames.advance();

        match result {
            Ok(false) => Ok(PresentStatus::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::NeedsRebuild),
            Err(e) => Err(classify("queue present", e)),
        }
    }

    /// Wait until the GPU finished the last submission of the current frame.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_current_frame(&self, timeout_ns: u64) -> Result<FenceStatus> {
        match self.fences.get(self.frames.index()) {
            Some(fence) => fence.wait(timeout_ns),
            None => Err(RhiError::invalid("wait on a destroyed swap chain")),
        }
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn format(&self) -> Format {
        SWAP_CHAIN_FORMAT
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Number of frames in flight, equal to the number of images.
    pub fn frame_count(&self) -> usize {
        self.frames.count()
    }

    pub fn frame_index(&self) -> usize {
        self.frames.index()
    }

    /// Fence of frame `index`.
    pub fn frame_fence(&self, index: usize) -> Option<&Fence> {
        self.fences.get(index)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Index of the acquired image, if the frame has one.
    pub fn current_image(&self) -> Option<u32> {
        self.current_image
    }

    pub fn current_image_handle(&self) -> Option<vk::Image> {
        self.current_image
            .and_then(|index| self.images.get(index as usize).copied())
    }

    pub fn current_framebuffer(&self) -> Option<&Arc<Framebuffer>> {
        self.current_image
            .and_then(|index| self.framebuffers.get(index as usize))
    }

    pub fn framebuffer(&self, index: usize) -> Option<&Arc<Framebuffer>> {
        self.framebuffers.get(index)
    }

    pub fn render_pass(&self) -> &Arc<RenderPass> {
        &self.render_pass
    }
}

impl GpuResource for SwapChain {
    fn kind(&self) -> ResourceKind {
        ResourceKind::SwapChain
    }

    fn is_live(&self) -> bool {
        self.swapchain != vk::SwapchainKHR::null()
    }

    fn destroy(&mut self) {
        if !self.is_live() {
            return;
        }
        if let Err(err) = self.ctx.wait_idle() {
            tracing::warn!("Wait before swap chain destruction failed: {err}");
        }
        self.release_frames();
        self.release_images();
        unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
        self.swapchain = vk::SwapchainKHR::null();
        self.current_image = None;
        tracing::debug!("Swap chain destroyed");
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 4,
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY
                | vk::SurfaceTransformFlagsKHR::ROTATE_90,
            current_transform: vk::SurfaceTransformFlagsKHR::ROTATE_90,
            ..Default::default()
        }
    }

    #[test]
    fn frame_ring_wraps() {
        let mut ring = FrameRing::new(2);
        assert_eq!(ring.index(), 0);
        assert_eq!(ring.advance(), 1);
        assert_eq!(ring.advance(), 0);

        let mut empty = FrameRing::new(0);
        assert_eq!(empty.count(), 1);
        assert_eq!(empty.advance(), 0);
    }

    #[test]
    fn image_count_respects_surface_bounds() {
        let caps = caps();
        assert_eq!(image_count(1, &caps), 2);
        assert_eq!(image_count(3, &caps), 3);
        assert_eq!(image_count(8, &caps), 4);

        let unbounded = vk::SurfaceCapabilitiesKHR {
            max_image_count: 0,
            ..caps
        };
        assert_eq!(image_count(8, &unbounded), 8);
    }

    #[test]
    fn extent_is_clamped() {
        let caps = caps();
        let extent = clamp_extent(&caps, 1024, 768);
        assert_eq!((extent.width, extent.height), (1024, 768));
        let extent = clamp_extent(&caps, 0, 10_000);
        assert_eq!((extent.width, extent.height), (1, 4096));
    }

    #[test]
    fn identity_transform_preferred() {
        let caps = caps();
        assert_eq!(pre_transform(&caps), vk::SurfaceTransformFlagsKHR::IDENTITY);
        let rotated_only = vk::SurfaceCapabilitiesKHR {
            supported_transforms: vk::SurfaceTransformFlagsKHR::ROTATE_90,
            ..caps
        };
        assert_eq!(
            pre_transform(&rotated_only),
            vk::SurfaceTransformFlagsKHR::ROTATE_90
        );
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            select_present_mode(SwapChainEffect::FlipDiscard, &available),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            select_present_mode(SwapChainEffect::Discard, &available),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            select_present_mode(SwapChainEffect::FlipSequential, &available),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn swap_chain_format_must_be_offered() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            ..unorm
        };
        assert!(supports_swap_chain_format(&[srgb, unorm]));
        assert!(!supports_swap_chain_format(&[srgb]));
    }
}
