//! CPU-GPU fences.

use crate::context::GpuContext;
use crate::error::{Result, RhiError, VkResultExt};
use ash::vk;
use kiln_core::{GpuResource, ResourceKind};
use std::sync::Arc;

/// Outcome of a bounded fence wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    Signaled,
    Timeout,
}

/// A fence signaled when a submission completes.
pub struct Fence {
    ctx: Arc<GpuContext>,
    fence: vk::Fence,
}

impl Fence {
    /// Create a fence, optionally already signaled.
    pub fn new(ctx: Arc<GpuContext>, signaled: bool) -> Result<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { ctx.device().create_fence(&create_info, None) }.or_rhi("fence")?;
        Ok(Self { ctx, fence })
    }

    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    fn live_handle(&self, op: &str) -> Result<vk::Fence> {
        if self.fence == vk::Fence::null() {
            Err(RhiError::invalid(format!("{op} on a destroyed fence")))
        } else {
            Ok(self.fence)
        }
    }

    /// Block until the fence is signaled or `timeout_ns` elapses.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait(&self, timeout_ns: u64) -> Result<FenceStatus> {
        let fence = self.live_handle("wait")?;
        match unsafe { self.ctx.device().wait_for_fences(&[fence], true, timeout_ns) } {
            Ok(()) => Ok(FenceStatus::Signaled),
            Err(vk::Result::TIMEOUT) => Ok(FenceStatus::Timeout),
            Err(e) => Err(crate::error::classify("fence wait", e)),
        }
    }

    /// Return the fence to the unsignaled state. No in-flight submission may
    /// reference it.
    pub fn reset(&self) -> Result<()> {
        let fence = self.live_handle("reset")?;
        unsafe { self.ctx.device().reset_fences(&[fence]) }.or_rhi("fence reset")
    }

    /// Reset a fence whose last submission completed, ready for the next
    /// one. An unsignaled fence may still be in flight and is refused.
    pub fn rearm(&self) -> Result<()> {
        if !self.is_signaled()? {
            return Err(RhiError::invalid("rearm of a fence that is not signaled"));
        }
        self.reset()
    }

    /// Non-blocking status query.
    pub fn is_signaled(&self) -> Result<bool> {
        let fence = self.live_handle("is_signaled")?;
        unsafe { self.ctx.device().get_fence_status(fence) }.or_rhi("fence status")
    }
}

impl GpuResource for Fence {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Fence
    }

    fn is_live(&self) -> bool {
        self.fence != vk::Fence::null()
    }

    fn destroy(&mut self) {
        if self.fence != vk::Fence::null() {
            unsafe { self.ctx.device().destroy_fence(self.fence, None) };
            self.fence = vk::Fence::null();
        }
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fence").field("fence", &self.fence).finish()
    }
}
