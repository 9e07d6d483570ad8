//! Window surface owned by a render device.

use crate::context::GpuContext;
use crate::error::{Result, VkResultExt};
use ash::vk;
use std::sync::Arc;

/// What the adapter supports when presenting to a surface.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// A presentable surface and its extension loader.
pub struct Surface {
    ctx: Arc<GpuContext>,
    loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
}

impl Surface {
    /// Take ownership of a surface created alongside `ctx`.
    pub fn new(ctx: Arc<GpuContext>, surface: vk::SurfaceKHR) -> Self {
        let loader = ash::khr::surface::Instance::new(ctx.entry(), ctx.instance());
        Self {
            ctx,
            loader,
            surface,
        }
    }

    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Query capabilities, formats and present modes.
    pub fn support(&self) -> Result<SurfaceSupport> {
        let physical_device = self.ctx.physical_device();
        unsafe {
            let capabilities = self
                .loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
                .or_rhi("surface capabilities query")?;
            let formats = self
                .loader
                .get_physical_device_surface_formats(physical_device, self.surface)
                .or_rhi("surface formats query")?;
            let present_modes = self
                .loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
                .or_rhi("surface present modes query")?;

            Ok(SurfaceSupport {
                capabilities,
                formats,
                present_modes,
            })
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        if self.surface != vk::SurfaceKHR::null() {
            unsafe { self.loader.destroy_surface(self.surface, None) };
            self.surface = vk::SurfaceKHR::null();
        }
    }
}
