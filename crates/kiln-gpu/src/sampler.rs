//! Immutable texture samplers.

use crate::context::GpuContext;
use crate::error::{Result, VkResultExt};
use crate::translate;
use ash::vk;
use kiln_core::{GpuResource, ResourceKind, SamplerDesc};
use std::sync::Arc;

/// Build the create info for `desc`, clamping anisotropy to `max_anisotropy`.
pub fn sampler_info(desc: &SamplerDesc, max_anisotropy: f32) -> vk::SamplerCreateInfo<'static> {
    let anisotropy = desc.anisotropy_enable && max_anisotropy >= 1.0;
    vk::SamplerCreateInfo::default()
        .mag_filter(translate::filter(desc.mag_filter))
        .min_filter(translate::filter(desc.min_filter))
        .mipmap_mode(translate::mipmap_mode(desc.mipmap_mode))
        .address_mode_u(translate::address_mode(desc.address_u))
        .address_mode_v(translate::address_mode(desc.address_v))
        .address_mode_w(translate::address_mode(desc.address_w))
        .mip_lod_bias(desc.mip_lod_bias)
        .anisotropy_enable(anisotropy)
        .max_anisotropy(if anisotropy {
            desc.max_anisotropy.min(max_anisotropy)
        } else {
            1.0
        })
        .compare_enable(desc.compare_enable)
        .compare_op(translate::compare_op(desc.compare_op))
        .min_lod(desc.min_lod)
        .max_lod(desc.max_lod)
        .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
}

pub struct Sampler {
    ctx: Arc<GpuContext>,
    sampler: vk::Sampler,
}

impl Sampler {
    pub fn new(ctx: Arc<GpuContext>, desc: &SamplerDesc) -> Result<Self> {
        desc.validate()?;
        let create_info = sampler_info(desc, ctx.max_sampler_anisotropy());
        let sampler =
            unsafe { ctx.device().create_sampler(&create_info, None) }.or_rhi("sampler")?;
        Ok(Self { ctx, sampler })
    }

    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl GpuResource for Sampler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Sampler
    }

    fn is_live(&self) -> bool {
        self.sampler != vk::Sampler::null()
    }

    fn destroy(&mut self) {
        if self.sampler != vk::Sampler::null() {
            unsafe { self.ctx.device().destroy_sampler(self.sampler, None) };
            self.sampler = vk::Sampler::null();
        }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.destroy();
    }
}
