//! Shared Vulkan device state.
//!
//! [`GpuContext`] owns the instance, the logical device, the graphics queue
//! and the command pool. Every resource keeps an `Arc<GpuContext>`, so the
//! device outlives all handles created from it.

use crate::error::{classify, Result, RhiError, VkResultExt};
use crate::instance::{
    create_instance, device_name, instance_extensions, select_physical_device, DebugMessenger,
};
use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::c_char;

/// Raw handles of the window a context will present to.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceTarget {
    pub display: RawDisplayHandle,
    pub window: RawWindowHandle,
}

/// Parameters of context creation.
#[derive(Debug, Clone)]
pub struct ContextDesc {
    pub app_name: String,
    pub enable_validation: bool,
    pub target: Option<SurfaceTarget>,
}

/// Instance, device and queue shared by every resource.
pub struct GpuContext {
    // The loader must stay alive for the lifetime of the instance.
    entry: ash::Entry,
    instance: ash::Instance,
    debug: Option<DebugMessenger>,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    limits: vk::PhysicalDeviceLimits,
    features: vk::PhysicalDeviceFeatures,
    device_name: String,
    queue_family: u32,
    queue: Mutex<vk::Queue>,
    command_pool: Mutex<vk::CommandPool>,
}

impl GpuContext {
    /// Create the instance and device. When `desc.target` is set a surface
    /// is created for it, the chosen queue family can present to it, and the
    /// surface is returned for the caller to own.
    pub fn new(desc: &ContextDesc) -> Result<(Self, Option<vk::SurfaceKHR>)> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| RhiError::CreationFailed {
            what: "vulkan loader",
            reason: e.to_string(),
        })?;

        let extensions = instance_extensions(
            desc.target.map(|target| target.display),
            desc.enable_validation,
        )?;
        let instance =
            unsafe { create_instance(&entry, &desc.app_name, &extensions, desc.enable_validation) }?;

        match unsafe { DeviceParts::create(&entry, &instance, desc) } {
            Ok(parts) => {
                tracing::info!(
                    "Selected GPU: {} (queue family {})",
                    parts.device_name,
                    parts.queue_family
                );
                let surface = parts.surface;
                Ok((
                    Self {
                        entry,
                        instance,
                        debug: parts.debug,
                        physical_device: parts.physical_device,
                        device: parts.device,
                        memory_properties: parts.memory_properties,
                        limits: parts.limits,
                        features: parts.features,
                        device_name: parts.device_name,
                        queue_family: parts.queue_family,
                        queue: Mutex::new(parts.queue),
                        command_pool: Mutex::new(parts.command_pool),
                    },
                    surface,
                ))
            }
            Err(err) => {
                unsafe { instance.destroy_instance(None) };
                Err(err)
            }
        }
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    /// Optional features that were enabled on the device.
    pub fn features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.features
    }

    /// Largest usable sampler anisotropy, or 0 when anisotropic filtering is
    /// unavailable.
    pub fn max_sampler_anisotropy(&self) -> f32 {
        if self.features.sampler_anisotropy == vk::TRUE {
            self.limits.max_sampler_anisotropy
        } else {
            0.0
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Index of the graphics (and present) queue family.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// The graphics queue. Submissions hold the lock for their duration.
    pub fn queue(&self) -> &Mutex<vk::Queue> {
        &self.queue
    }

    /// The command pool all command buffers are allocated from.
    pub fn command_pool(&self) -> &Mutex<vk::CommandPool> {
        &self.command_pool
    }

    /// Block until every submitted command completed.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_idle(&self) -> Result<()> {
        let _queue = self.queue.lock();
        unsafe { self.device.device_wait_idle() }.or_rhi("device wait idle")
    }

    /// Submit an empty batch that signals `fence` once all earlier work on
    /// the queue completed. Restores a reset fence whose submission failed.
    pub fn signal_fence(&self, fence: vk::Fence) -> Result<()> {
        let queue = self.queue.lock();
        unsafe { self.device.queue_submit(*queue, &[], fence) }.or_rhi("fence signal submit")
    }

    /// Record `f` into a throwaway primary command buffer, submit it and wait
    /// for the queue to drain.
    ///
    /// # Safety
    /// Everything `f` records must reference live handles.
    pub unsafe fn execute_one_shot<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let pool = self.command_pool.lock();
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmd = self
            .device
            .allocate_command_buffers(&alloc_info)
            .or_rhi("one-shot command buffer")?[0];

        let result = (|| -> Result<()> {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device
                .begin_command_buffer(cmd, &begin_info)
                .or_rhi("begin one-shot commands")?;
            f(&self.device, cmd);
            self.device
                .end_command_buffer(cmd)
                .or_rhi("end one-shot commands")?;

            let cmds = [cmd];
            let submit_info = vk::SubmitInfo::default().command_buffers(&cmds);
            let queue = self.queue.lock();
            self.device
                .queue_submit(*queue, &[submit_info], vk::Fence::null())
                .or_rhi("one-shot submit")?;
            self.device
                .queue_wait_idle(*queue)
                .or_rhi("one-shot queue wait")
        })();

        self.device.free_command_buffers(*pool, &[cmd]);
        result
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device
                .destroy_command_pool(*self.command_pool.get_mut(), None);
            self.device.destroy_device(None);
            if let Some(debug) = self.debug.take() {
                debug.destroy();
            }
            self.instance.destroy_instance(None);
        }
        tracing::debug!("GPU context destroyed");
    }
}

/// Everything created on top of the instance.
struct DeviceParts {
    debug: Option<DebugMessenger>,
    surface: Option<vk::SurfaceKHR>,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    limits: vk::PhysicalDeviceLimits,
    features: vk::PhysicalDeviceFeatures,
    device_name: String,
    queue_family: u32,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
}

impl DeviceParts {
    /// Create messenger, surface, device and pool, undoing partial work on
    /// failure. The instance itself is left to the caller.
    unsafe fn create(
        entry: &ash::Entry,
        instance: &ash::Instance,
        desc: &ContextDesc,
    ) -> Result<Self> {
        let debug = if desc.enable_validation {
            Some(DebugMessenger::new(entry, instance)?)
        } else {
            None
        };

        let surface_loader = ash::khr::surface::Instance::new(entry, instance);
        let surface = match desc.target {
            Some(target) => {
                match ash_window::create_surface(entry, instance, target.display, target.window, None)
                    .or_rhi("surface")
                {
                    Ok(surface) => Some(surface),
                    Err(err) => {
                        if let Some(debug) = &debug {
                            debug.destroy();
                        }
                        return Err(err);
                    }
                }
            }
            None => None,
        };

        match LogicalDevice::create(instance, &surface_loader, surface) {
            Ok(logical) => Ok(Self {
                debug,
                surface,
                physical_device: logical.physical_device,
                memory_properties: instance
                    .get_physical_device_memory_properties(logical.physical_device),
                limits: instance
                    .get_physical_device_properties(logical.physical_device)
                    .limits,
                features: logical.features,
                device_name: device_name(instance, logical.physical_device),
                device: logical.device,
                queue_family: logical.queue_family,
                queue: logical.queue,
                command_pool: logical.command_pool,
            }),
            Err(err) => {
                if let Some(surface) = surface {
                    surface_loader.destroy_surface(surface, None);
                }
                if let Some(debug) = &debug {
                    debug.destroy();
                }
                Err(err)
            }
        }
    }
}

/// Adapter, logical device, queue and command pool.
struct LogicalDevice {
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    features: vk::PhysicalDeviceFeatures,
    queue_family: u32,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
}

impl LogicalDevice {
    unsafe fn create(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: Option<vk::SurfaceKHR>,
    ) -> Result<Self> {
        let physical_device = select_physical_device(instance)?;
        let queue_family = find_queue_family(instance, surface_loader, physical_device, surface)?;
        let (device, features) = create_device(instance, physical_device, queue_family)?;
        let queue = device.get_device_queue(queue_family, 0);

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = match device.create_command_pool(&pool_info, None) {
            Ok(pool) => pool,
            Err(e) => {
                device.destroy_device(None);
                return Err(classify("command pool", e));
            }
        };

        Ok(Self {
            physical_device,
            device,
            features,
            queue_family,
            queue,
            command_pool,
        })
    }
}

/// Find a graphics queue family that can also present to `surface`.
///
/// # Safety
/// The instance, physical device and surface must be valid.
unsafe fn find_queue_family(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    physical_device: vk::PhysicalDevice,
    surface: Option<vk::SurfaceKHR>,
) -> Result<u32> {
    let families = instance.get_physical_device_queue_family_properties(physical_device);

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            continue;
        }
        let presents = match surface {
            Some(surface) => surface_loader
                .get_physical_device_surface_support(physical_device, i, surface)
                .or_rhi("surface support query")?,
            None => true,
        };
        if presents {
            return Ok(i);
        }
    }

    Err(RhiError::CreationFailed {
        what: "queue family",
        reason: "no graphics queue family with present support".to_string(),
    })
}

/// Device extensions always enabled.
fn required_device_extensions() -> Vec<*const c_char> {
    vec![
        ash::khr::swapchain::NAME.as_ptr(),
        #[cfg(target_os = "macos")]
        ash::khr::portability_subset::NAME.as_ptr(),
    ]
}

/// Create the logical device with one graphics queue.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
) -> Result<(ash::Device, vk::PhysicalDeviceFeatures)> {
    let queue_priority = 1.0_f32;
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family)
        .queue_priorities(std::slice::from_ref(&queue_priority))];

    let extension_names = required_device_extensions();

    // Optional fixed-function features are enabled when the adapter has them.
    let supported = instance.get_physical_device_features(physical_device);
    let features = vk::PhysicalDeviceFeatures::default()
        .fill_mode_non_solid(supported.fill_mode_non_solid == vk::TRUE)
        .wide_lines(supported.wide_lines == vk::TRUE)
        .depth_clamp(supported.depth_clamp == vk::TRUE)
        .depth_bias_clamp(supported.depth_bias_clamp == vk::TRUE)
        .independent_blend(supported.independent_blend == vk::TRUE)
        .dual_src_blend(supported.dual_src_blend == vk::TRUE)
        .sampler_anisotropy(supported.sampler_anisotropy == vk::TRUE)
        .sample_rate_shading(supported.sample_rate_shading == vk::TRUE);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    let device = instance
        .create_device(physical_device, &device_create_info, None)
        .or_rhi("logical device")?;
    Ok((device, features))
}
