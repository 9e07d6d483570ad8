//! Mapping of Vulkan result codes onto RHI error kinds.

use ash::vk;
pub use kiln_core::error::{Result, RhiError};

/// Classify a Vulkan error code raised while doing `what`.
pub fn classify(what: &'static str, result: vk::Result) -> RhiError {
    match result {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY
        | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
        | vk::Result::ERROR_OUT_OF_POOL_MEMORY
        | vk::Result::ERROR_FRAGMENTED_POOL
        | vk::Result::ERROR_TOO_MANY_OBJECTS => RhiError::OutOfMemory(format!("{what}: {result}")),
        vk::Result::ERROR_DEVICE_LOST => RhiError::DeviceLost,
        vk::Result::TIMEOUT => RhiError::Timeout(what.to_string()),
        other => RhiError::CreationFailed {
            what,
            reason: other.to_string(),
        },
    }
}

/// Attach context to raw Vulkan results.
pub trait VkResultExt<T> {
    /// Map the error code to an [`RhiError`] naming the failed operation.
    fn or_rhi(self, what: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for std::result::Result<T, vk::Result> {
    fn or_rhi(self, what: &'static str) -> Result<T> {
        self.map_err(|e| classify(what, e))
    }
}
