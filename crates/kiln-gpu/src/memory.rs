//! Device memory: memory-type selection and dedicated allocations.
//!
//! Every resource owns its own `VkDeviceMemory`; there is no sub-allocation.

use crate::context::GpuContext;
use crate::error::{Result, RhiError, VkResultExt};
use ash::vk;

/// Find the first memory type allowed by `type_filter` whose property flags
/// contain `required`.
pub fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32> {
    (0..properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32))
        .find(|&i| {
            (type_filter >> i) & 1 == 1
                && properties.memory_types[i as usize]
                    .property_flags
                    .contains(required)
        })
        .ok_or(RhiError::NoMatchingMemoryType {
            type_filter,
            required: required.as_raw(),
        })
}

/// Memory for host-visible resources that are written from the CPU.
pub const HOST_VISIBLE_COHERENT: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Allocate memory satisfying `requirements` with the `required` properties.
///
/// # Safety
/// The context must be valid.
pub unsafe fn allocate(
    ctx: &GpuContext,
    requirements: vk::MemoryRequirements,
    required: vk::MemoryPropertyFlags,
) -> Result<vk::DeviceMemory> {
    let memory_type_index = find_memory_type(
        ctx.memory_properties(),
        requirements.memory_type_bits,
        required,
    )?;

    let alloc_info = vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    ctx.device()
        .allocate_memory(&alloc_info, None)
        .or_rhi("device memory")
}

/// Copy `bytes` to offset 0 of host-visible `memory`.
///
/// # Safety
/// `memory` must be host visible, unmapped and at least `bytes.len()` long.
pub unsafe fn write_mapped(ctx: &GpuContext, memory: vk::DeviceMemory, bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Ok(());
    }
    let ptr = ctx
        .device()
        .map_memory(memory, 0, bytes.len() as u64, vk::MemoryMapFlags::empty())
        .or_rhi("map memory")?;
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
    ctx.device().unmap_memory(memory);
    Ok(())
}

/// Read `len` bytes from offset 0 of host-visible `memory`.
///
/// # Safety
/// `memory` must be host visible, unmapped and at least `len` long.
pub unsafe fn read_mapped(ctx: &GpuContext, memory: vk::DeviceMemory, len: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; len];
    if len == 0 {
        return Ok(out);
    }
    let ptr = ctx
        .device()
        .map_memory(memory, 0, len as u64, vk::MemoryMapFlags::empty())
        .or_rhi("map memory")?;
    std::ptr::copy_nonoverlapping(ptr.cast::<u8>(), out.as_mut_ptr(), len);
    ctx.device().unmap_memory(memory);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            memory_heap_count: 1,
            ..Default::default()
        };
        for (slot, &flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = flags;
            slot.heap_index = 0;
        }
        props
    }

    #[test]
    fn picks_first_type_in_filter_with_required_flags() {
        let props = properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            HOST_VISIBLE_COHERENT,
            HOST_VISIBLE_COHERENT | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);

        assert_eq!(find_memory_type(&props, 0b1111, HOST_VISIBLE_COHERENT), Ok(2));
        assert_eq!(find_memory_type(&props, 0b1000, HOST_VISIBLE_COHERENT), Ok(3));
        assert_eq!(
            find_memory_type(&props, 0b0011, vk::MemoryPropertyFlags::HOST_VISIBLE),
            Ok(1)
        );
    }

    #[test]
    fn result_satisfies_filter_and_flags() {
        let props = properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            HOST_VISIBLE_COHERENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | HOST_VISIBLE_COHERENT,
        ]);
        for filter in 0u32..8 {
            match find_memory_type(&props, filter, HOST_VISIBLE_COHERENT) {
                Ok(i) => {
                    assert_eq!((filter >> i) & 1, 1);
                    assert!(props.memory_types[i as usize]
                        .property_flags
                        .contains(HOST_VISIBLE_COHERENT));
                }
                Err(err) => assert_eq!(
                    err,
                    RhiError::NoMatchingMemoryType {
                        type_filter: filter,
                        required: HOST_VISIBLE_COHERENT.as_raw(),
                    }
                ),
            }
        }
    }

    #[test]
    fn no_candidate_is_an_error() {
        let props = properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let err = find_memory_type(&props, 0b1, HOST_VISIBLE_COHERENT).unwrap_err();
        assert!(matches!(err, RhiError::NoMatchingMemoryType { .. }));

        // Types beyond the reported count are never considered.
        let props = properties(&[]);
        assert!(find_memory_type(&props, u32::MAX, vk::MemoryPropertyFlags::empty()).is_err());
    }
}
