use ash::vk;

/// Errors reported by the Vulkan driver, plus the few failures the device layer detects itself
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VulkanError {
    #[error("Out of host memory")]
    OutOfHostMemory,
    #[error("Out of device memory")]
    OutOfDeviceMemory,
    #[error("Descriptor pool is out of memory")]
    OutOfPoolMemory,
    #[error("Descriptor pool is fragmented")]
    FragmentedPool,
    #[error("Failed to map device memory")]
    MemoryMapFailed,
    #[error("The logical device was lost")]
    DeviceLost,
    #[error("Invalid shader bytecode")]
    InvalidShader,
    #[error("No memory type matches the requested properties")]
    NoCompatibleMemoryType,
    #[error("Unexpected Vulkan result: {0}")]
    Other(vk::Result),
}

impl From<vk::Result> for VulkanError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => VulkanError::OutOfHostMemory,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => VulkanError::OutOfDeviceMemory,
            vk::Result::ERROR_OUT_OF_POOL_MEMORY => VulkanError::OutOfPoolMemory,
            vk::Result::ERROR_FRAGMENTED_POOL => VulkanError::FragmentedPool,
            vk::Result::ERROR_MEMORY_MAP_FAILED => VulkanError::MemoryMapFailed,
            vk::Result::ERROR_DEVICE_LOST => VulkanError::DeviceLost,
            vk::Result::ERROR_INVALID_SHADER_NV => VulkanError::InvalidShader,
            other => VulkanError::Other(other),
        }
    }
}
