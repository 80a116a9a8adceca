use ash::vk;
use bitflags::bitflags;

bitflags! {
    pub struct BufferUsageFlags: u32 {
        const TRANSFER_SRC = 0x1;
        const TRANSFER_DST = 0x2;
        const UNIFORM_TEXEL = 0x4;
        const STORAGE_TEXEL = 0x8;
        const UNIFORM_BUFFER = 0x10;
        const STORAGE_BUFFER = 0x20;
        const INDEX_BUFFER = 0x40;
        const VERTEX_BUFFER = 0x80;
        const INDIRECT_BUFFER = 0x100;
    }
}

impl Into<vk::BufferUsageFlags> for BufferUsageFlags {
    fn into(self) -> vk::BufferUsageFlags {
        vk::BufferUsageFlags::from_raw(self.bits())
    }
}

bitflags! {
    pub struct MemoryPropertyFlags: u32 {
        const DEVICE_LOCAL = 0b1;
        const HOST_VISIBLE = 0b10;
        const HOST_COHERENT = 0b100;
        const HOST_CACHED = 0b1000;
        const LAZILY_ALLOCATED = 0b10000;
    }
}

impl Into<vk::MemoryPropertyFlags> for MemoryPropertyFlags {
    fn into(self) -> vk::MemoryPropertyFlags {
        vk::MemoryPropertyFlags::from_raw(self.bits())
    }
}

/// Device-side buffer together with the memory backing it
///
/// This is plain data; whoever created it through a [RenderDevice](crate::device::RenderDevice)
/// is responsible for handing it back to the same device for destruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceBuffer {
    pub handle: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: u64,
}

impl DeviceBuffer {
    /// Descriptor info covering the whole buffer
    pub fn descriptor(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.handle,
            offset: 0,
            range: self.size,
        }
    }
}

/// Picks the first memory type allowed by `type_bits` that has all of `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    properties: MemoryPropertyFlags,
) -> Option<u32> {
    let properties: vk::MemoryPropertyFlags = properties.into();

    (0..memory_properties.memory_type_count).find(|&index| {
        type_bits & (1 << index) != 0
            && memory_properties.memory_types[index as usize]
                .property_flags
                .contains(properties)
    })
}
