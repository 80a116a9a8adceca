use ash::vk;
use parking_lot::{Mutex, RwLock};

use super::RenderDevice;
use crate::{
    buffer::{find_memory_type, BufferUsageFlags, DeviceBuffer, MemoryPropertyFlags},
    config::DeviceConfig,
    descriptors::{
        allocator::{DescriptorAllocator, DescriptorAllocatorError},
        DescriptorResource, DescriptorSetBinding, DescriptorWrite,
    },
    textures::TextureRegistry,
    uniform::TextureHandle,
    VulkanError,
};

/// [RenderDevice] backed by a Vulkan logical device
///
/// The logical device itself is owned by whoever initialized the renderer; it must outlive this
/// wrapper and everything created through it. The wrapper owns the descriptor pools and the
/// texture table.
pub struct VulkanDevice {
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    descriptor_allocator: Mutex<DescriptorAllocator>,
    textures: RwLock<TextureRegistry>,

    handle: ash::Device,
}

impl VulkanDevice {
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        config: DeviceConfig,
    ) -> VulkanDevice {
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        VulkanDevice {
            memory_properties,
            descriptor_allocator: Mutex::new(DescriptorAllocator::new(
                device.clone(),
                config.sets_per_pool,
            )),
            textures: RwLock::new(TextureRegistry::new()),
            handle: device,
        }
    }
}

impl VulkanDevice {
    pub fn vk_handle(&self) -> &ash::Device {
        &self.handle
    }

    /// Makes an image available to shaders under the returned handle
    pub fn register_texture(&self, image_info: vk::DescriptorImageInfo) -> TextureHandle {
        self.textures.write().insert(image_info)
    }

    pub fn replace_texture(
        &self,
        texture: TextureHandle,
        image_info: vk::DescriptorImageInfo,
    ) -> bool {
        self.textures.write().replace(texture, image_info)
    }

    pub fn remove_texture(&self, texture: TextureHandle) -> Option<vk::DescriptorImageInfo> {
        self.textures.write().remove(texture)
    }

    /// Recycles every descriptor set allocated so far
    ///
    /// Only call this once no command buffer references those sets anymore; every
    /// [UniformsInstance](crate::uniform::binding::UniformsInstance) must be dropped or
    /// reallocated before its next bind.
    pub fn reset_descriptor_pools(&self) -> Result<(), DescriptorAllocatorError> {
        self.descriptor_allocator.lock().reset_pools()
    }

    fn write_memory(&self, memory: vk::DeviceMemory, contents: &[u8]) -> Result<(), VulkanError> {
        unsafe {
            let mapped = self.handle.map_memory(
                memory,
                0,
                contents.len() as u64,
                vk::MemoryMapFlags::empty(),
            )? as *mut u8;
            mapped.copy_from_nonoverlapping(contents.as_ptr(), contents.len());
            self.handle.unmap_memory(memory);
        };

        Ok(())
    }
}

impl RenderDevice for VulkanDevice {
    fn create_shader_module(&self, code: &[u32]) -> Result<vk::ShaderModule, VulkanError> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
        let handle = unsafe { self.handle.create_shader_module(&create_info, None)? };

        Ok(handle)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe {
            self.handle.destroy_shader_module(module, None);
        };
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorSetBinding],
    ) -> Result<vk::DescriptorSetLayout, VulkanError> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> =
            bindings.iter().map(|&binding| binding.into()).collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&vk_bindings);
        let handle = unsafe { self.handle.create_descriptor_set_layout(&create_info, None)? };

        Ok(handle)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe {
            self.handle.destroy_descriptor_set_layout(layout, None);
        };
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> Result<vk::PipelineLayout, VulkanError> {
        let create_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);
        let handle = unsafe { self.handle.create_pipeline_layout(&create_info, None)? };

        Ok(handle)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe {
            self.handle.destroy_pipeline_layout(layout, None);
        };
    }

    fn create_uniform_buffer(&self, contents: &[u8]) -> Result<DeviceBuffer, VulkanError> {
        if contents.is_empty() {
            return Err(VulkanError::Other(vk::Result::ERROR_INITIALIZATION_FAILED));
        }

        let create_info = vk::BufferCreateInfo::builder()
            .size(contents.len() as u64)
            .usage(BufferUsageFlags::UNIFORM_BUFFER.into())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = unsafe { self.handle.create_buffer(&create_info, None)? };

        let memory_requirements = unsafe { self.handle.get_buffer_memory_requirements(handle) };
        let memory_type = match find_memory_type(
            &self.memory_properties,
            memory_requirements.memory_type_bits,
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
        ) {
            Some(memory_type) => memory_type,
            None => {
                unsafe { self.handle.destroy_buffer(handle, None) };
                return Err(VulkanError::NoCompatibleMemoryType);
            }
        };

        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(memory_requirements.size)
            .memory_type_index(memory_type);

        let memory = match unsafe { self.handle.allocate_memory(&allocate_info, None) } {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { self.handle.destroy_buffer(handle, None) };
                return Err(err.into());
            }
        };

        let buffer = DeviceBuffer {
            handle,
            memory,
            size: contents.len() as u64,
        };

        let bound = unsafe { self.handle.bind_buffer_memory(handle, memory, 0) }
            .map_err(VulkanError::from)
            .and_then(|_| self.write_memory(memory, contents));
        if let Err(err) = bound {
            self.destroy_buffer(buffer);
            return Err(err);
        }

        Ok(buffer)
    }

    fn write_buffer(&self, buffer: &DeviceBuffer, contents: &[u8]) -> Result<(), VulkanError> {
        let len = contents.len().min(buffer.size as usize);
        if len == 0 {
            return Ok(());
        }

        self.write_memory(buffer.memory, &contents[..len])
    }

    fn destroy_buffer(&self, buffer: DeviceBuffer) {
        unsafe {
            self.handle.destroy_buffer(buffer.handle, None);
            self.handle.free_memory(buffer.memory, None);
        };
    }

    fn allocate_descriptor_set(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, VulkanError> {
        self.descriptor_allocator
            .lock()
            .allocate(layout)
            .map_err(|err| err.vulkan_error())
    }

    fn free_descriptor_set(&self, set: vk::DescriptorSet) {
        if let Err(err) = self.descriptor_allocator.lock().free(set) {
            log::error!("Failed to free descriptor set {:?}: {}", set, err);
        }
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        let vk_writes: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .map(|write| {
                let builder = vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(write.binding)
                    .dst_array_element(0)
                    .descriptor_type(write.resource.descriptor_type().into());

                match &write.resource {
                    DescriptorResource::UniformBuffer(info) => {
                        builder.buffer_info(std::slice::from_ref(info)).build()
                    }
                    DescriptorResource::CombinedImageSampler(info) => {
                        builder.image_info(std::slice::from_ref(info)).build()
                    }
                }
            })
            .collect();

        unsafe {
            self.handle.update_descriptor_sets(&vk_writes, &[]);
        };
    }

    fn resolve_texture(&self, texture: TextureHandle) -> Option<vk::DescriptorImageInfo> {
        self.textures.read().resolve(texture)
    }

    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        unsafe {
            self.handle.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                std::slice::from_ref(&set),
                &[],
            );
        };
    }
}
