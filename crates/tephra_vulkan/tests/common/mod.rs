#![allow(dead_code)]

pub mod spirv;

use ash::vk::{self, Handle};
use parking_lot::{Mutex, MutexGuard};
use std::{collections::HashMap, sync::Arc};

use tephra_vulkan::{
    buffer::DeviceBuffer,
    descriptors::{DescriptorSetBinding, DescriptorType, DescriptorWrite},
    device::RenderDevice,
    uniform::TextureHandle,
    VulkanError,
};

pub fn init_logging() {
    let _ = simple_logger::SimpleLogger::new().init();
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordedWrite {
    pub binding: u32,
    pub ty: DescriptorType,
    /// Raw handle of the buffer or image view written
    pub resource: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordedBind {
    pub command_buffer: u64,
    pub pipeline_layout: u64,
    pub set: u64,
}

/// Everything the mock device has been asked to do
#[derive(Default)]
pub struct MockState {
    next_handle: u64,

    pub shader_modules_created: usize,
    pub shader_modules_live: usize,
    pub set_layouts_live: usize,
    pub pipeline_layouts_live: usize,
    pub set_layouts: Vec<Vec<DescriptorSetBinding>>,
    /// Hand destroyed set layout handles out again, the way drivers are allowed to
    pub recycle_set_layouts: bool,
    destroyed_set_layouts: Vec<u64>,

    pub buffers_created: usize,
    pub buffers_destroyed: usize,
    pub buffers: HashMap<u64, Vec<u8>>,

    pub descriptor_sets_allocated: usize,
    pub descriptor_sets_live: usize,
    pub freed_descriptor_sets: Vec<u64>,
    pub writes: Vec<(u64, Vec<RecordedWrite>)>,
    pub binds: Vec<RecordedBind>,

    pub textures: HashMap<TextureHandle, vk::DescriptorImageInfo>,

    pub fail_shader_modules: bool,
    pub fail_descriptor_sets: bool,
    pub fail_buffers: bool,
}

impl MockState {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    /// Writes of the most recent descriptor set update
    pub fn last_writes(&self) -> Vec<RecordedWrite> {
        self.writes
            .last()
            .map(|(_, writes)| writes.clone())
            .unwrap_or_default()
    }

    pub fn buffer_contents(&self, buffer: &DeviceBuffer) -> &[u8] {
        self.buffers
            .get(&buffer.handle.as_raw())
            .map(|contents| contents.as_slice())
            .unwrap_or(&[])
    }
}

/// In-memory [RenderDevice] that records every call
#[derive(Default)]
pub struct MockDevice {
    state: Mutex<MockState>,
}

impl MockDevice {
    pub fn new() -> Arc<MockDevice> {
        Arc::new(MockDevice::default())
    }

    pub fn state(&self) -> MutexGuard<MockState> {
        self.state.lock()
    }

    /// Makes `texture` resolvable
    pub fn add_texture(&self, texture: TextureHandle) {
        let mut state = self.state.lock();
        let image_info = vk::DescriptorImageInfo {
            sampler: vk::Sampler::from_raw(state.handle()),
            image_view: vk::ImageView::from_raw(state.handle()),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        state.textures.insert(texture, image_info);
    }
}

impl RenderDevice for MockDevice {
    fn create_shader_module(&self, _code: &[u32]) -> Result<vk::ShaderModule, VulkanError> {
        let mut state = self.state.lock();
        if state.fail_shader_modules {
            return Err(VulkanError::InvalidShader);
        }

        state.shader_modules_created += 1;
        state.shader_modules_live += 1;
        Ok(vk::ShaderModule::from_raw(state.handle()))
    }

    fn destroy_shader_module(&self, _module: vk::ShaderModule) {
        self.state.lock().shader_modules_live -= 1;
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorSetBinding],
    ) -> Result<vk::DescriptorSetLayout, VulkanError> {
        let mut state = self.state.lock();
        state.set_layouts_live += 1;
        state.set_layouts.push(bindings.to_vec());

        let handle = match state.destroyed_set_layouts.pop() {
            Some(handle) if state.recycle_set_layouts => handle,
            _ => state.handle(),
        };
        Ok(vk::DescriptorSetLayout::from_raw(handle))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        let mut state = self.state.lock();
        state.set_layouts_live -= 1;
        state.destroyed_set_layouts.push(layout.as_raw());
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> Result<vk::PipelineLayout, VulkanError> {
        assert_eq!(set_layouts.len(), 1);

        let mut state = self.state.lock();
        state.pipeline_layouts_live += 1;
        Ok(vk::PipelineLayout::from_raw(state.handle()))
    }

    fn destroy_pipeline_layout(&self, _layout: vk::PipelineLayout) {
        self.state.lock().pipeline_layouts_live -= 1;
    }

    fn create_uniform_buffer(&self, contents: &[u8]) -> Result<DeviceBuffer, VulkanError> {
        let mut state = self.state.lock();
        if state.fail_buffers {
            return Err(VulkanError::OutOfDeviceMemory);
        }

        let handle = state.handle();
        let memory = state.handle();
        state.buffers_created += 1;
        state.buffers.insert(handle, contents.to_vec());

        Ok(DeviceBuffer {
            handle: vk::Buffer::from_raw(handle),
            memory: vk::DeviceMemory::from_raw(memory),
            size: contents.len() as u64,
        })
    }

    fn write_buffer(&self, buffer: &DeviceBuffer, contents: &[u8]) -> Result<(), VulkanError> {
        let mut state = self.state.lock();
        let stored = state
            .buffers
            .get_mut(&buffer.handle.as_raw())
            .expect("write to a destroyed buffer");

        let len = contents.len().min(stored.len());
        stored[..len].copy_from_slice(&contents[..len]);
        Ok(())
    }

    fn destroy_buffer(&self, buffer: DeviceBuffer) {
        let mut state = self.state.lock();
        state.buffers_destroyed += 1;
        state.buffers.remove(&buffer.handle.as_raw());
    }

    fn allocate_descriptor_set(
        &self,
        _layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, VulkanError> {
        let mut state = self.state.lock();
        if state.fail_descriptor_sets {
            return Err(VulkanError::OutOfPoolMemory);
        }

        state.descriptor_sets_allocated += 1;
        state.descriptor_sets_live += 1;
        Ok(vk::DescriptorSet::from_raw(state.handle()))
    }

    fn free_descriptor_set(&self, set: vk::DescriptorSet) {
        let mut state = self.state.lock();
        state.descriptor_sets_live -= 1;
        state.freed_descriptor_sets.push(set.as_raw());
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        use tephra_vulkan::descriptors::DescriptorResource;

        let recorded = writes
            .iter()
            .map(|write| RecordedWrite {
                binding: write.binding,
                ty: write.resource.descriptor_type(),
                resource: match write.resource {
                    DescriptorResource::UniformBuffer(info) => info.buffer.as_raw(),
                    DescriptorResource::CombinedImageSampler(info) => info.image_view.as_raw(),
                },
            })
            .collect();

        self.state.lock().writes.push((set.as_raw(), recorded));
    }

    fn resolve_texture(&self, texture: TextureHandle) -> Option<vk::DescriptorImageInfo> {
        self.state.lock().textures.get(&texture).copied()
    }

    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        self.state.lock().binds.push(RecordedBind {
            command_buffer: command_buffer.as_raw(),
            pipeline_layout: layout.as_raw(),
            set: set.as_raw(),
        });
    }
}

pub fn command_buffer(raw: u64) -> vk::CommandBuffer {
    vk::CommandBuffer::from_raw(raw)
}
