use ash::vk;
use std::sync::Arc;

use super::{TextureHandle, UniformLocation, UniformMap};
use crate::{
    buffer::DeviceBuffer,
    descriptors::{
        DescriptorSetBinding, DescriptorType, DescriptorWrite, FRAGMENT_UNIFORM_BINDING,
        VERTEX_UNIFORM_BINDING,
    },
    device::RenderDevice,
    shaders::ShaderStage,
    VulkanError,
};

/// Errors that can happen while keeping an instance's device resources in sync
#[derive(thiserror::Error, Debug)]
pub enum BindingError {
    #[error("Failed to create the {0} uniform buffer: {1}")]
    CantCreateBuffer(ShaderStage, VulkanError),
    #[error("Failed to upload the {0} uniform buffer: {1}")]
    CantUploadBuffer(ShaderStage, VulkanError),
    #[error("Failed to allocate a descriptor set: {0}")]
    CantAllocateDescriptorSet(VulkanError),
    #[error("The instance has no descriptor set to update")]
    MissingDescriptorSet,
}

/// Builds the descriptor set layout bindings for a program's uniforms
///
/// Binding 0 holds the vertex uniform block and binding 1 the fragment one, each only present if
/// the stage has ordinary uniforms. Every texture adds a combined image sampler at its reflected
/// binding, visible to every stage that samples it. A texture whose binding is taken by a uniform
/// block is left out.
pub fn layout_bindings(stages: &[UniformMap; 2]) -> Vec<DescriptorSetBinding> {
    let mut bindings = Vec::new();

    for (stage, block_binding) in [
        (ShaderStage::Vertex, VERTEX_UNIFORM_BINDING),
        (ShaderStage::Fragment, FRAGMENT_UNIFORM_BINDING),
    ] {
        let has_ordinary = stages[stage.index()]
            .values()
            .any(|uniform| !uniform.is_texture());
        if has_ordinary {
            bindings.push(DescriptorSetBinding {
                binding: block_binding,
                ty: DescriptorType::UniformBuffer,
                count: 1,
                shader_stage_flags: stage.flags(),
            });
        }
    }

    for stage in ShaderStage::ALL {
        for uniform in stages[stage.index()].values() {
            let binding = match uniform.location {
                UniformLocation::Binding(binding) => binding,
                UniformLocation::Offset(_) => continue,
            };

            match bindings.iter_mut().find(|existing| existing.binding == binding) {
                Some(existing) if existing.ty == DescriptorType::CombinedImageSampler => {
                    existing.shader_stage_flags |= stage.flags();
                }
                Some(_) => {
                    log::warn!(
                        "Texture `{}` in the {} stage reuses uniform block binding {}, leaving it out",
                        uniform.name,
                        stage,
                        binding
                    );
                }
                None => bindings.push(DescriptorSetBinding {
                    binding,
                    ty: DescriptorType::CombinedImageSampler,
                    count: 1,
                    shader_stage_flags: stage.flags(),
                }),
            }
        }
    }

    bindings
}

/// A texture uniform and the texture currently assigned to it
#[derive(Clone, Copy, Debug)]
pub struct TextureSlot<'a> {
    pub name: &'a str,
    pub binding: u32,
    pub texture: Option<TextureHandle>,
}

/// Outcome of refreshing an instance's descriptor set
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DescriptorRefresh {
    /// Bindings that were written, in write order
    pub written: Vec<u32>,
    /// Texture uniforms that were skipped because their texture couldn't be resolved
    pub unresolved: Vec<String>,
}

/// Device-side uniform state of one consumer of a shader program
///
/// Each consumer (usually a material instance) owns one of these. Buffers and the descriptor set
/// are created lazily on the first bind and recreated whenever the program's packed uniform
/// sizes change or the program is relinked.
pub struct UniformsInstance<D: RenderDevice> {
    vertex_buffer: Option<DeviceBuffer>,
    fragment_buffer: Option<DeviceBuffer>,
    descriptor_set: Option<vk::DescriptorSet>,
    link_id: u64,

    device: Arc<D>,
}

impl<D: RenderDevice> UniformsInstance<D> {
    pub fn new(device: Arc<D>) -> UniformsInstance<D> {
        UniformsInstance {
            vertex_buffer: None,
            fragment_buffer: None,
            descriptor_set: None,
            link_id: 0,
            device,
        }
    }
}

impl<D: RenderDevice> UniformsInstance<D> {
    pub fn descriptor_set(&self) -> Option<vk::DescriptorSet> {
        self.descriptor_set
    }

    pub fn buffer(&self, stage: ShaderStage) -> Option<&DeviceBuffer> {
        match stage {
            ShaderStage::Vertex => self.vertex_buffer.as_ref(),
            ShaderStage::Fragment => self.fragment_buffer.as_ref(),
        }
    }

    /// Bytes allocated on the device for `stage`, zero if the stage has no buffer
    pub fn allocated_size(&self, stage: ShaderStage) -> usize {
        self.buffer(stage).map_or(0, |buffer| buffer.size as usize)
    }

    pub fn is_allocated(&self) -> bool {
        self.descriptor_set.is_some()
    }

    fn needs_allocation(&self, link_id: u64, vertex_len: usize, fragment_len: usize) -> bool {
        self.descriptor_set.is_none()
            || self.link_id != link_id
            || self.allocated_size(ShaderStage::Vertex) != vertex_len
            || self.allocated_size(ShaderStage::Fragment) != fragment_len
    }

    /// Makes sure the device buffers and descriptor set match the current mirrors
    ///
    /// `link_id` identifies the link `set_layout` belongs to. Layout handles can be recycled by the
    /// driver once a relink destroys them, so only the id tells links apart.
    ///
    /// Returns whether anything was (re)allocated. New buffers start out with the mirror
    /// contents; a stage with an empty mirror gets no buffer.
    pub fn ensure_capacity(
        &mut self,
        link_id: u64,
        set_layout: vk::DescriptorSetLayout,
        vertex_bytes: &[u8],
        fragment_bytes: &[u8],
    ) -> Result<bool, BindingError> {
        if !self.needs_allocation(link_id, vertex_bytes.len(), fragment_bytes.len()) {
            return Ok(false);
        }

        self.release();

        self.vertex_buffer = self.create_buffer(ShaderStage::Vertex, vertex_bytes)?;
        self.fragment_buffer = self.create_buffer(ShaderStage::Fragment, fragment_bytes)?;

        let set = self
            .device
            .allocate_descriptor_set(set_layout)
            .map_err(|err| {
                log::error!("Failed to allocate a uniform descriptor set: {}", err);
                BindingError::CantAllocateDescriptorSet(err)
            })?;
        self.descriptor_set = Some(set);
        self.link_id = link_id;

        log::debug!(
            "Allocated uniform buffers ({} vertex bytes, {} fragment bytes)",
            vertex_bytes.len(),
            fragment_bytes.len()
        );
        Ok(true)
    }

    fn create_buffer(
        &self,
        stage: ShaderStage,
        contents: &[u8],
    ) -> Result<Option<DeviceBuffer>, BindingError> {
        if contents.is_empty() {
            return Ok(None);
        }

        self.device
            .create_uniform_buffer(contents)
            .map(Some)
            .map_err(|err| {
                log::error!("Failed to create the {} uniform buffer: {}", stage, err);
                BindingError::CantCreateBuffer(stage, err)
            })
    }

    /// Uploads the current mirror contents into the device buffers
    pub fn write_values(
        &mut self,
        vertex_bytes: &[u8],
        fragment_bytes: &[u8],
    ) -> Result<(), BindingError> {
        for (stage, bytes) in [
            (ShaderStage::Vertex, vertex_bytes),
            (ShaderStage::Fragment, fragment_bytes),
        ] {
            if let Some(buffer) = self.buffer(stage) {
                self.device.write_buffer(buffer, bytes).map_err(|err| {
                    log::error!("Failed to upload the {} uniform buffer: {}", stage, err);
                    BindingError::CantUploadBuffer(stage, err)
                })?;
            }
        }

        Ok(())
    }

    /// Points the descriptor set at the uniform buffers and the currently assigned textures
    ///
    /// Textures that can't be resolved are skipped and reported instead of failing the whole
    /// update.
    pub fn refresh_descriptor_set(
        &self,
        textures: &[TextureSlot],
    ) -> Result<DescriptorRefresh, BindingError> {
        let set = self
            .descriptor_set
            .ok_or(BindingError::MissingDescriptorSet)?;

        let mut writes = Vec::with_capacity(2 + textures.len());
        let mut refresh = DescriptorRefresh::default();

        if let Some(buffer) = self.vertex_buffer.as_ref() {
            writes.push(DescriptorWrite::buffer(
                VERTEX_UNIFORM_BINDING,
                buffer.descriptor(),
            ));
        }
        if let Some(buffer) = self.fragment_buffer.as_ref() {
            writes.push(DescriptorWrite::buffer(
                FRAGMENT_UNIFORM_BINDING,
                buffer.descriptor(),
            ));
        }

        for slot in textures.iter() {
            let image_info = slot
                .texture
                .and_then(|texture| self.device.resolve_texture(texture));

            match image_info {
                Some(image_info) => writes.push(DescriptorWrite::image(slot.binding, image_info)),
                None => {
                    log::error!(
                        "Texture uniform `{}` at binding {} has no image to sample, skipping it",
                        slot.name,
                        slot.binding
                    );
                    refresh.unresolved.push(slot.name.to_string());
                }
            }
        }

        refresh.written = writes.iter().map(|write| write.binding).collect();
        if !writes.is_empty() {
            self.device.update_descriptor_set(set, &writes);
        }

        Ok(refresh)
    }

    /// Destroys the device buffers and returns the descriptor set to its pool
    pub fn release(&mut self) {
        if let Some(buffer) = self.vertex_buffer.take() {
            self.device.destroy_buffer(buffer);
        }
        if let Some(buffer) = self.fragment_buffer.take() {
            self.device.destroy_buffer(buffer);
        }
        if let Some(set) = self.descriptor_set.take() {
            self.device.free_descriptor_set(set);
        }
        self.link_id = 0;
    }
}

impl<D: RenderDevice> Drop for UniformsInstance<D> {
    fn drop(&mut self) {
        self.release();
    }
}
