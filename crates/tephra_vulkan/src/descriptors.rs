use ash::vk;

use crate::shaders::ShaderStageFlags;

pub mod allocator;

/// Binding slot of the vertex stage's uniform block
pub const VERTEX_UNIFORM_BINDING: u32 = 0;
/// Binding slot of the fragment stage's uniform block
pub const FRAGMENT_UNIFORM_BINDING: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    Sampler,
    CombinedImageSampler,
    SampledImage,
    StorageImage,
    UniformTexelBuffer,
    StorageTexelBuffer,
    UniformBuffer,
    StorageBuffer,
    UniformBufferDynamic,
    StorageBufferDynamic,
    InputAttachment,
}

impl Into<vk::DescriptorType> for DescriptorType {
    fn into(self) -> vk::DescriptorType {
        match self {
            DescriptorType::Sampler => vk::DescriptorType::SAMPLER,
            DescriptorType::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            DescriptorType::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
            DescriptorType::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
            DescriptorType::UniformTexelBuffer => vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
            DescriptorType::StorageTexelBuffer => vk::DescriptorType::STORAGE_TEXEL_BUFFER,
            DescriptorType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorType::UniformBufferDynamic => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            DescriptorType::StorageBufferDynamic => vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
            DescriptorType::InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT,
        }
    }
}

/// One binding of a descriptor set layout
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorSetBinding {
    pub binding: u32,
    pub ty: DescriptorType,
    pub count: u32,
    pub shader_stage_flags: ShaderStageFlags,
}

impl Into<vk::DescriptorSetLayoutBinding> for DescriptorSetBinding {
    fn into(self) -> vk::DescriptorSetLayoutBinding {
        vk::DescriptorSetLayoutBinding::builder()
            .binding(self.binding)
            .descriptor_type(self.ty.into())
            .descriptor_count(self.count)
            .stage_flags(self.shader_stage_flags.into())
            .build()
    }
}

/// Resource a [DescriptorWrite] points a binding at
#[derive(Clone, Copy, Debug)]
pub enum DescriptorResource {
    UniformBuffer(vk::DescriptorBufferInfo),
    CombinedImageSampler(vk::DescriptorImageInfo),
}

impl DescriptorResource {
    pub fn descriptor_type(&self) -> DescriptorType {
        match self {
            DescriptorResource::UniformBuffer(_) => DescriptorType::UniformBuffer,
            DescriptorResource::CombinedImageSampler(_) => DescriptorType::CombinedImageSampler,
        }
    }
}

/// A single update to one binding of a descriptor set
#[derive(Clone, Copy, Debug)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub resource: DescriptorResource,
}

impl DescriptorWrite {
    pub fn buffer(binding: u32, buffer_info: vk::DescriptorBufferInfo) -> DescriptorWrite {
        DescriptorWrite {
            binding,
            resource: DescriptorResource::UniformBuffer(buffer_info),
        }
    }

    pub fn image(binding: u32, image_info: vk::DescriptorImageInfo) -> DescriptorWrite {
        DescriptorWrite {
            binding,
            resource: DescriptorResource::CombinedImageSampler(image_info),
        }
    }
}
