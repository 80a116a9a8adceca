//! The device-context handle every shader-binding component works through

use ash::vk;

use crate::{
    buffer::DeviceBuffer,
    descriptors::{DescriptorSetBinding, DescriptorWrite},
    uniform::TextureHandle,
    VulkanError,
};

mod vulkan;
pub use vulkan::VulkanDevice;

/// Native operations the shader program layer needs from the graphics device
///
/// Calls are synchronous. Creation failures come back as [VulkanError]s; destruction and
/// command recording can't fail. Implementations are shared between the render thread and
/// whoever sets uniform values, hence the `Send + Sync` bound.
pub trait RenderDevice: Send + Sync {
    fn create_shader_module(&self, code: &[u32]) -> Result<vk::ShaderModule, VulkanError>;

    fn destroy_shader_module(&self, module: vk::ShaderModule);

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorSetBinding],
    ) -> Result<vk::DescriptorSetLayout, VulkanError>;

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> Result<vk::PipelineLayout, VulkanError>;

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    /// Creates a host-visible uniform buffer sized to and filled with `contents`
    fn create_uniform_buffer(&self, contents: &[u8]) -> Result<DeviceBuffer, VulkanError>;

    /// Overwrites the start of `buffer` with `contents`
    fn write_buffer(&self, buffer: &DeviceBuffer, contents: &[u8]) -> Result<(), VulkanError>;

    fn destroy_buffer(&self, buffer: DeviceBuffer);

    fn allocate_descriptor_set(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, VulkanError>;

    /// Returns `set` to the pool it was allocated from
    ///
    /// No command buffer still pending execution may reference `set`.
    fn free_descriptor_set(&self, set: vk::DescriptorSet);

    /// Applies all `writes` to `set` in a single update
    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]);

    /// Looks up the image behind a texture handle, `None` if it can't be sampled right now
    fn resolve_texture(&self, texture: TextureHandle) -> Option<vk::DescriptorImageInfo>;

    /// Records binding `set` as set 0 of the graphics bind point
    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    );
}
