extern crate log;

pub mod buffer;
pub mod config;
pub mod descriptors;
pub mod device;
mod error;
pub mod program;
pub mod shaders;
pub mod textures;
pub mod uniform;

pub use error::VulkanError;

pub mod prelude {
    pub use crate::config::{DeviceConfig, ProgramConfig};
    pub use crate::device::{RenderDevice, VulkanDevice};
    pub use crate::program::{ProgramError, ProgramState, ShaderProgram};
    pub use crate::shaders::{compiler::SpirvFileCompiler, CompileError, ShaderCompiler, ShaderStage};
    pub use crate::uniform::{
        binding::{BindingError, DescriptorRefresh, UniformsInstance},
        TextureHandle, UniformDescriptor, UniformLocation, UniformType,
    };
    pub use crate::VulkanError;

    #[cfg(feature = "shaderc")]
    pub use crate::shaders::compiler::GlslCompiler;
}
