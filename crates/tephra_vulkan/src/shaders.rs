//! Shader stages and the seam to the external source-to-SPIR-V compiler

use ash::vk;
use bitflags::bitflags;
use std::fmt::Display;

pub mod compiler;

/// Possible errors returned by a [ShaderCompiler]
#[derive(thiserror::Error, Debug)]
pub enum CompileError {
    #[error("The shader file `{0}` could not be found")]
    FileNotFound(String),
    #[error("Failed to read the contents of `{0}`")]
    CantRead(String),
    #[error("The compiler produced no bytecode")]
    EmptyOutput,
    #[error("Failed to compile shader: {0}")]
    Failed(String),
}

/// Pipeline stage a shader runs in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 2] = [ShaderStage::Vertex, ShaderStage::Fragment];

    /// Slot of this stage in per-stage arrays
    pub fn index(self) -> usize {
        match self {
            ShaderStage::Vertex => 0,
            ShaderStage::Fragment => 1,
        }
    }

    pub fn flags(self) -> ShaderStageFlags {
        match self {
            ShaderStage::Vertex => ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => ShaderStageFlags::FRAGMENT,
        }
    }
}

impl Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

impl Into<vk::ShaderStageFlags> for ShaderStage {
    fn into(self) -> vk::ShaderStageFlags {
        self.flags().into()
    }
}

bitflags! {
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 0b1;
        const FRAGMENT = 0b10000;
        const ALL_GRAPHICS = 0b11111;
    }
}

impl Into<vk::ShaderStageFlags> for ShaderStageFlags {
    fn into(self) -> vk::ShaderStageFlags {
        vk::ShaderStageFlags::from_raw(self.bits())
    }
}

/// Turns shader source into SPIR-V words
///
/// The program treats this as opaque: whatever produces the bytecode (an offline build step, a
/// runtime GLSL compiler, a file loader) only has to honor this signature.
pub trait ShaderCompiler {
    fn compile(&self, source: &str, stage: ShaderStage) -> Result<Vec<u32>, CompileError>;
}

impl<F> ShaderCompiler for F
where
    F: Fn(&str, ShaderStage) -> Result<Vec<u32>, CompileError>,
{
    fn compile(&self, source: &str, stage: ShaderStage) -> Result<Vec<u32>, CompileError> {
        self(source, stage)
    }
}
