//! Shader-visible parameters: what reflection finds, how they are laid out in host memory and how
//! they reach the device

use std::collections::HashMap;

use crate::shaders::ShaderStage;

pub mod binding;
pub mod layout;
pub mod reflect;

/// Byte size recorded for texture uniforms
///
/// Textures never occupy mirror bytes, the size only keeps descriptor bookkeeping uniform.
pub const TEXTURE_UNIFORM_SIZE: u32 = 4;

/// Semantic type of a uniform as declared in the shader
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    UInt,
    UVec2,
    UVec3,
    UVec4,
    Mat2,
    Mat3,
    Mat4,
    Texture,
    Unknown,
}

impl UniformType {
    /// Bytes taken by a single element of this type
    pub fn element_size(&self) -> u32 {
        match self {
            UniformType::Float | UniformType::Int | UniformType::UInt => 4,
            UniformType::Vec2 | UniformType::IVec2 | UniformType::UVec2 => 8,
            UniformType::Vec3 | UniformType::IVec3 | UniformType::UVec3 => 12,
            UniformType::Vec4 | UniformType::IVec4 | UniformType::UVec4 => 16,
            UniformType::Mat2 => 16,
            UniformType::Mat3 => 36,
            UniformType::Mat4 => 64,
            UniformType::Texture => TEXTURE_UNIFORM_SIZE,
            UniformType::Unknown => 4,
        }
    }

    /// Columns of a matrix type, `None` for everything else
    pub fn matrix_columns(&self) -> Option<u32> {
        match self {
            UniformType::Mat2 => Some(2),
            UniformType::Mat3 => Some(3),
            UniformType::Mat4 => Some(4),
            _ => None,
        }
    }

    /// Value a uniform starts with before anyone sets it
    ///
    /// Everything is zeroed except matrices, where each of the `count` elements starts as identity.
    /// `size` is the declared size of the whole uniform, so element and column strides come out of
    /// it rather than the tight element size.
    pub fn default_value(&self, size: u32, count: u32) -> Vec<u8> {
        let mut bytes = vec![0u8; size as usize];

        if let Some(columns) = self.matrix_columns() {
            let element_stride = (size / count.max(1)) as usize;
            let column_stride = element_stride / columns as usize;
            if column_stride >= columns as usize * 4 {
                for element in 0..count.max(1) as usize {
                    for column in 0..columns as usize {
                        let at = element * element_stride + column * column_stride + column * 4;
                        bytes[at..at + 4].copy_from_slice(&1.0f32.to_le_bytes());
                    }
                }
            }
        }

        bytes
    }
}

/// Where a uniform lives
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformLocation {
    /// Byte offset inside the stage's packed uniform buffer
    Offset(u32),
    /// Descriptor binding index of a sampled texture
    Binding(u32),
}

/// One shader-visible parameter
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformDescriptor {
    pub name: String,
    pub stage: ShaderStage,
    pub ty: UniformType,
    pub count: u32,
    pub size: u32,
    pub location: UniformLocation,
}

impl UniformDescriptor {
    pub fn is_texture(&self) -> bool {
        matches!(self.location, UniformLocation::Binding(_))
    }

    /// Byte range inside the stage mirror, `None` for textures
    pub fn byte_range(&self) -> Option<std::ops::Range<usize>> {
        match self.location {
            UniformLocation::Offset(offset) => {
                Some(offset as usize..(offset + self.size) as usize)
            }
            UniformLocation::Binding(_) => None,
        }
    }
}

/// Uniforms of one stage keyed by name
pub type UniformMap = HashMap<String, UniformDescriptor>;

/// Opaque handle to an image the renderer can resolve into a descriptor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);
