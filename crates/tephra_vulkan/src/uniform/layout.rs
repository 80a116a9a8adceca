use super::UniformMap;

/// Bytes a stage's packed uniform buffer needs to hold every ordinary uniform
pub fn uniform_bytes_len(uniforms: &UniformMap) -> usize {
    uniforms
        .values()
        .filter_map(|uniform| uniform.byte_range())
        .map(|range| range.end)
        .max()
        .unwrap_or(0)
}

/// Allocates the zero-filled host mirror of a stage's uniform buffer
pub fn allocate_uniform_bytes(uniforms: &UniformMap) -> Vec<u8> {
    vec![0u8; uniform_bytes_len(uniforms)]
}

/// Writes each ordinary uniform's type default into its range of `bytes`
pub fn seed_defaults(uniforms: &UniformMap, bytes: &mut [u8]) {
    for uniform in uniforms.values() {
        if let Some(range) = uniform.byte_range() {
            let default = uniform.ty.default_value(uniform.size, uniform.count);
            bytes[range].copy_from_slice(&default);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        shaders::ShaderStage,
        uniform::{UniformDescriptor, UniformLocation, UniformType, TEXTURE_UNIFORM_SIZE},
    };

    fn ordinary(name: &str, ty: UniformType, offset: u32, size: u32) -> UniformDescriptor {
        UniformDescriptor {
            name: name.to_string(),
            stage: ShaderStage::Vertex,
            ty,
            count: 1,
            size,
            location: UniformLocation::Offset(offset),
        }
    }

    fn texture(name: &str, binding: u32) -> UniformDescriptor {
        UniformDescriptor {
            name: name.to_string(),
            stage: ShaderStage::Vertex,
            ty: UniformType::Texture,
            count: 1,
            size: TEXTURE_UNIFORM_SIZE,
            location: UniformLocation::Binding(binding),
        }
    }

    fn map(uniforms: Vec<UniformDescriptor>) -> UniformMap {
        uniforms
            .into_iter()
            .map(|uniform| (uniform.name.clone(), uniform))
            .collect()
    }

    #[test]
    fn sized_to_furthest_uniform_end() {
        let uniforms = map(vec![
            ordinary("tint", UniformType::Vec4, 0, 16),
            ordinary("model", UniformType::Mat4, 64, 64),
            ordinary("time", UniformType::Float, 16, 4),
        ]);
        assert_eq!(allocate_uniform_bytes(&uniforms).len(), 128);
    }

    #[test]
    fn textures_take_no_bytes() {
        let uniforms = map(vec![texture("albedo", 40), texture("normal", 3)]);
        assert!(allocate_uniform_bytes(&uniforms).is_empty());

        let uniforms = map(vec![
            texture("albedo", 40),
            ordinary("time", UniformType::Float, 0, 4),
        ]);
        assert_eq!(allocate_uniform_bytes(&uniforms).len(), 4);
    }

    #[test]
    fn empty_stage_has_empty_buffer() {
        assert!(allocate_uniform_bytes(&UniformMap::new()).is_empty());
    }

    #[test]
    fn aliased_uniforms_share_bytes() {
        let uniforms = map(vec![
            ordinary("color", UniformType::Vec4, 0, 16),
            ordinary("color_bits", UniformType::UVec4, 0, 16),
        ]);
        assert_eq!(allocate_uniform_bytes(&uniforms).len(), 16);
    }

    #[test]
    fn allocated_bytes_start_zeroed() {
        let uniforms = map(vec![ordinary("time", UniformType::Float, 12, 4)]);
        assert_eq!(allocate_uniform_bytes(&uniforms), vec![0u8; 16]);
    }

    #[test]
    fn seeds_matrix_identity() {
        let uniforms = map(vec![
            ordinary("time", UniformType::Float, 0, 4),
            ordinary("model", UniformType::Mat4, 16, 64),
        ]);
        let mut bytes = allocate_uniform_bytes(&uniforms);
        seed_defaults(&uniforms, &mut bytes);

        assert_eq!(&bytes[0..4], &[0u8; 4]);
        assert_eq!(&bytes[16..20], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[36..40], &1.0f32.to_le_bytes());
    }

    #[test]
    fn seeds_identity_into_each_matrix_array_element() {
        let mut bones = ordinary("bones", UniformType::Mat4, 0, 128);
        bones.count = 2;
        let uniforms = map(vec![bones]);
        let mut bytes = allocate_uniform_bytes(&uniforms);
        seed_defaults(&uniforms, &mut bytes);

        assert_eq!(&bytes[60..64], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[64..68], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[124..128], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[36..40], &[0u8; 4]);
    }
}
