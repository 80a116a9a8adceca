use rspirv::{
    dr::{self, Instruction, Operand},
    spirv::{Decoration, ExecutionModel, Op, StorageClass, Word},
};
use std::collections::{HashMap, HashSet};

use super::{UniformDescriptor, UniformLocation, UniformMap, UniformType, TEXTURE_UNIFORM_SIZE};
use crate::shaders::ShaderStage;

/// Nesting deeper than this is treated as malformed
const MAX_TYPE_DEPTH: u32 = 16;

/// Possible errors returned while reflecting shader bytecode
#[derive(thiserror::Error, Debug)]
pub enum ReflectError {
    #[error("No bytecode was provided")]
    EmptyBytecode,
    #[error("Failed to parse the shader spirv: {0}")]
    CantParseSpv(String),
}

/// Reflects the uniforms a stage's bytecode declares
///
/// Every member of every uniform block becomes an ordinary uniform located at its declared byte
/// offset, and every combined image sampler becomes a texture uniform located at its binding.
pub fn reflect_stage(stage: ShaderStage, code: &[u32]) -> Result<UniformMap, ReflectError> {
    let mut uniforms = UniformMap::new();
    reflect_stage_into(stage, code, &mut uniforms)?;
    Ok(uniforms)
}

/// Same as [reflect_stage] but fills an existing map, which is cleared first
///
/// Members without a name are keyed `block.index`. A name that is already taken in the stage is
/// keyed by its qualified name instead and a warning is logged.
pub fn reflect_stage_into(
    stage: ShaderStage,
    code: &[u32],
    uniforms: &mut UniformMap,
) -> Result<(), ReflectError> {
    uniforms.clear();

    if code.is_empty() {
        return Err(ReflectError::EmptyBytecode);
    }

    let module =
        dr::load_words(code).map_err(|err| ReflectError::CantParseSpv(format!("{:?}", err)))?;
    check_entry_point(stage, &module);

    let info = ModuleInfo::collect(&module);

    let mut block_count = 0;
    for variable in info.variables.iter() {
        let pointee = match info.types.get(&variable.pointer) {
            Some(SpvType::Pointer { pointee, .. }) => *pointee,
            _ => continue,
        };
        let binding = info.bindings.get(&variable.id).copied().unwrap_or(0);

        match variable.storage {
            StorageClass::Uniform if info.blocks.contains(&pointee) => {
                block_count += 1;
                info.warn_on_foreign_set(stage, variable.id);
                info.add_block_members(stage, variable.id, pointee, uniforms);
            }
            StorageClass::UniformConstant if info.is_sampled_image(pointee) => {
                info.warn_on_foreign_set(stage, variable.id);
                info.add_texture(stage, variable.id, binding, pointee, uniforms);
            }
            storage => {
                log::debug!(
                    "Ignoring {:?} resource `{}` at binding {} in the {} stage",
                    storage,
                    info.name(variable.id),
                    binding,
                    stage
                );
            }
        }
    }

    if block_count > 1 {
        log::warn!(
            "The {} stage declares {} uniform blocks, their members share one uniform buffer",
            stage,
            block_count
        );
    }

    Ok(())
}

fn check_entry_point(stage: ShaderStage, module: &dr::Module) {
    let expected = match stage {
        ShaderStage::Vertex => ExecutionModel::Vertex,
        ShaderStage::Fragment => ExecutionModel::Fragment,
    };

    let declared: Vec<ExecutionModel> = module
        .entry_points
        .iter()
        .filter_map(|entry| match entry.operands.first() {
            Some(Operand::ExecutionModel(model)) => Some(*model),
            _ => None,
        })
        .collect();

    if !declared.contains(&expected) {
        log::warn!(
            "Bytecode reflected as {} stage declares {:?}",
            stage,
            declared
        );
    }
}

/// Scalar family of a numeric type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ScalarKind {
    Float,
    Int,
    UInt,
}

/// Maps reflected numeric traits onto a [UniformType]
///
/// `components` is 1 for scalars and `columns` is 0 for anything that isn't a matrix.
pub(crate) fn map_uniform_type(scalar: ScalarKind, components: u32, columns: u32) -> UniformType {
    if columns != 0 {
        if scalar != ScalarKind::Float || components != columns {
            return UniformType::Unknown;
        }
        return match columns {
            2 => UniformType::Mat2,
            3 => UniformType::Mat3,
            4 => UniformType::Mat4,
            _ => UniformType::Unknown,
        };
    }

    match (scalar, components) {
        (ScalarKind::Float, 1) => UniformType::Float,
        (ScalarKind::Float, 2) => UniformType::Vec2,
        (ScalarKind::Float, 3) => UniformType::Vec3,
        (ScalarKind::Float, 4) => UniformType::Vec4,
        (ScalarKind::Int, 1) => UniformType::Int,
        (ScalarKind::Int, 2) => UniformType::IVec2,
        (ScalarKind::Int, 3) => UniformType::IVec3,
        (ScalarKind::Int, 4) => UniformType::IVec4,
        (ScalarKind::UInt, 1) => UniformType::UInt,
        (ScalarKind::UInt, 2) => UniformType::UVec2,
        (ScalarKind::UInt, 3) => UniformType::UVec3,
        (ScalarKind::UInt, 4) => UniformType::UVec4,
        _ => UniformType::Unknown,
    }
}

#[derive(Clone, Copy, Debug)]
enum SpvType {
    Float { width: u32 },
    Int { width: u32, signed: bool },
    Vector { component: Word, count: u32 },
    Matrix { column: Word, columns: u32 },
    Array { element: Word, length: u32 },
    RuntimeArray { element: Word },
    Struct,
    SampledImage,
    Pointer { pointee: Word },
    Other,
}

#[derive(Clone, Copy, Debug)]
struct Variable {
    id: Word,
    pointer: Word,
    storage: StorageClass,
}

/// What reflection needs out of a decoded module, indexed by result id
#[derive(Default)]
struct ModuleInfo {
    names: HashMap<Word, String>,
    member_names: HashMap<(Word, u32), String>,
    bindings: HashMap<Word, u32>,
    sets: HashMap<Word, u32>,
    blocks: HashSet<Word>,
    member_offsets: HashMap<(Word, u32), u32>,
    matrix_strides: HashMap<(Word, u32), u32>,
    array_strides: HashMap<Word, u32>,
    constants: HashMap<Word, u32>,
    types: HashMap<Word, SpvType>,
    struct_members: HashMap<Word, Vec<Word>>,
    variables: Vec<Variable>,
}

fn id_operand(instruction: &Instruction, index: usize) -> Option<Word> {
    match instruction.operands.get(index) {
        Some(Operand::IdRef(id)) => Some(*id),
        _ => None,
    }
}

fn literal_operand(instruction: &Instruction, index: usize) -> Option<u32> {
    match instruction.operands.get(index) {
        Some(Operand::LiteralBit32(value)) => Some(*value),
        _ => None,
    }
}

fn string_operand(instruction: &Instruction, index: usize) -> Option<&str> {
    match instruction.operands.get(index) {
        Some(Operand::LiteralString(text)) => Some(text.as_str()),
        _ => None,
    }
}

impl ModuleInfo {
    fn collect(module: &dr::Module) -> ModuleInfo {
        let mut info = ModuleInfo::default();

        for instruction in module.debug_names.iter() {
            info.collect_name(instruction);
        }
        for instruction in module.annotations.iter() {
            info.collect_decoration(instruction);
        }
        for instruction in module.types_global_values.iter() {
            info.collect_type(instruction);
        }

        info
    }

    fn collect_name(&mut self, instruction: &Instruction) {
        match instruction.class.opcode {
            Op::Name => {
                if let (Some(target), Some(name)) =
                    (id_operand(instruction, 0), string_operand(instruction, 1))
                {
                    self.names.insert(target, name.to_string());
                }
            }
            Op::MemberName => {
                if let (Some(target), Some(member), Some(name)) = (
                    id_operand(instruction, 0),
                    literal_operand(instruction, 1),
                    string_operand(instruction, 2),
                ) {
                    self.member_names.insert((target, member), name.to_string());
                }
            }
            _ => {}
        }
    }

    fn collect_decoration(&mut self, instruction: &Instruction) {
        match instruction.class.opcode {
            Op::Decorate => {
                let target = match id_operand(instruction, 0) {
                    Some(target) => target,
                    None => return,
                };
                let value = literal_operand(instruction, 2);

                match (instruction.operands.get(1), value) {
                    (Some(Operand::Decoration(Decoration::Block)), _) => {
                        self.blocks.insert(target);
                    }
                    (Some(Operand::Decoration(Decoration::Binding)), Some(value)) => {
                        self.bindings.insert(target, value);
                    }
                    (Some(Operand::Decoration(Decoration::DescriptorSet)), Some(value)) => {
                        self.sets.insert(target, value);
                    }
                    (Some(Operand::Decoration(Decoration::ArrayStride)), Some(value)) => {
                        self.array_strides.insert(target, value);
                    }
                    _ => {}
                }
            }
            Op::MemberDecorate => {
                let (target, member) =
                    match (id_operand(instruction, 0), literal_operand(instruction, 1)) {
                        (Some(target), Some(member)) => (target, member),
                        _ => return,
                    };
                let value = literal_operand(instruction, 3);

                match (instruction.operands.get(2), value) {
                    (Some(Operand::Decoration(Decoration::Offset)), Some(value)) => {
                        self.member_offsets.insert((target, member), value);
                    }
                    (Some(Operand::Decoration(Decoration::MatrixStride)), Some(value)) => {
                        self.matrix_strides.insert((target, member), value);
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn collect_type(&mut self, instruction: &Instruction) {
        let id = match instruction.result_id {
            Some(id) => id,
            None => return,
        };

        let ty = match instruction.class.opcode {
            Op::TypeFloat => SpvType::Float {
                width: literal_operand(instruction, 0).unwrap_or(32),
            },
            Op::TypeInt => SpvType::Int {
                width: literal_operand(instruction, 0).unwrap_or(32),
                signed: literal_operand(instruction, 1).unwrap_or(0) != 0,
            },
            Op::TypeVector => match (id_operand(instruction, 0), literal_operand(instruction, 1)) {
                (Some(component), Some(count)) => SpvType::Vector { component, count },
                _ => SpvType::Other,
            },
            Op::TypeMatrix => match (id_operand(instruction, 0), literal_operand(instruction, 1)) {
                (Some(column), Some(columns)) => SpvType::Matrix { column, columns },
                _ => SpvType::Other,
            },
            Op::TypeArray => {
                let length = id_operand(instruction, 1)
                    .and_then(|constant| self.constants.get(&constant).copied());
                match (id_operand(instruction, 0), length) {
                    (Some(element), Some(length)) => SpvType::Array { element, length },
                    _ => SpvType::Other,
                }
            }
            Op::TypeRuntimeArray => match id_operand(instruction, 0) {
                Some(element) => SpvType::RuntimeArray { element },
                None => SpvType::Other,
            },
            Op::TypeStruct => {
                let members = instruction
                    .operands
                    .iter()
                    .filter_map(|operand| match operand {
                        Operand::IdRef(member) => Some(*member),
                        _ => None,
                    })
                    .collect();
                self.struct_members.insert(id, members);
                SpvType::Struct
            }
            Op::TypeSampledImage => SpvType::SampledImage,
            Op::TypePointer => match id_operand(instruction, 1) {
                Some(pointee) => SpvType::Pointer { pointee },
                None => SpvType::Other,
            },
            Op::Constant => {
                if let Some(value) = literal_operand(instruction, 0) {
                    self.constants.insert(id, value);
                }
                return;
            }
            Op::Variable => {
                if let (Some(pointer), Some(Operand::StorageClass(storage))) =
                    (instruction.result_type, instruction.operands.first())
                {
                    self.variables.push(Variable {
                        id,
                        pointer,
                        storage: *storage,
                    });
                }
                return;
            }
            _ => return,
        };

        self.types.insert(id, ty);
    }

    fn name(&self, id: Word) -> &str {
        self.names.get(&id).map_or("", String::as_str)
    }

    fn warn_on_foreign_set(&self, stage: ShaderStage, variable: Word) {
        let set = self.sets.get(&variable).copied().unwrap_or(0);
        if set != 0 {
            log::warn!(
                "Resource `{}` in the {} stage is declared in descriptor set {}, only set 0 is bound",
                self.name(variable),
                stage,
                set
            );
        }
    }

    fn is_sampled_image(&self, ty: Word) -> bool {
        match self.types.get(&ty) {
            Some(SpvType::SampledImage) => true,
            Some(SpvType::Array { element, .. }) | Some(SpvType::RuntimeArray { element }) => {
                matches!(self.types.get(element), Some(SpvType::SampledImage))
            }
            _ => false,
        }
    }

    /// Name the block goes by in qualified uniform names
    fn block_name(&self, variable: Word, block: Word) -> String {
        [self.name(variable), self.name(block)]
            .into_iter()
            .find(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!("block{}", self.bindings.get(&variable).copied().unwrap_or(0))
            })
    }

    fn add_block_members(
        &self,
        stage: ShaderStage,
        variable: Word,
        block: Word,
        uniforms: &mut UniformMap,
    ) {
        let members = match self.struct_members.get(&block) {
            Some(members) => members,
            None => return,
        };
        let block_name = self.block_name(variable, block);

        for (index, &member) in members.iter().enumerate() {
            let index = index as u32;
            let offset = self
                .member_offsets
                .get(&(block, index))
                .copied()
                .unwrap_or(0);
            let matrix_stride = self.matrix_strides.get(&(block, index)).copied();

            let declared = self
                .member_names
                .get(&(block, index))
                .map_or("", String::as_str);
            let qualified = format!("{}.{}", block_name, index);
            let name = unique_name(stage, uniforms, declared, qualified);

            uniforms.insert(
                name.clone(),
                UniformDescriptor {
                    name,
                    stage,
                    ty: self.uniform_type(member, 0),
                    count: self.element_count(member, 0),
                    size: self.type_size(member, matrix_stride, 0),
                    location: UniformLocation::Offset(offset),
                },
            );
        }
    }

    fn add_texture(
        &self,
        stage: ShaderStage,
        variable: Word,
        binding: u32,
        ty: Word,
        uniforms: &mut UniformMap,
    ) {
        if self.element_count(ty, 0) > 1 {
            log::warn!(
                "Texture array `{}` in the {} stage is bound as a single texture",
                self.name(variable),
                stage
            );
        }

        let name = unique_name(
            stage,
            uniforms,
            self.name(variable),
            format!("binding{}", binding),
        );
        uniforms.insert(
            name.clone(),
            UniformDescriptor {
                name,
                stage,
                ty: UniformType::Texture,
                count: 1,
                size: TEXTURE_UNIFORM_SIZE,
                location: UniformLocation::Binding(binding),
            },
        );
    }

    fn scalar_kind(&self, ty: Word) -> Option<ScalarKind> {
        match self.types.get(&ty) {
            Some(SpvType::Float { width: 32 }) => Some(ScalarKind::Float),
            Some(SpvType::Int {
                width: 32,
                signed: true,
            }) => Some(ScalarKind::Int),
            Some(SpvType::Int {
                width: 32,
                signed: false,
            }) => Some(ScalarKind::UInt),
            _ => None,
        }
    }

    /// Semantic type of a member, arrays map onto their element type
    fn uniform_type(&self, ty: Word, depth: u32) -> UniformType {
        if depth > MAX_TYPE_DEPTH {
            return UniformType::Unknown;
        }

        let (scalar, components, columns) = match self.types.get(&ty) {
            Some(SpvType::Array { element, .. }) | Some(SpvType::RuntimeArray { element }) => {
                return self.uniform_type(*element, depth + 1)
            }
            Some(SpvType::Float { .. }) | Some(SpvType::Int { .. }) => (self.scalar_kind(ty), 1, 0),
            Some(SpvType::Vector { component, count }) => {
                (self.scalar_kind(*component), *count, 0)
            }
            Some(SpvType::Matrix { column, columns }) => match self.types.get(column) {
                Some(SpvType::Vector { component, count }) => {
                    (self.scalar_kind(*component), *count, *columns)
                }
                _ => (None, 0, 0),
            },
            _ => (None, 0, 0),
        };

        match scalar {
            Some(scalar) => map_uniform_type(scalar, components, columns),
            None => UniformType::Unknown,
        }
    }

    /// Declared array length, nested arrays multiply and everything else counts once
    fn element_count(&self, ty: Word, depth: u32) -> u32 {
        match self.types.get(&ty) {
            Some(SpvType::Array { element, length }) if depth <= MAX_TYPE_DEPTH => {
                length.saturating_mul(self.element_count(*element, depth + 1))
            }
            _ => 1,
        }
    }

    /// Bytes a value of `ty` spans inside a block, padding between elements included
    fn type_size(&self, ty: Word, matrix_stride: Option<u32>, depth: u32) -> u32 {
        if depth > MAX_TYPE_DEPTH {
            return 0;
        }

        match self.types.get(&ty) {
            Some(SpvType::Float { width }) | Some(SpvType::Int { width, .. }) => width / 8,
            Some(SpvType::Vector { component, count }) => {
                self.type_size(*component, None, depth + 1) * count
            }
            Some(SpvType::Matrix { column, columns }) => match matrix_stride {
                Some(stride) => stride * columns,
                None => self.type_size(*column, None, depth + 1) * columns,
            },
            Some(SpvType::Array { element, length }) => match self.array_strides.get(&ty) {
                Some(stride) => stride * length,
                None => self.type_size(*element, matrix_stride, depth + 1) * length,
            },
            Some(SpvType::Struct) => self.struct_size(ty, depth + 1),
            _ => 0,
        }
    }

    fn struct_size(&self, ty: Word, depth: u32) -> u32 {
        let members = match self.struct_members.get(&ty) {
            Some(members) => members,
            None => return 0,
        };

        members
            .iter()
            .enumerate()
            .map(|(index, &member)| {
                let index = index as u32;
                let offset = self.member_offsets.get(&(ty, index)).copied().unwrap_or(0);
                let stride = self.matrix_strides.get(&(ty, index)).copied();
                offset + self.type_size(member, stride, depth)
            })
            .max()
            .unwrap_or(0)
    }
}

/// Picks the key a uniform is stored under, `qualified` stands in for missing or taken names
fn unique_name(
    stage: ShaderStage,
    uniforms: &UniformMap,
    declared: &str,
    qualified: String,
) -> String {
    if declared.is_empty() {
        return qualified;
    }

    if uniforms.contains_key(declared) {
        log::warn!(
            "Uniform `{}` is declared twice in the {} stage, the second one is named `{}`",
            declared,
            stage,
            qualified
        );
        return qualified;
    }

    declared.to_string()
}
