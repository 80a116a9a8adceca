//! Just enough of a SPIR-V assembler to produce shader modules declaring uniform blocks and
//! samplers, without depending on an external compiler

use tephra_vulkan::shaders::ShaderStage;

const MAGIC: u32 = 0x0723_0203;
const VERSION_1_0: u32 = 0x0001_0000;

const OP_NAME: u32 = 5;
const OP_MEMBER_NAME: u32 = 6;
const OP_MEMORY_MODEL: u32 = 14;
const OP_ENTRY_POINT: u32 = 15;
const OP_EXECUTION_MODE: u32 = 16;
const OP_CAPABILITY: u32 = 17;
const OP_TYPE_VOID: u32 = 19;
const OP_TYPE_INT: u32 = 21;
const OP_TYPE_FLOAT: u32 = 22;
const OP_TYPE_VECTOR: u32 = 23;
const OP_TYPE_MATRIX: u32 = 24;
const OP_TYPE_IMAGE: u32 = 25;
const OP_TYPE_SAMPLED_IMAGE: u32 = 27;
const OP_TYPE_STRUCT: u32 = 30;
const OP_TYPE_POINTER: u32 = 32;
const OP_TYPE_FUNCTION: u32 = 33;
const OP_FUNCTION: u32 = 54;
const OP_FUNCTION_END: u32 = 56;
const OP_VARIABLE: u32 = 59;
const OP_DECORATE: u32 = 71;
const OP_MEMBER_DECORATE: u32 = 72;
const OP_LABEL: u32 = 248;
const OP_RETURN: u32 = 253;

const CAPABILITY_SHADER: u32 = 1;
const EXECUTION_MODEL_VERTEX: u32 = 0;
const EXECUTION_MODEL_FRAGMENT: u32 = 4;
const EXECUTION_MODE_ORIGIN_UPPER_LEFT: u32 = 7;

const DECORATION_BLOCK: u32 = 2;
const DECORATION_COL_MAJOR: u32 = 5;
const DECORATION_MATRIX_STRIDE: u32 = 7;
const DECORATION_BINDING: u32 = 33;
const DECORATION_DESCRIPTOR_SET: u32 = 34;
const DECORATION_OFFSET: u32 = 35;

const STORAGE_UNIFORM_CONSTANT: u32 = 0;
const STORAGE_UNIFORM: u32 = 2;

#[derive(Clone, Copy, Debug)]
pub enum MemberType {
    Float,
    Int,
    Vec4,
    Mat4,
}

#[derive(Clone, Copy, Debug)]
pub struct Member {
    pub name: &'static str,
    pub ty: MemberType,
    pub offset: u32,
}

pub const fn member(name: &'static str, ty: MemberType, offset: u32) -> Member {
    Member { name, ty, offset }
}

#[derive(Clone, Debug)]
pub struct Block {
    pub name: &'static str,
    pub binding: u32,
    pub members: Vec<Member>,
}

#[derive(Clone, Copy, Debug)]
pub struct Sampler {
    pub name: &'static str,
    pub binding: u32,
}

/// Declarations of one shader stage
#[derive(Clone, Debug)]
pub struct StageSource {
    pub stage: ShaderStage,
    pub blocks: Vec<Block>,
    pub samplers: Vec<Sampler>,
}

impl StageSource {
    pub fn new(stage: ShaderStage) -> StageSource {
        StageSource {
            stage,
            blocks: Vec::new(),
            samplers: Vec::new(),
        }
    }

    pub fn block(mut self, name: &'static str, binding: u32, members: &[Member]) -> StageSource {
        self.blocks.push(Block {
            name,
            binding,
            members: members.to_vec(),
        });
        self
    }

    pub fn sampler(mut self, name: &'static str, binding: u32) -> StageSource {
        self.samplers.push(Sampler { name, binding });
        self
    }

    pub fn assemble(&self) -> Vec<u32> {
        Assembler::default().assemble(self)
    }
}

fn string_operand(text: &str) -> Vec<u32> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }

    bytes
        .chunks(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn instruction(out: &mut Vec<u32>, opcode: u32, operands: &[u32]) {
    out.push(((operands.len() as u32 + 1) << 16) | opcode);
    out.extend_from_slice(operands);
}

#[derive(Default)]
struct Assembler {
    next_id: u32,
    names: Vec<u32>,
    decorations: Vec<u32>,
    types: Vec<u32>,
}

impl Assembler {
    fn id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn name(&mut self, id: u32, name: &str) {
        let mut operands = vec![id];
        operands.extend(string_operand(name));
        instruction(&mut self.names, OP_NAME, &operands);
    }

    fn assemble(mut self, source: &StageSource) -> Vec<u32> {
        let void = self.id();
        let function_type = self.id();
        let float = self.id();
        let int = self.id();
        let vec4 = self.id();
        let mat4 = self.id();
        let image = self.id();
        let sampled_image = self.id();
        let sampler_pointer = self.id();

        instruction(&mut self.types, OP_TYPE_VOID, &[void]);
        instruction(&mut self.types, OP_TYPE_FUNCTION, &[function_type, void]);
        instruction(&mut self.types, OP_TYPE_FLOAT, &[float, 32]);
        instruction(&mut self.types, OP_TYPE_INT, &[int, 32, 1]);
        instruction(&mut self.types, OP_TYPE_VECTOR, &[vec4, float, 4]);
        instruction(&mut self.types, OP_TYPE_MATRIX, &[mat4, vec4, 4]);
        instruction(
            &mut self.types,
            OP_TYPE_IMAGE,
            &[image, float, 1, 0, 0, 0, 1, 0],
        );
        instruction(&mut self.types, OP_TYPE_SAMPLED_IMAGE, &[sampled_image, image]);
        instruction(
            &mut self.types,
            OP_TYPE_POINTER,
            &[sampler_pointer, STORAGE_UNIFORM_CONSTANT, sampled_image],
        );

        for block in source.blocks.iter() {
            let block_type = self.id();
            let pointer = self.id();
            let variable = self.id();

            let member_types: Vec<u32> = block
                .members
                .iter()
                .map(|member| match member.ty {
                    MemberType::Float => float,
                    MemberType::Int => int,
                    MemberType::Vec4 => vec4,
                    MemberType::Mat4 => mat4,
                })
                .collect();

            let mut operands = vec![block_type];
            operands.extend(member_types);
            instruction(&mut self.types, OP_TYPE_STRUCT, &operands);
            instruction(
                &mut self.types,
                OP_TYPE_POINTER,
                &[pointer, STORAGE_UNIFORM, block_type],
            );
            instruction(
                &mut self.types,
                OP_VARIABLE,
                &[pointer, variable, STORAGE_UNIFORM],
            );

            self.name(block_type, &format!("{}Block", block.name));
            self.name(variable, block.name);
            instruction(
                &mut self.decorations,
                OP_DECORATE,
                &[block_type, DECORATION_BLOCK],
            );
            instruction(
                &mut self.decorations,
                OP_DECORATE,
                &[variable, DECORATION_DESCRIPTOR_SET, 0],
            );
            instruction(
                &mut self.decorations,
                OP_DECORATE,
                &[variable, DECORATION_BINDING, block.binding],
            );

            for (index, member) in block.members.iter().enumerate() {
                let index = index as u32;

                let mut operands = vec![block_type, index];
                operands.extend(string_operand(member.name));
                instruction(&mut self.names, OP_MEMBER_NAME, &operands);

                instruction(
                    &mut self.decorations,
                    OP_MEMBER_DECORATE,
                    &[block_type, index, DECORATION_OFFSET, member.offset],
                );
                if let MemberType::Mat4 = member.ty {
                    instruction(
                        &mut self.decorations,
                        OP_MEMBER_DECORATE,
                        &[block_type, index, DECORATION_COL_MAJOR],
                    );
                    instruction(
                        &mut self.decorations,
                        OP_MEMBER_DECORATE,
                        &[block_type, index, DECORATION_MATRIX_STRIDE, 16],
                    );
                }
            }
        }

        for sampler in source.samplers.iter() {
            let variable = self.id();
            instruction(
                &mut self.types,
                OP_VARIABLE,
                &[sampler_pointer, variable, STORAGE_UNIFORM_CONSTANT],
            );

            self.name(variable, sampler.name);
            instruction(
                &mut self.decorations,
                OP_DECORATE,
                &[variable, DECORATION_DESCRIPTOR_SET, 0],
            );
            instruction(
                &mut self.decorations,
                OP_DECORATE,
                &[variable, DECORATION_BINDING, sampler.binding],
            );
        }

        let main = self.id();
        let label = self.id();
        self.name(main, "main");

        let mut words = vec![MAGIC, VERSION_1_0, 0, self.next_id + 1, 0];
        instruction(&mut words, OP_CAPABILITY, &[CAPABILITY_SHADER]);
        instruction(&mut words, OP_MEMORY_MODEL, &[0, 1]);

        let execution_model = match source.stage {
            ShaderStage::Vertex => EXECUTION_MODEL_VERTEX,
            ShaderStage::Fragment => EXECUTION_MODEL_FRAGMENT,
        };
        let mut operands = vec![execution_model, main];
        operands.extend(string_operand("main"));
        instruction(&mut words, OP_ENTRY_POINT, &operands);
        if source.stage == ShaderStage::Fragment {
            instruction(
                &mut words,
                OP_EXECUTION_MODE,
                &[main, EXECUTION_MODE_ORIGIN_UPPER_LEFT],
            );
        }

        words.extend(self.names);
        words.extend(self.decorations);
        words.extend(self.types);

        instruction(&mut words, OP_FUNCTION, &[void, main, 0, function_type]);
        instruction(&mut words, OP_LABEL, &[label]);
        instruction(&mut words, OP_RETURN, &[]);
        instruction(&mut words, OP_FUNCTION_END, &[]);

        words
    }
}
