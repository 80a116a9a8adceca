//! Links a vertex and fragment shader into a program whose uniforms can be set by name and bound
//! to a command buffer

use ash::vk;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::{
    config::ProgramConfig,
    descriptors::{DescriptorSetBinding, DescriptorType},
    device::RenderDevice,
    shaders::{CompileError, ShaderCompiler, ShaderStage},
    uniform::{
        binding::{self, BindingError, DescriptorRefresh, TextureSlot, UniformsInstance},
        layout::{allocate_uniform_bytes, seed_defaults},
        reflect::{reflect_stage_into, ReflectError},
        TextureHandle, UniformDescriptor, UniformLocation, UniformMap,
    },
    VulkanError,
};

/// Errors that can be returned by a [ShaderProgram]
#[derive(thiserror::Error, Debug)]
pub enum ProgramError {
    #[error("Failed to compile the {stage} shader: {source}")]
    Compilation {
        stage: ShaderStage,
        source: CompileError,
    },
    #[error("Failed to reflect the {stage} shader: {source}")]
    Reflection {
        stage: ShaderStage,
        source: ReflectError,
    },
    #[error("Neither shader stage declares any uniforms")]
    NoUniforms,
    #[error("Failed to create the {0} shader module: {1}")]
    CantCreateShaderModule(ShaderStage, VulkanError),
    #[error("Failed to create the descriptor set layout: {0}")]
    CantCreateSetLayout(VulkanError),
    #[error("Failed to create the pipeline layout: {0}")]
    CantCreatePipelineLayout(VulkanError),
    #[error("The program is not linked")]
    NotLinked,
    #[error("No uniform named `{0}` in that stage")]
    UnknownUniform(String),
    #[error("Value given for `{0}` doesn't fit its uniform type")]
    TypeMismatch(String),
    #[error(transparent)]
    Binding(#[from] BindingError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgramState {
    Unlinked,
    Linked,
    Failed,
}

/// Source of link ids, unique for the whole process so instances can't mistake one link for another
static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// Native objects created by a successful link
///
/// Anything still null wasn't created yet, so a partially built set can be dropped to clean up
/// after a failed link.
struct LinkedObjects<D: RenderDevice> {
    id: u64,
    modules: [vk::ShaderModule; 2],
    set_layout: vk::DescriptorSetLayout,
    pipeline_layout: vk::PipelineLayout,
    bindings: Vec<DescriptorSetBinding>,

    device: Arc<D>,
}

impl<D: RenderDevice> LinkedObjects<D> {
    fn new(device: Arc<D>) -> LinkedObjects<D> {
        LinkedObjects {
            id: NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed),
            modules: [vk::ShaderModule::null(); 2],
            set_layout: vk::DescriptorSetLayout::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            bindings: Vec::new(),
            device,
        }
    }
}

impl<D: RenderDevice> Drop for LinkedObjects<D> {
    fn drop(&mut self) {
        for module in self.modules {
            if module != vk::ShaderModule::null() {
                self.device.destroy_shader_module(module);
            }
        }
        if self.pipeline_layout != vk::PipelineLayout::null() {
            self.device.destroy_pipeline_layout(self.pipeline_layout);
        }
        if self.set_layout != vk::DescriptorSetLayout::null() {
            self.device.destroy_descriptor_set_layout(self.set_layout);
        }
    }
}

/// Host-side uniform values, shared between whoever sets them and the render thread
#[derive(Default)]
struct UniformValues {
    bytes: [Vec<u8>; 2],
    textures: HashMap<(ShaderStage, String), Option<TextureHandle>>,
}

/// A linked pair of vertex and fragment shaders
///
/// Linking reflects both stages, sizes the host mirrors of their uniform blocks and creates the
/// descriptor set and pipeline layouts. Afterwards uniform values can be set from any thread and
/// [bind](ShaderProgram::bind) uploads them into a consumer's [UniformsInstance].
pub struct ShaderProgram<D: RenderDevice> {
    config: ProgramConfig,
    state: ProgramState,
    stages: [UniformMap; 2],
    values: Mutex<UniformValues>,
    linked: Option<LinkedObjects<D>>,

    device: Arc<D>,
}

impl<D: RenderDevice> ShaderProgram<D> {
    pub fn new(device: Arc<D>, config: ProgramConfig) -> ShaderProgram<D> {
        ShaderProgram {
            config,
            state: ProgramState::Unlinked,
            stages: [UniformMap::new(), UniformMap::new()],
            values: Mutex::new(UniformValues::default()),
            linked: None,
            device,
        }
    }

    /// Compiles both stages and links them
    ///
    /// # Errors
    /// - [ProgramError::Compilation] - The compiler rejected one of the sources
    /// - Anything [link_spirv](ShaderProgram::link_spirv) returns
    ///
    /// The program is left [Failed](ProgramState::Failed) on any error.
    pub fn link(
        &mut self,
        compiler: &dyn ShaderCompiler,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<(), ProgramError> {
        let words = compiler
            .compile(vertex_source, ShaderStage::Vertex)
            .map_err(|source| ProgramError::Compilation {
                stage: ShaderStage::Vertex,
                source,
            })
            .and_then(|vertex| {
                compiler
                    .compile(fragment_source, ShaderStage::Fragment)
                    .map(|fragment| (vertex, fragment))
                    .map_err(|source| ProgramError::Compilation {
                        stage: ShaderStage::Fragment,
                        source,
                    })
            });

        match words {
            Ok((vertex, fragment)) => self.link_spirv(&vertex, &fragment),
            Err(err) => {
                self.reset();
                self.state = ProgramState::Failed;
                log::error!("Program `{}` failed to link: {}", self.config.label, err);
                Err(err)
            }
        }
    }

    /// Links already compiled SPIR-V words
    ///
    /// Relinking releases everything the previous link created first. Instances created before
    /// a relink reallocate on their next bind.
    ///
    /// # Errors
    /// - [ProgramError::Compilation] - One of the stages has no bytecode
    /// - [ProgramError::Reflection] - The bytecode couldn't be reflected
    /// - [ProgramError::NoUniforms] - Neither stage declares a uniform
    /// - [ProgramError::CantCreateShaderModule], [ProgramError::CantCreateSetLayout] and
    /// [ProgramError::CantCreatePipelineLayout] - See the contained [VulkanError]
    pub fn link_spirv(&mut self, vertex: &[u32], fragment: &[u32]) -> Result<(), ProgramError> {
        self.reset();

        match self.build(vertex, fragment) {
            Ok(linked) => {
                self.linked = Some(linked);
                self.state = ProgramState::Linked;
                log::info!(
                    "Linked program `{}` ({} vertex uniforms, {} fragment uniforms)",
                    self.config.label,
                    self.stages[0].len(),
                    self.stages[1].len()
                );
                Ok(())
            }
            Err(err) => {
                self.reset();
                self.state = ProgramState::Failed;
                log::error!("Program `{}` failed to link: {}", self.config.label, err);
                Err(err)
            }
        }
    }

    fn reset(&mut self) {
        self.linked = None;
        self.state = ProgramState::Unlinked;
        for uniforms in self.stages.iter_mut() {
            uniforms.clear();
        }
        *self.values.get_mut() = UniformValues::default();
    }

    fn build(&mut self, vertex: &[u32], fragment: &[u32]) -> Result<LinkedObjects<D>, ProgramError> {
        let code = [vertex, fragment];

        for stage in ShaderStage::ALL {
            if code[stage.index()].is_empty() {
                return Err(ProgramError::Compilation {
                    stage,
                    source: CompileError::EmptyOutput,
                });
            }
        }

        for stage in ShaderStage::ALL {
            reflect_stage_into(stage, code[stage.index()], &mut self.stages[stage.index()])
                .map_err(|source| ProgramError::Reflection { stage, source })?;
        }

        if self.stages.iter().all(|uniforms| uniforms.is_empty()) {
            return Err(ProgramError::NoUniforms);
        }

        let mut linked = LinkedObjects::new(self.device.clone());
        for stage in ShaderStage::ALL {
            linked.modules[stage.index()] = self
                .device
                .create_shader_module(code[stage.index()])
                .map_err(|err| ProgramError::CantCreateShaderModule(stage, err))?;
        }

        let values = self.values.get_mut();
        for stage in ShaderStage::ALL {
            let uniforms = &self.stages[stage.index()];

            let mut bytes = allocate_uniform_bytes(uniforms);
            seed_defaults(uniforms, &mut bytes);
            values.bytes[stage.index()] = bytes;

            for uniform in uniforms.values().filter(|uniform| uniform.is_texture()) {
                values.textures.insert((stage, uniform.name.clone()), None);
            }
        }

        linked.bindings = binding::layout_bindings(&self.stages);
        linked.set_layout = self
            .device
            .create_descriptor_set_layout(&linked.bindings)
            .map_err(ProgramError::CantCreateSetLayout)?;
        linked.pipeline_layout = self
            .device
            .create_pipeline_layout(std::slice::from_ref(&linked.set_layout))
            .map_err(ProgramError::CantCreatePipelineLayout)?;

        Ok(linked)
    }
}

impl<D: RenderDevice> ShaderProgram<D> {
    /// Sets a uniform from raw bytes
    ///
    /// Ordinary uniforms take at most their declared size, anything beyond is dropped. Texture
    /// uniforms read the first four bytes as a little-endian [TextureHandle] index.
    ///
    /// # Errors
    /// - [ProgramError::NotLinked] - The program isn't linked
    /// - [ProgramError::UnknownUniform] - The stage has no uniform called `name`
    /// - [ProgramError::TypeMismatch] - Fewer than four bytes were given for a texture
    pub fn set_parameter(
        &self,
        name: &str,
        stage: ShaderStage,
        raw: &[u8],
    ) -> Result<(), ProgramError> {
        let uniform = self.find_uniform(name, stage)?;

        match uniform.location {
            UniformLocation::Offset(offset) => {
                let len = raw.len().min(uniform.size as usize);
                let start = offset as usize;

                let mut values = self.values.lock();
                values.bytes[stage.index()][start..start + len].copy_from_slice(&raw[..len]);
            }
            UniformLocation::Binding(_) => {
                let index: [u8; 4] = raw
                    .get(..4)
                    .and_then(|bytes| bytes.try_into().ok())
                    .ok_or_else(|| ProgramError::TypeMismatch(name.to_string()))?;

                self.values.lock().textures.insert(
                    (stage, name.to_string()),
                    Some(TextureHandle(u32::from_le_bytes(index))),
                );
            }
        }

        Ok(())
    }

    /// Sets an ordinary uniform from a plain value
    pub fn set_value<T: bytemuck::Pod>(
        &self,
        name: &str,
        stage: ShaderStage,
        value: &T,
    ) -> Result<(), ProgramError> {
        if self.find_uniform(name, stage)?.is_texture() {
            return Err(ProgramError::TypeMismatch(name.to_string()));
        }

        self.set_parameter(name, stage, bytemuck::bytes_of(value))
    }

    /// Assigns a texture to a texture uniform, `None` unassigns it
    pub fn set_texture(
        &self,
        name: &str,
        stage: ShaderStage,
        texture: Option<TextureHandle>,
    ) -> Result<(), ProgramError> {
        if !self.find_uniform(name, stage)?.is_texture() {
            return Err(ProgramError::TypeMismatch(name.to_string()));
        }

        self.values
            .lock()
            .textures
            .insert((stage, name.to_string()), texture);
        Ok(())
    }

    fn find_uniform(&self, name: &str, stage: ShaderStage) -> Result<&UniformDescriptor, ProgramError> {
        if self.state != ProgramState::Linked {
            return Err(ProgramError::NotLinked);
        }

        self.stages[stage.index()]
            .get(name)
            .ok_or_else(|| ProgramError::UnknownUniform(name.to_string()))
    }

    /// Uploads the current uniform values into `instance` and records binding its descriptor set
    ///
    /// Buffers and the descriptor set are (re)allocated first if they no longer match the
    /// program. Nothing is recorded unless every step before it succeeded.
    pub fn bind(
        &self,
        instance: &mut UniformsInstance<D>,
        command_buffer: vk::CommandBuffer,
    ) -> Result<DescriptorRefresh, ProgramError> {
        let linked = match (&self.linked, self.state) {
            (Some(linked), ProgramState::Linked) => linked,
            _ => return Err(ProgramError::NotLinked),
        };

        let values = self.values.lock();
        let [vertex_bytes, fragment_bytes] = &values.bytes;

        instance.ensure_capacity(linked.id, linked.set_layout, vertex_bytes, fragment_bytes)?;
        instance.write_values(vertex_bytes, fragment_bytes)?;

        let mut slots: Vec<TextureSlot> = ShaderStage::ALL
            .into_iter()
            .flat_map(|stage| {
                self.stages[stage.index()]
                    .values()
                    .filter_map(move |uniform| match uniform.location {
                        UniformLocation::Binding(binding) => Some((stage, uniform, binding)),
                        UniformLocation::Offset(_) => None,
                    })
            })
            .map(|(stage, uniform, binding)| TextureSlot {
                name: uniform.name.as_str(),
                binding,
                texture: values
                    .textures
                    .get(&(stage, uniform.name.clone()))
                    .copied()
                    .flatten(),
            })
            .collect();
        // One write per sampler binding, preferring a slot that has a texture assigned
        slots.sort_by_key(|slot| (slot.binding, slot.texture.is_none()));
        slots.dedup_by_key(|slot| slot.binding);
        slots.retain(|slot| {
            linked.bindings.iter().any(|binding| {
                binding.binding == slot.binding && binding.ty == DescriptorType::CombinedImageSampler
            })
        });

        let refresh = instance.refresh_descriptor_set(&slots)?;
        let set = instance
            .descriptor_set()
            .ok_or(BindingError::MissingDescriptorSet)?;

        self.device
            .cmd_bind_descriptor_set(command_buffer, linked.pipeline_layout, set);

        Ok(refresh)
    }

    /// Creates an unallocated [UniformsInstance] on this program's device
    pub fn create_instance(&self) -> UniformsInstance<D> {
        UniformsInstance::new(self.device.clone())
    }
}

impl<D: RenderDevice> ShaderProgram<D> {
    pub fn config(&self) -> &ProgramConfig {
        &self.config
    }

    pub fn state(&self) -> ProgramState {
        self.state
    }

    pub fn uniform(&self, name: &str, stage: ShaderStage) -> Option<&UniformDescriptor> {
        self.stages[stage.index()].get(name)
    }

    pub fn uniforms(&self, stage: ShaderStage) -> &UniformMap {
        &self.stages[stage.index()]
    }

    /// Copy of the host mirror of a stage's uniform block
    pub fn uniform_bytes(&self, stage: ShaderStage) -> Vec<u8> {
        self.values.lock().bytes[stage.index()].clone()
    }

    /// Texture currently assigned to a texture uniform
    pub fn texture(&self, name: &str, stage: ShaderStage) -> Option<TextureHandle> {
        self.values
            .lock()
            .textures
            .get(&(stage, name.to_string()))
            .copied()
            .flatten()
    }

    pub fn descriptor_set_layout(&self) -> Option<vk::DescriptorSetLayout> {
        self.linked.as_ref().map(|linked| linked.set_layout)
    }

    pub fn pipeline_layout(&self) -> Option<vk::PipelineLayout> {
        self.linked.as_ref().map(|linked| linked.pipeline_layout)
    }

    /// Id of the current link, `None` while unlinked
    ///
    /// Every successful link gets a new id, even when it recreates identical layouts.
    pub fn link_id(&self) -> Option<u64> {
        self.linked.as_ref().map(|linked| linked.id)
    }

    pub fn layout_bindings(&self) -> &[DescriptorSetBinding] {
        self.linked
            .as_ref()
            .map_or(&[], |linked| linked.bindings.as_slice())
    }

    /// Stage descriptions for building a graphics pipeline around this program
    ///
    /// The returned structs point into the program's entry point name, so they must not outlive
    /// it.
    pub fn shader_stages(&self) -> Result<Vec<vk::PipelineShaderStageCreateInfo>, ProgramError> {
        let linked = self.linked.as_ref().ok_or(ProgramError::NotLinked)?;

        Ok(ShaderStage::ALL
            .into_iter()
            .map(|stage| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .module(linked.modules[stage.index()])
                    .name(&self.config.entry_point)
                    .stage(stage.into())
                    .build()
            })
            .collect())
    }
}
