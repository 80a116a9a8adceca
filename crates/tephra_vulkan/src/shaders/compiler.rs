use std::path::{Path, PathBuf};

use super::{CompileError, ShaderCompiler, ShaderStage};

/// Loads precompiled SPIR-V from disk
///
/// The source handed to [ShaderCompiler::compile] is a file path. Paths that don't already end
/// in `.spv` get it appended, so `shaders/lit.frag` loads `shaders/lit.frag.spv`, matching what
/// the offline shader build emits.
#[derive(Clone, Debug, Default)]
pub struct SpirvFileCompiler {
    root: Option<PathBuf>,
}

impl SpirvFileCompiler {
    pub fn new() -> SpirvFileCompiler {
        SpirvFileCompiler { root: None }
    }

    /// Resolves relative shader paths against `root`
    pub fn with_root<P: Into<PathBuf>>(root: P) -> SpirvFileCompiler {
        SpirvFileCompiler {
            root: Some(root.into()),
        }
    }

    pub(crate) fn resolve(&self, source: &str) -> PathBuf {
        let mut path = match &self.root {
            Some(root) => root.join(source),
            None => Path::new(source).to_path_buf(),
        };

        let is_spv = path.extension().map_or(false, |ext| ext == "spv");
        if !is_spv {
            let extension = match path.extension().and_then(|ext| ext.to_str()) {
                Some(ext) => format!("{}.spv", ext),
                None => "spv".to_string(),
            };
            path.set_extension(extension);
        }

        path
    }
}

impl ShaderCompiler for SpirvFileCompiler {
    fn compile(&self, source: &str, stage: ShaderStage) -> Result<Vec<u32>, CompileError> {
        use std::fs::File;

        let path = self.resolve(source);
        log::debug!("Loading {} shader from {:?}", stage, path);

        let mut file =
            File::open(&path).map_err(|_| CompileError::FileNotFound(path.display().to_string()))?;
        let code = ash::util::read_spv(&mut file)
            .map_err(|_| CompileError::CantRead(path.display().to_string()))?;

        if code.is_empty() {
            return Err(CompileError::EmptyOutput);
        }
        Ok(code)
    }
}

/// Compiles GLSL source at runtime through shaderc
#[cfg(feature = "shaderc")]
pub struct GlslCompiler {
    compiler: shaderc::Compiler,
    entry_point: String,
}

#[cfg(feature = "shaderc")]
impl GlslCompiler {
    pub fn new() -> Result<GlslCompiler, CompileError> {
        let compiler = shaderc::Compiler::new()
            .ok_or_else(|| CompileError::Failed("shaderc is not available".to_string()))?;

        Ok(GlslCompiler {
            compiler,
            entry_point: "main".to_string(),
        })
    }
}

#[cfg(feature = "shaderc")]
impl ShaderCompiler for GlslCompiler {
    fn compile(&self, source: &str, stage: ShaderStage) -> Result<Vec<u32>, CompileError> {
        let kind = match stage {
            ShaderStage::Vertex => shaderc::ShaderKind::Vertex,
            ShaderStage::Fragment => shaderc::ShaderKind::Fragment,
        };

        let mut options = shaderc::CompileOptions::new()
            .ok_or_else(|| CompileError::Failed("Can't create shaderc options".to_string()))?;
        options.set_target_env(
            shaderc::TargetEnv::Vulkan,
            shaderc::EnvVersion::Vulkan1_1 as u32,
        );

        let file_name = format!("inline.{}", stage);
        let artifact = self
            .compiler
            .compile_into_spirv(source, kind, &file_name, &self.entry_point, Some(&options))
            .map_err(|err| CompileError::Failed(err.to_string()))?;

        if artifact.get_num_warnings() > 0 {
            log::warn!("{}", artifact.get_warning_messages());
        }

        let code = artifact.as_binary().to_vec();
        if code.is_empty() {
            return Err(CompileError::EmptyOutput);
        }
        Ok(code)
    }
}
