use std::ffi::CString;

/// Settings for a [ShaderProgram](crate::program::ShaderProgram)
#[derive(Clone, Debug)]
pub struct ProgramConfig {
    /// Name used when logging about the program
    pub label: String,
    /// Entry point both stages are compiled with
    pub entry_point: CString,
}

impl ProgramConfig {
    pub fn label<S: Into<String>>(mut self, label: S) -> ProgramConfig {
        self.label = label.into();
        self
    }

    pub fn entry_point(mut self, entry_point: CString) -> ProgramConfig {
        self.entry_point = entry_point;
        self
    }
}

impl Default for ProgramConfig {
    fn default() -> Self {
        ProgramConfig {
            label: "unnamed".to_string(),
            entry_point: CString::new("main").unwrap_or_default(),
        }
    }
}

/// Settings for a [VulkanDevice](crate::device::VulkanDevice)
#[derive(Clone, Copy, Debug)]
pub struct DeviceConfig {
    /// Descriptor sets each descriptor pool can hand out before a new pool is created
    pub sets_per_pool: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig { sets_per_pool: 1000 }
    }
}
