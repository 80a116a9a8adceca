pub use ash;

pub mod vulkan {
    pub use tephra_vulkan::*;
}

pub mod prelude {
    pub use tephra_vulkan::prelude::*;
}
