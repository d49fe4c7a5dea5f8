mod config;
mod descriptor;
mod layout;

pub use config::{ProjectConfig, ProjectConfigBuilder, ProjectError, DEFAULT_MIN_SDK, DEFAULT_TARGET_SDK};
pub use descriptor::Descriptor;
pub use layout::{
    ProjectLayout, BUILD_DIR_NAME, DESCRIPTOR_FILE_NAME, INTERMEDIATES_DIR_NAME,
    MANIFEST_FILE_NAME, OUTPUTS_DIR_NAME,
};
