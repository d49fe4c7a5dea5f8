//! Shared domain types for droidforge: project descriptors, ABIs, dependency
//! coordinates, build errors, configuration and the external process runner.

pub mod abi;
pub mod cancel;
pub mod config;
pub mod coordinate;
pub mod error;
pub mod process;
pub mod project;

pub use abi::{Abi, AbiDescriptor, AbiError};
pub use cancel::CancellationToken;
pub use config::{ConfigError, ForgeConfig};
pub use coordinate::{CoordinateError, Dependency};
pub use error::{BuildError, BuildPhase, ErrorKind};
pub use process::{ProcessError, ProcessOutput, ProcessSpec};
pub use project::{ProjectConfig, ProjectError, ProjectLayout};
