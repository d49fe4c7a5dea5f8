//! Toolchain discovery and installation for on-device builds.
//!
//! Components (platform library, build tools, NDK) are acquired through an
//! ordered ladder of strategies; individual tools are located inside the
//! installed components or on the host and probed before use.

pub mod component;
pub mod download;
pub mod error;
pub mod extract;
pub mod host;
pub mod install;
pub mod manager;
pub mod probe;
pub mod tool;

pub use component::{Component, ComponentStatus};
pub use download::{Downloader, HttpDownloader};
pub use error::ToolchainError;
pub use host::HostEnvironment;
pub use install::{AcquireStrategy, InstallProgress};
pub use manager::{InstallHandle, InstallReport, NativeToolchain, ProgressSink, ToolStatus, ToolchainManager};
pub use probe::{probe, smoke_test, Probe};
pub use tool::{Tool, ToolKind};
