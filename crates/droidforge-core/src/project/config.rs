use std::path::{Path, PathBuf};

use crate::abi::{self, Abi};

use super::descriptor::Descriptor;
use super::layout::ProjectLayout;

pub const DEFAULT_MIN_SDK: u32 = 24;
pub const DEFAULT_TARGET_SDK: u32 = 34;

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("project name is required")]
    MissingName,
    #[error("project name '{0}' must not contain path separators")]
    InvalidName(String),
    #[error("package identifier is required")]
    MissingPackage,
    #[error("package identifier '{0}' must be dotted segments of letters, digits and '_'")]
    InvalidPackage(String),
    #[error("project directory is required")]
    MissingProjectDir,
    #[error("project directory '{0}' does not exist")]
    ProjectDirNotFound(String),
    #[error("minSdk {min} is greater than targetSdk {target}")]
    SdkRange { min: u32, target: u32 },
    #[error("descriptor key '{key}' is invalid: {reason}")]
    InvalidValue { key: &'static str, reason: String },
    #[error("failed to read project descriptor '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Immutable description of one application project.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectConfig {
    name: String,
    package: String,
    min_sdk: u32,
    target_sdk: u32,
    version_code: u32,
    version_name: String,
    debug: bool,
    native_enabled: bool,
    abis: Vec<Abi>,
    main_activity: Option<String>,
    layout: ProjectLayout,
}

impl ProjectConfig {
    pub fn builder() -> ProjectConfigBuilder {
        ProjectConfigBuilder::default()
    }

    /// Reads `project.properties` from `project_dir`. The directory name stands
    /// in for a missing `name` key.
    pub fn load(project_dir: &Path) -> Result<Self, ProjectError> {
        if !project_dir.is_dir() {
            return Err(ProjectError::ProjectDirNotFound(
                project_dir.display().to_string(),
            ));
        }
        let layout = ProjectLayout::new(project_dir);
        let descriptor_path = layout.descriptor_path();
        let contents = std::fs::read_to_string(&descriptor_path).map_err(|source| {
            ProjectError::Io {
                path: descriptor_path.display().to_string(),
                source,
            }
        })?;
        let descriptor = Descriptor::parse(&contents);

        let mut builder = ProjectConfig::builder().project_dir(project_dir);
        match descriptor.get("name") {
            Some(name) => builder = builder.name(name),
            None => {
                if let Some(dir_name) = project_dir.file_name() {
                    builder = builder.name(dir_name.to_string_lossy());
                }
            }
        }
        if let Some(package) = descriptor.get("package") {
            builder = builder.package(package);
        }
        if let Some(min_sdk) = typed(descriptor.get_u32("minSdk"), "minSdk")? {
            builder = builder.min_sdk(min_sdk);
        }
        if let Some(target_sdk) = typed(descriptor.get_u32("targetSdk"), "targetSdk")? {
            builder = builder.target_sdk(target_sdk);
        }
        if let Some(code) = typed(descriptor.get_u32("versionCode"), "versionCode")? {
            builder = builder.version_code(code);
        }
        if let Some(version_name) = descriptor.get("versionName") {
            builder = builder.version_name(version_name);
        }
        if let Some(debug) = typed(descriptor.get_bool("debug"), "debug")? {
            builder = builder.debug(debug);
        }
        if let Some(native) = typed(descriptor.get_bool("native"), "native")? {
            builder = builder.native_enabled(native);
        }
        // `abis=` with no value reads as absent and keeps every ABI; a value
        // made only of separators names none and is rejected.
        if let Some(names) = descriptor.get_list("abis") {
            if names.is_empty() {
                return Err(ProjectError::InvalidValue {
                    key: "abis",
                    reason: "no ABI listed".to_string(),
                });
            }
            let mut abis = Vec::new();
            for name in &names {
                let parsed = name
                    .parse::<Abi>()
                    .map_err(|error| ProjectError::InvalidValue {
                        key: "abis",
                        reason: error.to_string(),
                    })?;
                abis.push(parsed);
            }
            builder = builder.abis(abis);
        }
        if let Some(activity) = descriptor.get("mainActivity") {
            builder = builder.main_activity(activity);
        }
        builder.build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn min_sdk(&self) -> u32 {
        self.min_sdk
    }

    pub fn target_sdk(&self) -> u32 {
        self.target_sdk
    }

    pub fn version_code(&self) -> u32 {
        self.version_code
    }

    pub fn version_name(&self) -> &str {
        &self.version_name
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn native_enabled(&self) -> bool {
        self.native_enabled
    }

    pub fn abis(&self) -> &[Abi] {
        &self.abis
    }

    pub fn main_activity(&self) -> Option<&str> {
        self.main_activity.as_deref()
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn project_dir(&self) -> &Path {
        &self.layout.root
    }

    /// Same project with the variant switched, e.g. a command-line
    /// `--release` over a debug descriptor.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn build_variant(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "release"
        }
    }

    /// `<project>/build/outputs/apk/<name>-<debug|release>.apk`
    pub fn output_apk_path(&self) -> PathBuf {
        self.layout
            .output_dir
            .join(format!("{}-{}.apk", self.name, self.build_variant()))
    }
}

fn typed<T>(value: Result<Option<T>, String>, key: &'static str) -> Result<Option<T>, ProjectError> {
    value.map_err(|reason| ProjectError::InvalidValue { key, reason })
}

#[derive(Clone, Debug, Default)]
pub struct ProjectConfigBuilder {
    name: Option<String>,
    package: Option<String>,
    project_dir: Option<PathBuf>,
    min_sdk: Option<u32>,
    target_sdk: Option<u32>,
    version_code: Option<u32>,
    version_name: Option<String>,
    debug: Option<bool>,
    native_enabled: Option<bool>,
    abis: Option<Vec<Abi>>,
    main_activity: Option<String>,
}

impl ProjectConfigBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = Some(dir.into());
        self
    }

    pub fn min_sdk(mut self, level: u32) -> Self {
        self.min_sdk = Some(level);
        self
    }

    pub fn target_sdk(mut self, level: u32) -> Self {
        self.target_sdk = Some(level);
        self
    }

    pub fn version_code(mut self, code: u32) -> Self {
        self.version_code = Some(code);
        self
    }

    pub fn version_name(mut self, name: impl Into<String>) -> Self {
        self.version_name = Some(name.into());
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn native_enabled(mut self, enabled: bool) -> Self {
        self.native_enabled = Some(enabled);
        self
    }

    pub fn abis(mut self, abis: Vec<Abi>) -> Self {
        self.abis = Some(abis);
        self
    }

    pub fn main_activity(mut self, activity: impl Into<String>) -> Self {
        self.main_activity = Some(activity.into());
        self
    }

    pub fn build(self) -> Result<ProjectConfig, ProjectError> {
        let name = self
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or(ProjectError::MissingName)?;
        if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
            return Err(ProjectError::InvalidName(name));
        }
        let package = self
            .package
            .map(|package| package.trim().to_string())
            .filter(|package| !package.is_empty())
            .ok_or(ProjectError::MissingPackage)?;
        if !is_valid_package(&package) {
            return Err(ProjectError::InvalidPackage(package));
        }
        let project_dir = self
            .project_dir
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or(ProjectError::MissingProjectDir)?;

        let min_sdk = self.min_sdk.unwrap_or(DEFAULT_MIN_SDK);
        let target_sdk = self.target_sdk.unwrap_or(DEFAULT_TARGET_SDK);
        if min_sdk > target_sdk {
            return Err(ProjectError::SdkRange {
                min: min_sdk,
                target: target_sdk,
            });
        }

        let mut abis = Vec::new();
        for abi in self.abis.unwrap_or_else(abi::all_abis) {
            if !abis.contains(&abi) {
                abis.push(abi);
            }
        }

        Ok(ProjectConfig {
            name,
            package,
            min_sdk,
            target_sdk,
            version_code: self.version_code.unwrap_or(1),
            version_name: self.version_name.unwrap_or_else(|| "1.0".to_string()),
            debug: self.debug.unwrap_or(true),
            native_enabled: self.native_enabled.unwrap_or(false),
            abis,
            main_activity: self.main_activity.filter(|value| !value.trim().is_empty()),
            layout: ProjectLayout::new(&project_dir),
        })
    }
}

fn is_valid_package(package: &str) -> bool {
    let segments: Vec<&str> = package.split('.').collect();
    if segments.len() < 2 {
        return false;
    }
    segments.iter().all(|segment| {
        let mut chars = segment.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() || first == '_' => {
                chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
            }
            _ => false,
        }
    })
}
