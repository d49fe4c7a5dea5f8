use std::fmt;
use std::path::PathBuf;

use droidforge_core::config::ToolchainSettings;

/// Independently installable part of the toolchain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    Platform,
    BuildTools,
    Ndk,
}

impl Component {
    pub fn all() -> [Component; 3] {
        [Component::Platform, Component::BuildTools, Component::Ndk]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Component::Platform => "platform",
            Component::BuildTools => "build-tools",
            Component::Ndk => "ndk",
        }
    }

    /// Path, relative to the install directory, whose presence means the
    /// component is laid out correctly.
    pub fn marker(self) -> &'static str {
        match self {
            Component::Platform => "android.jar",
            Component::BuildTools => "aapt2",
            Component::Ndk => "toolchains",
        }
    }

    /// Configured sources, primary first.
    pub fn sources(self, settings: &ToolchainSettings) -> &[String] {
        match self {
            Component::Platform => &settings.platform_sources,
            Component::BuildTools => &settings.build_tools_sources,
            Component::Ndk => &settings.ndk_sources,
        }
    }

    pub fn install_dir(self, settings: &ToolchainSettings) -> PathBuf {
        let root = &settings.install_root;
        match self {
            Component::Platform => root
                .join("platforms")
                .join(format!("android-{}", settings.platform_api)),
            Component::BuildTools => root.join("build-tools").join(&settings.build_tools_version),
            Component::Ndk => root.join("ndk").join(&settings.ndk_version),
        }
    }

    pub fn marker_path(self, settings: &ToolchainSettings) -> PathBuf {
        self.install_dir(settings).join(self.marker())
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of checking or installing one component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComponentStatus {
    Installed { path: PathBuf, source: String },
    NotInstalled { reason: String },
}

impl ComponentStatus {
    pub fn is_installed(&self) -> bool {
        matches!(self, ComponentStatus::Installed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_dirs_follow_configured_versions() {
        let settings = ToolchainSettings {
            install_root: PathBuf::from("/opt/forge"),
            platform_api: 33,
            build_tools_version: "33.0.2".to_string(),
            ndk_version: "r26".to_string(),
            ..ToolchainSettings::default()
        };
        assert_eq!(
            Component::Platform.marker_path(&settings),
            PathBuf::from("/opt/forge/platforms/android-33/android.jar")
        );
        assert_eq!(
            Component::BuildTools.install_dir(&settings),
            PathBuf::from("/opt/forge/build-tools/33.0.2")
        );
        assert_eq!(
            Component::Ndk.marker_path(&settings),
            PathBuf::from("/opt/forge/ndk/r26/toolchains")
        );
    }
}
