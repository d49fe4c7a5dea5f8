//! Injected build settings: toolchain versions and sources, resolver
//! repositories, process timeouts and signing material.
//!
//! Read from `droidforge.yaml` in the project directory when present; every
//! field has a default so an absent file yields a usable configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

pub const CONFIG_FILE_NAME: &str = "droidforge.yaml";
pub const HOME_ENV: &str = "DROIDFORGE_HOME";
pub const SIGNING_KEY_ENV: &str = "DROIDFORGE_SIGNING_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config '{path}': {source}")]
    Yaml {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("config field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ForgeConfig {
    pub toolchain: ToolchainSettings,
    pub resolver: ResolverSettings,
    pub timeouts: ProcessTimeouts,
    pub signing: SigningSettings,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ToolchainSettings {
    /// Directory holding platforms/, build-tools/, ndk/ and downloads/.
    pub install_root: PathBuf,
    pub platform_api: u32,
    pub build_tools_version: String,
    pub ndk_version: String,
    /// Archives or files for each component: the first entry is the primary
    /// source, the rest are mirrors tried in order.
    pub platform_sources: Vec<String>,
    pub build_tools_sources: Vec<String>,
    pub ndk_sources: Vec<String>,
    /// Directory searched for pre-shipped component archives.
    pub bundled_archive_dir: Option<PathBuf>,
    /// Host SDK used by the wrapper-script fallback; `ANDROID_HOME` otherwise.
    pub host_sdk_dir: Option<PathBuf>,
    pub install_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ToolchainSettings {
    fn default() -> Self {
        Self {
            install_root: default_install_root(),
            platform_api: 34,
            build_tools_version: "34.0.0".to_string(),
            ndk_version: "r27b".to_string(),
            platform_sources: vec![
                "https://dl.google.com/android/repository/platform-34-ext7_r02.zip".to_string(),
                "https://github.com/Sable/android-platforms/raw/master/android-34/android.jar"
                    .to_string(),
            ],
            build_tools_sources: vec![
                "https://github.com/lzhiyong/android-sdk-tools/releases/download/34.0.3/android-sdk-tools-static-aarch64.zip".to_string(),
                "https://dl.google.com/android/repository/build-tools_r34-linux.zip".to_string(),
            ],
            ndk_sources: vec![
                "https://github.com/lzhiyong/termux-ndk/releases/download/android-ndk/android-ndk-r27b-aarch64.zip".to_string(),
                "https://github.com/HomuHomu833/android-ndk-custom/releases/download/r27/android-ndk-r27-aarch64-linux-android.tar.gz".to_string(),
            ],
            bundled_archive_dir: None,
            host_sdk_dir: None,
            install_timeout_secs: 600,
            user_agent: format!("droidforge/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ToolchainSettings {
    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ResolverSettings {
    pub repositories: Vec<String>,
    /// Local dependency cache; defaults to `<install_root>/m2`.
    pub cache_dir: Option<PathBuf>,
    pub workers: usize,
    pub timeout_secs: u64,
    pub max_redirects: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            repositories: vec![
                "https://repo1.maven.org/maven2".to_string(),
                "https://dl.google.com/dl/android/maven2".to_string(),
                "https://jitpack.io".to_string(),
            ],
            cache_dir: None,
            workers: 4,
            timeout_secs: 60,
            max_redirects: 5,
        }
    }
}

impl ResolverSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Per-tool ceilings for external process runs, in seconds.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ProcessTimeouts {
    pub native_compile_secs: u64,
    pub native_link_secs: u64,
    pub managed_compile_secs: u64,
    pub resources_secs: u64,
    pub dex_secs: u64,
    pub optimize_secs: u64,
}

impl Default for ProcessTimeouts {
    fn default() -> Self {
        Self {
            native_compile_secs: 300,
            native_link_secs: 120,
            managed_compile_secs: 300,
            resources_secs: 300,
            dex_secs: 600,
            optimize_secs: 600,
        }
    }
}

impl ProcessTimeouts {
    pub fn native_compile(&self) -> Duration {
        Duration::from_secs(self.native_compile_secs)
    }

    pub fn native_link(&self) -> Duration {
        Duration::from_secs(self.native_link_secs)
    }

    pub fn managed_compile(&self) -> Duration {
        Duration::from_secs(self.managed_compile_secs)
    }

    pub fn resources(&self) -> Duration {
        Duration::from_secs(self.resources_secs)
    }

    pub fn dex(&self) -> Duration {
        Duration::from_secs(self.dex_secs)
    }

    pub fn optimize(&self) -> Duration {
        Duration::from_secs(self.optimize_secs)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SigningSettings {
    /// Hex-encoded 64-byte Ed25519 keypair; a fresh key is generated when unset.
    pub private_key: Option<String>,
}

impl ForgeConfig {
    /// Loads `droidforge.yaml` from `project_dir`, falling back to defaults,
    /// then applies environment overrides.
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let mut config = match read_optional_config(project_dir)? {
            Some((path, contents)) => parse_config(&path, &contents)?,
            None => ForgeConfig::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn resolver_cache_dir(&self) -> PathBuf {
        self.resolver
            .cache_dir
            .clone()
            .unwrap_or_else(|| self.toolchain.install_root.join("m2"))
    }

    fn apply_env(&mut self) {
        if let Ok(home) = std::env::var(HOME_ENV) {
            if !home.trim().is_empty() {
                self.toolchain.install_root = PathBuf::from(home);
            }
        }
        if self.signing.private_key.is_none() {
            if let Ok(key) = std::env::var(SIGNING_KEY_ENV) {
                if !key.trim().is_empty() {
                    self.signing.private_key = Some(key.trim().to_string());
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolver.workers == 0 {
            return Err(ConfigError::InvalidField {
                field: "resolver.workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.toolchain.platform_api == 0 {
            return Err(ConfigError::InvalidField {
                field: "toolchain.platform_api",
                reason: "must be a positive API level".to_string(),
            });
        }
        if self.toolchain.build_tools_version.trim().is_empty() {
            return Err(ConfigError::InvalidField {
                field: "toolchain.build_tools_version",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

pub fn parse_config(path: &str, contents: &str) -> Result<ForgeConfig, ConfigError> {
    if contents.trim().is_empty() {
        return Ok(ForgeConfig::default());
    }
    serde_yaml::from_str(contents).map_err(|source| ConfigError::Yaml {
        path: path.to_string(),
        source,
    })
}

fn read_optional_config(project_dir: &Path) -> Result<Option<(String, String)>, ConfigError> {
    let yaml_path = project_dir.join(CONFIG_FILE_NAME);
    if !yaml_path.exists() {
        return Ok(None);
    }
    let display = yaml_path.to_string_lossy().into_owned();
    let contents = std::fs::read_to_string(&yaml_path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;
    Ok(Some((display, contents)))
}

fn default_install_root() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".droidforge"),
        None => std::env::temp_dir().join("droidforge"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse_config("droidforge.yaml", "").expect("config");
        assert_eq!(config.resolver.workers, 4);
        assert_eq!(config.resolver.timeout(), Duration::from_secs(60));
        assert_eq!(config.toolchain.install_timeout(), Duration::from_secs(600));
        assert_eq!(config.toolchain.platform_api, 34);
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let yaml = "toolchain:\n  build_tools_version: \"33.0.2\"\n  platform_sources:\n    - file:///sdcard/android.jar\nresolver:\n  workers: 2\ntimeouts:\n  dex_secs: 120\n";
        let config = parse_config("droidforge.yaml", yaml).expect("config");
        assert_eq!(config.toolchain.build_tools_version, "33.0.2");
        assert_eq!(config.toolchain.platform_sources, vec!["file:///sdcard/android.jar"]);
        assert_eq!(config.toolchain.ndk_version, "r27b");
        assert_eq!(config.resolver.workers, 2);
        assert_eq!(config.timeouts.dex(), Duration::from_secs(120));
        assert_eq!(config.timeouts.native_link(), Duration::from_secs(120));
    }

    #[test]
    fn zero_workers_rejected() {
        let config = parse_config("droidforge.yaml", "resolver:\n  workers: 0\n").expect("parse");
        let error = config.validate().expect_err("invalid");
        assert!(error.to_string().contains("resolver.workers"));
    }

    #[test]
    fn malformed_yaml_is_reported_with_path() {
        let error = parse_config("/p/droidforge.yaml", "resolver: [").expect_err("error");
        assert!(error.to_string().contains("/p/droidforge.yaml"));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ForgeConfig::load(dir.path()).expect("config");
        assert_eq!(config.resolver.repositories.len(), 3);
    }
}
