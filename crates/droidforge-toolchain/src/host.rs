//! Fallback onto a separately installed host SDK/NDK through thin wrapper
//! scripts.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use droidforge_core::config::ToolchainSettings;
use droidforge_core::process::make_executable;

use crate::component::Component;
use crate::error::ToolchainError;

const HOST_PREBUILT_NAME: &str = "host";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostEnvironment {
    pub sdk_dir: Option<PathBuf>,
    pub ndk_dir: Option<PathBuf>,
}

impl HostEnvironment {
    /// Configured host SDK, then `ANDROID_HOME` / `ANDROID_SDK_ROOT`; NDK from
    /// `ANDROID_NDK_HOME` / `ANDROID_NDK_ROOT` or the SDK's `ndk/` directory.
    pub fn detect(settings: &ToolchainSettings) -> Self {
        let sdk_dir = settings
            .host_sdk_dir
            .clone()
            .or_else(|| env_dir("ANDROID_HOME"))
            .or_else(|| env_dir("ANDROID_SDK_ROOT"))
            .filter(|dir| dir.is_dir());
        let ndk_dir = env_dir("ANDROID_NDK_HOME")
            .or_else(|| env_dir("ANDROID_NDK_ROOT"))
            .filter(|dir| dir.is_dir())
            .or_else(|| {
                let sdk = sdk_dir.as_ref()?;
                newest_child(&sdk.join("ndk")).or_else(|| {
                    let bundle = sdk.join("ndk-bundle");
                    bundle.is_dir().then_some(bundle)
                })
            });
        Self { sdk_dir, ndk_dir }
    }

    /// Tool from the newest host build-tools, then the search path.
    pub fn find_build_tool(&self, name: &str) -> Option<PathBuf> {
        self.sdk_dir
            .as_ref()
            .and_then(|sdk| newest_child(&sdk.join("build-tools")))
            .map(|dir| dir.join(name))
            .filter(|path| path.is_file())
            .or_else(|| which::which(name).ok())
    }

    pub fn find_platform_jar(&self, api: u32) -> Option<PathBuf> {
        let platforms = self.sdk_dir.as_ref()?.join("platforms");
        let exact = platforms.join(format!("android-{}", api)).join("android.jar");
        if exact.is_file() {
            return Some(exact);
        }
        newest_child(&platforms)
            .map(|dir| dir.join("android.jar"))
            .filter(|path| path.is_file())
    }

    /// `toolchains/llvm/prebuilt/<host-tag>` of the host NDK.
    pub fn find_ndk_prebuilt(&self) -> Option<PathBuf> {
        let prebuilt = self.ndk_dir.as_ref()?.join("toolchains/llvm/prebuilt");
        ndk_prebuilt_dir(&prebuilt)
    }
}

fn env_dir(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Orders version-like names numerically: `9.0.0` < `34.0.0`.
pub(crate) fn version_key(name: &str) -> Vec<u64> {
    name.split(|ch: char| !ch.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse().ok())
        .collect()
}

pub(crate) fn newest_child(dir: &Path) -> Option<PathBuf> {
    let mut children: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_dir())
        .collect();
    children.sort_by_key(|path| {
        path.file_name()
            .map(|name| version_key(&name.to_string_lossy()))
            .unwrap_or_default()
    });
    children.pop()
}

/// Picks the prebuilt directory matching the running host, else the first one.
pub(crate) fn ndk_prebuilt_dir(prebuilt: &Path) -> Option<PathBuf> {
    let preferred = prebuilt.join(format!("linux-{}", std::env::consts::ARCH));
    if preferred.is_dir() {
        return Some(preferred);
    }
    let mut children: Vec<PathBuf> = fs::read_dir(prebuilt)
        .ok()?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.join("bin").is_dir())
        .collect();
    children.sort();
    children.into_iter().next()
}

pub fn wrapper_script(target: &Path) -> String {
    let quoted = target.display().to_string().replace('\'', "'\\''");
    format!("#!/bin/sh\nexec '{}' \"$@\"\n", quoted)
}

pub fn write_wrapper(path: &Path, target: &Path) -> Result<(), ToolchainError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| ToolchainError::io(parent, error))?;
    }
    fs::write(path, wrapper_script(target)).map_err(|error| ToolchainError::io(path, error))?;
    make_executable(path).map_err(|error| ToolchainError::io(path, error))
}

fn copy_file(from: &Path, to: &Path) -> Result<(), ToolchainError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|error| ToolchainError::io(parent, error))?;
    }
    fs::copy(from, to)
        .map(|_| ())
        .map_err(|error| ToolchainError::io(to, error))
}

/// Lays out `component` inside `install_dir` by pointing at host tools.
pub fn install_from_host(
    component: Component,
    settings: &ToolchainSettings,
    host: &HostEnvironment,
    install_dir: &Path,
) -> Result<(), ToolchainError> {
    match component {
        Component::Platform => {
            let jar = host
                .find_platform_jar(settings.platform_api)
                .ok_or(ToolchainError::HostUnavailable("android.jar"))?;
            copy_file(&jar, &install_dir.join("android.jar"))
        }
        Component::BuildTools => {
            let aapt2 = host
                .find_build_tool("aapt2")
                .ok_or(ToolchainError::HostUnavailable("aapt2"))?;
            write_wrapper(&install_dir.join("aapt2"), &aapt2)?;
            for name in ["d8", "dx", "apksigner"] {
                if let Some(target) = host.find_build_tool(name) {
                    write_wrapper(&install_dir.join(name), &target)?;
                }
            }
            if let Some(d8_jar) = host
                .sdk_dir
                .as_ref()
                .and_then(|sdk| newest_child(&sdk.join("build-tools")))
                .map(|dir| dir.join("lib").join("d8.jar"))
                .filter(|path| path.is_file())
            {
                copy_file(&d8_jar, &install_dir.join("lib").join("d8.jar"))?;
            }
            Ok(())
        }
        Component::Ndk => install_ndk_from_host(host, install_dir),
    }
}

fn install_ndk_from_host(host: &HostEnvironment, install_dir: &Path) -> Result<(), ToolchainError> {
    let target_prebuilt = install_dir
        .join("toolchains/llvm/prebuilt")
        .join(HOST_PREBUILT_NAME);
    let bin = target_prebuilt.join("bin");
    match host.find_ndk_prebuilt() {
        Some(prebuilt) => {
            for name in ["clang", "clang++"] {
                let target = prebuilt.join("bin").join(name);
                if target.is_file() {
                    write_wrapper(&bin.join(name), &target)?;
                }
            }
            link_sysroot(&prebuilt.join("sysroot"), &target_prebuilt.join("sysroot"))?;
            if let Some(ndk_build) = host
                .ndk_dir
                .as_ref()
                .map(|ndk| ndk.join("ndk-build"))
                .filter(|path| path.is_file())
            {
                write_wrapper(&install_dir.join("ndk-build"), &ndk_build)?;
            }
        }
        None => {
            let clang = which::which("clang").map_err(|_| ToolchainError::HostUnavailable("clang"))?;
            write_wrapper(&bin.join("clang"), &clang)?;
            if let Ok(clangxx) = which::which("clang++") {
                write_wrapper(&bin.join("clang++"), &clangxx)?;
            }
        }
    }
    if !bin.join("clang").is_file() {
        return Err(ToolchainError::HostUnavailable("clang"));
    }
    debug!(dir = %install_dir.display(), "ndk wrappers written");
    Ok(())
}

#[cfg(unix)]
fn link_sysroot(host_sysroot: &Path, link: &Path) -> Result<(), ToolchainError> {
    if !host_sysroot.is_dir() || link.exists() {
        return Ok(());
    }
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent).map_err(|error| ToolchainError::io(parent, error))?;
    }
    std::os::unix::fs::symlink(host_sysroot, link).map_err(|error| ToolchainError::io(link, error))
}

#[cfg(not(unix))]
fn link_sysroot(_host_sysroot: &Path, _link: &Path) -> Result<(), ToolchainError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering_is_numeric() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["9.0.0", "34.0.0", "30.0.3"] {
            fs::create_dir_all(dir.path().join(name)).expect("mkdir");
        }
        assert_eq!(newest_child(dir.path()), Some(dir.path().join("34.0.0")));
    }

    #[test]
    fn wrapper_quotes_target() {
        let script = wrapper_script(Path::new("/opt/it's/aapt2"));
        assert_eq!(script, "#!/bin/sh\nexec '/opt/it'\\''s/aapt2' \"$@\"\n");
    }

    #[test]
    fn platform_and_build_tools_from_host_sdk() {
        let sdk = tempfile::tempdir().expect("sdk");
        let jar_dir = sdk.path().join("platforms/android-34");
        fs::create_dir_all(&jar_dir).expect("mkdir");
        fs::write(jar_dir.join("android.jar"), b"PK").expect("write");
        let tools = sdk.path().join("build-tools/34.0.0");
        fs::create_dir_all(tools.join("lib")).expect("mkdir");
        fs::write(tools.join("aapt2"), b"#!/bin/sh\n").expect("write");
        fs::write(tools.join("lib/d8.jar"), b"PK").expect("write");

        let host = HostEnvironment {
            sdk_dir: Some(sdk.path().to_path_buf()),
            ndk_dir: None,
        };
        let settings = ToolchainSettings::default();
        let out = tempfile::tempdir().expect("out");

        install_from_host(Component::Platform, &settings, &host, out.path()).expect("platform");
        assert!(out.path().join("android.jar").is_file());

        let bt = out.path().join("bt");
        install_from_host(Component::BuildTools, &settings, &host, &bt).expect("build tools");
        let wrapper = fs::read_to_string(bt.join("aapt2")).expect("wrapper");
        assert!(wrapper.contains(&tools.join("aapt2").display().to_string()));
        assert!(bt.join("lib/d8.jar").is_file());
    }
}
