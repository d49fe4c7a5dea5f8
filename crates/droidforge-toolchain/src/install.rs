//! Per-component acquisition ladder.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use droidforge_core::config::ToolchainSettings;

use crate::component::{Component, ComponentStatus};
use crate::download::{self, Downloader};
use crate::error::ToolchainError;
use crate::extract;
use crate::host::{self, HostEnvironment};

#[derive(Clone, Debug, PartialEq)]
pub struct InstallProgress {
    pub component: Component,
    pub message: String,
    /// 0.0..=1.0 while a transfer with a known length is running.
    pub fraction: Option<f32>,
}

pub struct InstallContext<'a> {
    pub component: Component,
    pub settings: &'a ToolchainSettings,
    pub downloader: &'a dyn Downloader,
    pub host: &'a HostEnvironment,
    pub progress: &'a (dyn Fn(InstallProgress) + Sync),
}

impl InstallContext<'_> {
    fn report(&self, message: impl Into<String>, fraction: Option<f32>) {
        (self.progress)(InstallProgress {
            component: self.component,
            message: message.into(),
            fraction,
        });
    }

    fn install_dir(&self) -> PathBuf {
        self.component.install_dir(self.settings)
    }
}

/// One way of getting a component onto disk. A failure only means the next
/// strategy gets a turn.
pub trait AcquireStrategy: Send + Sync {
    fn describe(&self) -> String;
    fn acquire(&self, ctx: &InstallContext<'_>) -> Result<(), ToolchainError>;
}

pub struct AlreadyInstalled;

impl AcquireStrategy for AlreadyInstalled {
    fn describe(&self) -> String {
        "existing installation".to_string()
    }

    fn acquire(&self, ctx: &InstallContext<'_>) -> Result<(), ToolchainError> {
        if marker_present(ctx.component, ctx.settings) {
            Ok(())
        } else {
            Err(marker_missing(ctx.component, &ctx.install_dir()))
        }
    }
}

pub struct BundledArchive {
    pub dir: PathBuf,
}

impl AcquireStrategy for BundledArchive {
    fn describe(&self) -> String {
        format!("bundled archive in {}", self.dir.display())
    }

    fn acquire(&self, ctx: &InstallContext<'_>) -> Result<(), ToolchainError> {
        let archive = bundled_candidate(&self.dir, ctx.component)
            .ok_or_else(|| ToolchainError::LocalSourceMissing(self.describe()))?;
        ctx.report(format!("unpacking {}", archive.display()), None);
        let hint = archive.to_string_lossy().into_owned();
        install_from_file(ctx, &archive, &hint)
    }
}

pub struct Download {
    pub source: String,
    pub mirror: bool,
}

impl AcquireStrategy for Download {
    fn describe(&self) -> String {
        if self.mirror {
            format!("mirror {}", self.source)
        } else {
            format!("download {}", self.source)
        }
    }

    fn acquire(&self, ctx: &InstallContext<'_>) -> Result<(), ToolchainError> {
        let file_name = download::source_file_name(&self.source)
            .unwrap_or_else(|| format!("{}.archive", ctx.component));
        let dest = ctx
            .settings
            .install_root
            .join("downloads")
            .join(format!("{}-{}", ctx.component, file_name));
        if !dest.is_file() {
            ctx.report(format!("fetching {}", self.source), Some(0.0));
            ctx.downloader
                .download(&self.source, &dest, &|written, total| {
                    let fraction = total
                        .filter(|total| *total > 0)
                        .map(|total| (written as f64 / total as f64).min(1.0) as f32);
                    ctx.report(format!("fetching {}", self.source), fraction);
                })?;
        }
        let result = install_from_file(ctx, &dest, &self.source);
        if result.is_err() {
            // a bad archive must not short-circuit the next attempt
            let _ = fs::remove_file(&dest);
        }
        result
    }
}

pub struct HostWrapper;

impl AcquireStrategy for HostWrapper {
    fn describe(&self) -> String {
        "host environment wrappers".to_string()
    }

    fn acquire(&self, ctx: &InstallContext<'_>) -> Result<(), ToolchainError> {
        ctx.report("linking host tools", None);
        let install_dir = ctx.install_dir();
        let staging = staging_dir(&install_dir);
        reset_dir(&staging)?;
        let result = host::install_from_host(ctx.component, ctx.settings, ctx.host, &staging)
            .and_then(|()| promote(ctx.component, &staging, &install_dir));
        if result.is_err() {
            let _ = fs::remove_dir_all(&staging);
        }
        result
    }
}

/// Installed, bundled, primary download, mirrors, host wrappers.
pub fn default_strategies(
    component: Component,
    settings: &ToolchainSettings,
) -> Vec<Box<dyn AcquireStrategy>> {
    let mut strategies: Vec<Box<dyn AcquireStrategy>> = vec![Box::new(AlreadyInstalled)];
    if let Some(dir) = &settings.bundled_archive_dir {
        strategies.push(Box::new(BundledArchive { dir: dir.clone() }));
    }
    for (index, source) in component.sources(settings).iter().enumerate() {
        strategies.push(Box::new(Download {
            source: source.clone(),
            mirror: index > 0,
        }));
    }
    strategies.push(Box::new(HostWrapper));
    strategies
}

/// Runs strategies in order until one lays the component out. Never fails:
/// exhaustion is reported as `NotInstalled` with every reason collected.
pub fn run_ladder(
    strategies: &[Box<dyn AcquireStrategy>],
    ctx: &InstallContext<'_>,
) -> ComponentStatus {
    let mut reasons = Vec::new();
    for strategy in strategies {
        match strategy.acquire(ctx) {
            Ok(()) if marker_present(ctx.component, ctx.settings) => {
                let source = strategy.describe();
                info!(component = %ctx.component, %source, "component ready");
                ctx.report(format!("ready via {}", source), Some(1.0));
                return ComponentStatus::Installed {
                    path: ctx.install_dir(),
                    source,
                };
            }
            Ok(()) => reasons.push(format!(
                "{}: {}",
                strategy.describe(),
                marker_missing(ctx.component, &ctx.install_dir())
            )),
            Err(error) => reasons.push(format!("{}: {}", strategy.describe(), error)),
        }
    }
    let reason = if reasons.is_empty() {
        "no acquisition strategy configured".to_string()
    } else {
        reasons.join("; ")
    };
    warn!(component = %ctx.component, %reason, "component not installed");
    ctx.report("not installed", None);
    ComponentStatus::NotInstalled { reason }
}

pub fn marker_present(component: Component, settings: &ToolchainSettings) -> bool {
    let marker = component.marker_path(settings);
    match fs::metadata(&marker) {
        Ok(metadata) if metadata.is_dir() => true,
        Ok(metadata) => metadata.len() > 0,
        Err(_) => false,
    }
}

fn marker_missing(component: Component, dir: &Path) -> ToolchainError {
    ToolchainError::MarkerMissing {
        component: component.as_str(),
        marker: component.marker(),
        dir: dir.display().to_string(),
    }
}

fn bundled_candidate(dir: &Path, component: Component) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default();
            match component {
                Component::Platform => name.starts_with("platform") || name == "android.jar",
                Component::BuildTools => name.starts_with("build-tools"),
                Component::Ndk => name.starts_with("ndk") || name.starts_with("android-ndk"),
            }
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// Installs from a local archive. A bare `.jar` for the platform component is
/// the marker itself and is copied rather than unpacked.
fn install_from_file(
    ctx: &InstallContext<'_>,
    archive: &Path,
    hint: &str,
) -> Result<(), ToolchainError> {
    let install_dir = ctx.install_dir();
    let staging = staging_dir(&install_dir);
    reset_dir(&staging)?;
    let result = stage_file(ctx.component, archive, hint, &staging)
        .and_then(|()| promote(ctx.component, &staging, &install_dir));
    if result.is_err() {
        let _ = fs::remove_dir_all(&staging);
    }
    result
}

fn stage_file(
    component: Component,
    archive: &Path,
    hint: &str,
    staging: &Path,
) -> Result<(), ToolchainError> {
    if component == Component::Platform && hint.to_ascii_lowercase().ends_with(".jar") {
        let target = staging.join(component.marker());
        return fs::copy(archive, &target)
            .map(|_| ())
            .map_err(|error| ToolchainError::io(&target, error));
    }
    let format = extract::detect_format(archive, hint).ok_or_else(|| ToolchainError::Archive {
        path: archive.display().to_string(),
        reason: "neither a zip nor a gzip tarball".to_string(),
    })?;
    extract::extract(archive, staging, format)?;
    if !extract::normalize_root(staging, component.marker())? {
        return Err(marker_missing(component, staging));
    }
    extract::mark_executables(staging)?;
    Ok(())
}

fn staging_dir(install_dir: &Path) -> PathBuf {
    let mut name = install_dir
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".staging");
    install_dir.with_file_name(name)
}

fn reset_dir(dir: &Path) -> Result<(), ToolchainError> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|error| ToolchainError::io(dir, error))?;
    }
    fs::create_dir_all(dir).map_err(|error| ToolchainError::io(dir, error))
}

/// Replaces the install directory with a completed staging directory.
fn promote(component: Component, staging: &Path, install_dir: &Path) -> Result<(), ToolchainError> {
    if !staging.join(component.marker()).exists() {
        return Err(marker_missing(component, staging));
    }
    if install_dir.exists() {
        fs::remove_dir_all(install_dir).map_err(|error| ToolchainError::io(install_dir, error))?;
    }
    fs::rename(staging, install_dir).map_err(|error| ToolchainError::io(install_dir, error))
}
