use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use droidforge_core::abi::Abi;
use droidforge_core::CancellationToken;
use droidforge_core::config::ToolchainSettings;

use crate::component::{Component, ComponentStatus};
use crate::download::{Downloader, HttpDownloader};
use crate::error::ToolchainError;
use crate::host::{self, HostEnvironment};
use crate::install::{self, InstallContext, InstallProgress};
use crate::probe::{self, Probe};
use crate::tool::{Tool, ToolLocation};

pub type ProgressSink = Arc<dyn Fn(InstallProgress) + Send + Sync>;

const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Cross compiler pair plus the sysroot it was shipped with, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeToolchain {
    pub clang: PathBuf,
    pub clangxx: Option<PathBuf>,
    pub sysroot: Option<PathBuf>,
}

impl NativeToolchain {
    /// True when the sysroot carries link libraries for `abi`.
    pub fn has_sysroot_libs(&self, abi: Abi) -> bool {
        self.sysroot
            .as_ref()
            .map(|sysroot| sysroot.join("usr/lib").join(abi.sysroot_triple()).is_dir())
            .unwrap_or(false)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub statuses: BTreeMap<Component, ComponentStatus>,
}

impl InstallReport {
    pub fn all_installed(&self) -> bool {
        self.statuses.values().all(ComponentStatus::is_installed)
    }

    pub fn failures(&self) -> Vec<(Component, String)> {
        self.statuses
            .iter()
            .filter_map(|(component, status)| match status {
                ComponentStatus::NotInstalled { reason } => Some((*component, reason.clone())),
                ComponentStatus::Installed { .. } => None,
            })
            .collect()
    }
}

/// Result of a background install; resolves once every component has run
/// through its ladder.
pub struct InstallHandle {
    receiver: Receiver<InstallReport>,
}

impl InstallHandle {
    pub fn wait(self, timeout: Duration) -> Result<InstallReport, ToolchainError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(report) => Ok(report),
            Err(RecvTimeoutError::Timeout) => Err(ToolchainError::InstallTimedOut(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(ToolchainError::InstallAborted),
        }
    }

    /// Like `wait`, but returns as soon as `cancel` is set. The install
    /// worker keeps running in the background and its report is dropped.
    pub fn wait_cancellable(
        self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<InstallReport, ToolchainError> {
        let deadline = Instant::now() + timeout;
        loop {
            if cancel.is_cancelled() {
                return Err(ToolchainError::InstallCancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ToolchainError::InstallTimedOut(timeout));
            }
            match self.receiver.recv_timeout(remaining.min(CANCEL_POLL)) {
                Ok(report) => return Ok(report),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(ToolchainError::InstallAborted),
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolStatus {
    pub tool: Tool,
    pub path: Option<PathBuf>,
    pub probe: Probe,
}

pub struct ToolchainManager {
    settings: ToolchainSettings,
    downloader: Arc<dyn Downloader>,
    host: HostEnvironment,
}

impl ToolchainManager {
    pub fn new(settings: ToolchainSettings) -> Result<Self, ToolchainError> {
        let downloader = HttpDownloader::new(&settings.user_agent, settings.install_timeout())?;
        Ok(Self::with_downloader(settings, Arc::new(downloader)))
    }

    pub fn with_downloader(settings: ToolchainSettings, downloader: Arc<dyn Downloader>) -> Self {
        let host = HostEnvironment::detect(&settings);
        Self {
            settings,
            downloader,
            host,
        }
    }

    pub fn with_host(mut self, host: HostEnvironment) -> Self {
        self.host = host;
        self
    }

    pub fn settings(&self) -> &ToolchainSettings {
        &self.settings
    }

    pub fn install_root(&self) -> &Path {
        &self.settings.install_root
    }

    /// Where the tool would live; the file may be absent or unusable.
    pub fn locate(&self, tool: Tool) -> Option<PathBuf> {
        let root = &self.settings.install_root;
        match tool.location() {
            ToolLocation::InComponent(component, relative) => {
                Some(component.install_dir(&self.settings).join(relative))
            }
            ToolLocation::NdkPrebuilt(name) => self.ndk_prebuilt().map(|dir| dir.join("bin").join(name)),
            ToolLocation::BundledJar(name) => Some(root.join("jars").join(name)),
            ToolLocation::Host(name) => {
                let bundled = root.join("bin").join(name);
                if bundled.is_file() {
                    Some(bundled)
                } else {
                    which::which(name).ok()
                }
            }
        }
    }

    pub fn probe(&self, tool: Tool) -> Probe {
        match self.locate(tool) {
            Some(path) => probe::probe(&path, tool.kind()),
            None => Probe::Missing,
        }
    }

    /// Path of a tool that passed its capability probe.
    pub fn tool_path(&self, tool: Tool) -> Option<PathBuf> {
        self.locate(tool)
            .filter(|path| probe::probe(path, tool.kind()).is_usable())
    }

    pub fn is_available(&self, tool: Tool) -> bool {
        self.tool_path(tool).is_some()
    }

    pub fn tool_statuses(&self) -> Vec<ToolStatus> {
        Tool::all()
            .map(|tool| {
                let path = self.locate(tool);
                let probe = path
                    .as_deref()
                    .map(|path| probe::probe(path, tool.kind()))
                    .unwrap_or(Probe::Missing);
                ToolStatus { tool, path, probe }
            })
            .collect()
    }

    /// Disk check only; nothing is installed.
    pub fn component_status(&self, component: Component) -> ComponentStatus {
        if install::marker_present(component, &self.settings) {
            ComponentStatus::Installed {
                path: component.install_dir(&self.settings),
                source: "existing installation".to_string(),
            }
        } else {
            ComponentStatus::NotInstalled {
                reason: format!(
                    "'{}' not found",
                    component.marker_path(&self.settings).display()
                ),
            }
        }
    }

    pub fn missing_components(&self, required: &[Component]) -> Vec<Component> {
        required
            .iter()
            .copied()
            .filter(|component| !install::marker_present(*component, &self.settings))
            .collect()
    }

    pub fn native_toolchain(&self) -> Option<NativeToolchain> {
        let clang = self.tool_path(Tool::Clang)?;
        let clangxx = self.tool_path(Tool::ClangXX);
        let sysroot = self
            .ndk_prebuilt()
            .map(|dir| dir.join("sysroot"))
            .filter(|dir| dir.join("usr").is_dir());
        Some(NativeToolchain {
            clang,
            clangxx,
            sysroot,
        })
    }

    fn ndk_prebuilt(&self) -> Option<PathBuf> {
        let prebuilt = Component::Ndk
            .install_dir(&self.settings)
            .join("toolchains/llvm/prebuilt");
        host::ndk_prebuilt_dir(&prebuilt)
    }

    /// Runs every component's acquisition ladder on a background worker, one
    /// scoped thread per component.
    pub fn install(&self, components: Vec<Component>, progress: ProgressSink) -> InstallHandle {
        let (sender, receiver) = mpsc::channel();
        let settings = self.settings.clone();
        let downloader = Arc::clone(&self.downloader);
        let host = self.host.clone();
        info!(?components, "starting toolchain install");
        thread::spawn(move || {
            let mut report = InstallReport::default();
            let progress_fn = move |update: InstallProgress| progress(update);
            thread::scope(|scope| {
                let workers: Vec<_> = components
                    .iter()
                    .map(|component| {
                        let component = *component;
                        let settings = &settings;
                        let downloader = downloader.as_ref();
                        let host = &host;
                        let progress_fn = &progress_fn;
                        let worker = scope.spawn(move || {
                            let strategies = install::default_strategies(component, settings);
                            let ctx = InstallContext {
                                component,
                                settings,
                                downloader,
                                host,
                                progress: progress_fn,
                            };
                            install::run_ladder(&strategies, &ctx)
                        });
                        (component, worker)
                    })
                    .collect();
                for (component, worker) in workers {
                    let status = worker.join().unwrap_or_else(|_| ComponentStatus::NotInstalled {
                        reason: "install worker panicked".to_string(),
                    });
                    report.statuses.insert(component, status);
                }
            });
            debug!(installed = report.all_installed(), "toolchain install finished");
            let _ = sender.send(report);
        });
        InstallHandle { receiver }
    }

    /// Installs whatever of `required` is missing and waits up to `timeout`.
    pub fn ensure(
        &self,
        required: &[Component],
        timeout: Duration,
        progress: ProgressSink,
    ) -> Result<InstallReport, ToolchainError> {
        self.ensure_cancellable(required, timeout, progress, &CancellationToken::new())
    }

    /// `ensure` that stops waiting once `cancel` is set.
    pub fn ensure_cancellable(
        &self,
        required: &[Component],
        timeout: Duration,
        progress: ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<InstallReport, ToolchainError> {
        let missing = self.missing_components(required);
        if missing.is_empty() {
            let statuses = required
                .iter()
                .map(|component| (*component, self.component_status(*component)))
                .collect();
            return Ok(InstallReport { statuses });
        }
        self.install(missing, progress).wait_cancellable(timeout, cancel)
    }
}
