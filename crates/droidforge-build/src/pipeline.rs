//! Task ordering, the toolchain gate and the background build worker.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::{info, warn};

use droidforge_cache::{config_fingerprint, IncrementalCache};
use droidforge_core::config::ForgeConfig;
use droidforge_core::{BuildError, BuildPhase, CancellationToken, ProjectConfig};
use droidforge_resolve::{DependencyResolver, Fetcher, ResolverOptions};
use droidforge_toolchain::{
    Component, InstallProgress, ProgressSink, ToolchainError, ToolchainManager,
};

use crate::artifacts::SIGNED_APK;
use crate::events::{BuildEvent, BuildListener};
use crate::result::BuildResult;
use crate::session::BuildSession;
use crate::task::Task;
use crate::tasks::{
    CompileJavaTask, CompileKotlinTask, CompileNativeTask, ConvertToDexTask, OptimizeTask,
    PackageApkTask, ProcessResourcesTask, ResolveDependenciesTask, SignApkTask,
};

/// Which tasks run, in which order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preset {
    Full,
    Debug,
    ManagedOnly,
    NativeEnabled,
}

impl Preset {
    /// Native builds get `NativeEnabled`, other debug builds `Debug`, the
    /// rest `Full`.
    pub fn for_project(project: &ProjectConfig) -> Self {
        if project.native_enabled() {
            Preset::NativeEnabled
        } else if project.is_debug() {
            Preset::Debug
        } else {
            Preset::Full
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Preset::Full => "full",
            Preset::Debug => "debug",
            Preset::ManagedOnly => "managed-only",
            Preset::NativeEnabled => "native-enabled",
        }
    }

    /// Components the toolchain gate requires before any task runs.
    pub fn required_components(self) -> Vec<Component> {
        let mut components = vec![Component::Platform, Component::BuildTools];
        if self == Preset::NativeEnabled {
            components.push(Component::Ndk);
        }
        components
    }

    pub fn tasks(self, resolver: Arc<DependencyResolver>) -> Vec<Arc<dyn Task>> {
        let mut tasks: Vec<Arc<dyn Task>> = vec![
            Arc::new(ResolveDependenciesTask::new(resolver)),
            Arc::new(ProcessResourcesTask),
        ];
        if self != Preset::ManagedOnly {
            tasks.push(Arc::new(CompileNativeTask));
        }
        tasks.push(Arc::new(CompileKotlinTask));
        tasks.push(Arc::new(CompileJavaTask));
        tasks.push(Arc::new(ConvertToDexTask));
        if self != Preset::Debug {
            tasks.push(Arc::new(OptimizeTask));
        }
        tasks.push(Arc::new(PackageApkTask));
        tasks.push(Arc::new(SignApkTask));
        tasks
    }
}

impl std::str::FromStr for Preset {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "full" => Ok(Preset::Full),
            "debug" => Ok(Preset::Debug),
            "managed-only" => Ok(Preset::ManagedOnly),
            "native-enabled" => Ok(Preset::NativeEnabled),
            other => Err(format!(
                "unknown preset '{}' (expected full, debug, managed-only or native-enabled)",
                other
            )),
        }
    }
}

/// Runs builds one at a time on a dedicated worker thread.
pub struct Pipeline {
    config: ForgeConfig,
    toolchain: Arc<ToolchainManager>,
    fetcher: Option<Arc<dyn Fetcher>>,
    preset: Option<Preset>,
    tasks: Option<Vec<Arc<dyn Task>>>,
    busy: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(config: ForgeConfig, toolchain: Arc<ToolchainManager>) -> Self {
        Self {
            config,
            toolchain,
            fetcher: None,
            preset: None,
            tasks: None,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Overrides the preset derived from the project.
    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.preset = Some(preset);
        self
    }

    /// Replaces the network fetcher used for dependency resolution.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Runs `tasks` instead of a preset's list. The toolchain gate still
    /// applies.
    pub fn with_tasks(mut self, tasks: Vec<Arc<dyn Task>>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Starts a build of `project` on the worker thread. Fails at once if a
    /// build from this pipeline is still running.
    pub fn execute(&self, project: ProjectConfig) -> Result<BuildHandle, BuildError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BuildError::new(
                BuildPhase::Pipeline,
                "a build is already running on this pipeline",
            ));
        }
        let busy = BusyGuard(Arc::clone(&self.busy));

        let preset = self.preset.unwrap_or_else(|| Preset::for_project(&project));
        let tasks = match &self.tasks {
            Some(tasks) => tasks.clone(),
            None => preset.tasks(Arc::new(self.resolver()?)),
        };
        let tasks: Arc<[Arc<dyn Task>]> = tasks.into();
        let cancel = CancellationToken::new();
        let (sender, receiver) = mpsc::channel();

        let worker = Worker {
            project,
            config: self.config.clone(),
            toolchain: Arc::clone(&self.toolchain),
            preset,
            tasks: Arc::clone(&tasks),
            cancel: cancel.clone(),
            events: sender,
        };
        thread::Builder::new()
            .name("droidforge-build".to_string())
            .spawn(move || {
                let _busy = busy;
                worker.run();
            })
            .map_err(|error| {
                BuildError::new(BuildPhase::Pipeline, "cannot start build worker").with_source(error)
            })?;

        Ok(BuildHandle {
            receiver,
            canceller: Canceller { cancel, tasks },
        })
    }

    fn resolver(&self) -> Result<DependencyResolver, BuildError> {
        let options = ResolverOptions::from_config(&self.config);
        match &self.fetcher {
            Some(fetcher) => Ok(DependencyResolver::with_fetcher(options, Arc::clone(fetcher))),
            None => DependencyResolver::new(
                options,
                &self.config.toolchain.user_agent,
                self.config.resolver.max_redirects,
            )
            .map_err(|error| {
                BuildError::new(BuildPhase::DependencyResolution, "cannot create HTTP client")
                    .with_source(error)
            }),
        }
    }
}

struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Sets the token and tells every task; clonable so another thread can
/// cancel while the caller is dispatching events.
#[derive(Clone)]
pub struct Canceller {
    cancel: CancellationToken,
    tasks: Arc<[Arc<dyn Task>]>,
}

impl Canceller {
    pub fn cancel(&self) {
        info!("build cancellation requested");
        self.cancel.cancel();
        for task in self.tasks.iter() {
            task.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Caller's side of a running build.
pub struct BuildHandle {
    receiver: Receiver<BuildEvent>,
    canceller: Canceller,
}

impl BuildHandle {
    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    /// Delivers every event to `listener` on the calling thread until the
    /// build completes, then returns the result.
    pub fn dispatch(self, listener: &mut dyn BuildListener) -> BuildResult {
        for event in self.receiver.iter() {
            event.deliver(listener);
            if let BuildEvent::Completed(result) = event {
                return result;
            }
        }
        let error = BuildError::new(BuildPhase::Pipeline, "build worker exited without a result");
        let result = BuildResult::failed(&error, vec![error.to_string()]);
        listener.on_build_completed(&result);
        result
    }

    /// Waits for the result, discarding intermediate events.
    pub fn wait(self) -> BuildResult {
        self.dispatch(&mut crate::events::NoopListener)
    }
}

struct Worker {
    project: ProjectConfig,
    config: ForgeConfig,
    toolchain: Arc<ToolchainManager>,
    preset: Preset,
    tasks: Arc<[Arc<dyn Task>]>,
    cancel: CancellationToken,
    events: Sender<BuildEvent>,
}

impl Worker {
    fn run(self) {
        let started = Instant::now();
        let total = self.tasks.len();
        info!(
            project = self.project.name(),
            preset = self.preset.as_str(),
            tasks = total,
            "build started"
        );
        let _ = self.events.send(BuildEvent::Started {
            project: self.project.name().to_string(),
            tasks: total,
        });

        let cache = Arc::new(IncrementalCache::open(&self.project));
        let session = BuildSession::new(
            self.project.clone(),
            self.config.clone(),
            Arc::clone(&self.toolchain),
            Arc::clone(&cache),
            self.cancel.clone(),
        )
        .with_events(self.events.clone());

        let result = match self.run_tasks(&session, started) {
            Ok(result) => result,
            Err(error) if error.is_cancelled() => {
                cache.rollback();
                BuildResult::cancelled()
            }
            Err(error) => {
                cache.rollback();
                session.error(error.report());
                BuildResult::failed(&error, session.errors())
            }
        }
        .with_diagnostics(session.warnings(), session.logs());

        match &result.outcome {
            crate::result::BuildOutcome::Success { elapsed, .. } => {
                info!(elapsed_ms = elapsed.as_millis() as u64, "build succeeded")
            }
            crate::result::BuildOutcome::Failed { message, .. } => warn!(%message, "build failed"),
            crate::result::BuildOutcome::Cancelled => info!("build cancelled"),
        }
        let _ = self.events.send(BuildEvent::Completed(result));
    }

    fn run_tasks(&self, session: &BuildSession, started: Instant) -> Result<BuildResult, BuildError> {
        self.toolchain_gate(session)?;
        session.check_cancelled(BuildPhase::Pipeline)?;

        let fingerprint = config_fingerprint(&self.project).map_err(|error| {
            BuildError::new(BuildPhase::Configuration, "cannot fingerprint project configuration")
                .with_source(error)
        })?;
        if session.cache().config_changed(&fingerprint) {
            session.log("project configuration changed; full rebuild");
            session.set_full_rebuild(true);
        }
        let layout = self.project.layout();
        let mut roots = vec![layout.java_dir.clone(), layout.kotlin_dir.clone()];
        roots.push(layout.intermediate("generated/r"));
        let swept = session.cache().sweep(&roots);
        if swept > 0 {
            session.log(format!("dropped {} stale incremental entries", swept));
        }

        let total = self.tasks.len();
        for (index, task) in self.tasks.iter().enumerate() {
            session.check_cancelled(task.phase())?;
            let _ = self.events.send(BuildEvent::TaskStarted {
                name: task.name(),
                index,
                total,
            });
            session.begin_task(index, total);
            session.progress(0.0, format!("running {}", task.name()));

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.execute(session)))
                .unwrap_or_else(|payload| {
                    Err(BuildError::new(
                        task.phase(),
                        format!("task '{}' panicked: {}", task.name(), panic_message(&payload)),
                    ))
                });
            match outcome {
                Ok(()) => {
                    let _ = self.events.send(BuildEvent::TaskCompleted { name: task.name() });
                    session.progress(1.0, format!("{} finished", task.name()));
                }
                Err(error) => {
                    if !error.is_cancelled() {
                        let _ = self.events.send(BuildEvent::TaskFailed {
                            name: task.name(),
                            error: error.to_string(),
                        });
                    }
                    return Err(error);
                }
            }
        }

        let output = session
            .get(SIGNED_APK)
            .unwrap_or_else(|| self.project.output_apk_path());
        if let Err(error) = session.cache().persist() {
            session.warn(format!("could not save incremental state: {}", error));
        }
        Ok(BuildResult::success(output, started.elapsed()))
    }

    /// Installs missing required components, blocking up to the configured
    /// install timeout or until the build is cancelled.
    fn toolchain_gate(&self, session: &BuildSession) -> Result<(), BuildError> {
        let required = self.preset.required_components();
        let missing = self.toolchain.missing_components(&required);
        if missing.is_empty() {
            return Ok(());
        }
        session.log(format!(
            "installing missing toolchain components: {}",
            missing
                .iter()
                .map(|component| component.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
        let events = self.events.clone();
        let progress: ProgressSink = Arc::new(move |update: InstallProgress| {
            let percent = update
                .fraction
                .map(|fraction| (fraction * 100.0).round().clamp(0.0, 100.0) as u8)
                .unwrap_or(0);
            let _ = events.send(BuildEvent::Progress {
                percent,
                message: format!("{}: {}", update.component, update.message),
            });
        });
        let timeout = self.config.toolchain.install_timeout();
        let report = match self
            .toolchain
            .ensure_cancellable(&required, timeout, progress, &self.cancel)
        {
            Ok(report) => report,
            Err(ToolchainError::InstallCancelled) => {
                return Err(BuildError::cancelled(BuildPhase::ToolchainInstall))
            }
            Err(error) => {
                return Err(BuildError::new(
                    BuildPhase::ToolchainInstall,
                    "toolchain installation did not finish",
                )
                .with_source(error))
            }
        };
        let failures = report.failures();
        if !failures.is_empty() {
            for (component, reason) in &failures {
                session.error(format!("{} not installed: {}", component, reason));
            }
            return Err(BuildError::new(
                BuildPhase::ToolchainInstall,
                format!(
                    "required toolchain components unavailable: {}",
                    failures
                        .iter()
                        .map(|(component, _)| component.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            ));
        }
        Ok(())
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(preset: Preset) -> Vec<&'static str> {
        let options = ResolverOptions {
            repositories: Vec::new(),
            cache_dir: std::env::temp_dir(),
            workers: 1,
            timeout: std::time::Duration::from_secs(1),
        };
        let resolver = DependencyResolver::with_fetcher(options, Arc::new(NoFetch));
        preset.tasks(Arc::new(resolver)).iter().map(|task| task.name()).collect()
    }

    struct NoFetch;

    impl Fetcher for NoFetch {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, droidforge_resolve::ResolveError> {
            Err(droidforge_resolve::ResolveError::EmptyBody { url: url.to_string() })
        }
    }

    #[test]
    fn full_preset_runs_all_nine_tasks_in_order() {
        assert_eq!(
            names(Preset::Full),
            vec![
                "resolve-dependencies",
                "process-resources",
                "compile-native",
                "compile-kotlin",
                "compile-java",
                "convert-to-dex",
                "optimize",
                "package-apk",
                "sign-apk",
            ]
        );
    }

    #[test]
    fn presets_drop_their_tasks() {
        assert!(!names(Preset::Debug).contains(&"optimize"));
        assert!(!names(Preset::ManagedOnly).contains(&"compile-native"));
        assert_eq!(names(Preset::NativeEnabled), names(Preset::Full));
    }

    #[test]
    fn only_native_preset_requires_the_ndk() {
        assert!(Preset::NativeEnabled.required_components().contains(&Component::Ndk));
        assert!(!Preset::Full.required_components().contains(&Component::Ndk));
    }

    #[test]
    fn presets_parse_from_names() {
        assert_eq!("managed-only".parse::<Preset>(), Ok(Preset::ManagedOnly));
        assert!("everything".parse::<Preset>().is_err());
    }
}
