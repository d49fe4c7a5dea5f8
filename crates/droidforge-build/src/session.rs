//! Shared state of one build: diagnostics, the cancellation token, the
//! artifact map and handles to the toolchain and incremental cache.

use std::any::Any;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use droidforge_cache::IncrementalCache;
use droidforge_core::config::ForgeConfig;
use droidforge_core::process::{self, ProcessError, ProcessOutput, ProcessSpec};
use droidforge_core::{BuildError, BuildPhase, CancellationToken, ProjectConfig};
use droidforge_toolchain::{Tool, ToolchainManager};

use crate::artifacts::{ArtifactKey, ArtifactStore};
use crate::diagnostics::{classify, LineKind};
use crate::events::BuildEvent;

const DETAIL_LINES: usize = 40;

#[derive(Default)]
struct Diagnostics {
    logs: Vec<String>,
    warnings: Vec<String>,
    errors: Vec<String>,
}

pub struct BuildSession {
    project: ProjectConfig,
    config: ForgeConfig,
    toolchain: Arc<ToolchainManager>,
    cache: Arc<IncrementalCache>,
    cancel: CancellationToken,
    artifacts: ArtifactStore,
    diagnostics: Mutex<Diagnostics>,
    events: Option<Sender<BuildEvent>>,
    task_index: AtomicUsize,
    task_total: AtomicUsize,
    full_rebuild: AtomicBool,
}

impl BuildSession {
    pub fn new(
        project: ProjectConfig,
        config: ForgeConfig,
        toolchain: Arc<ToolchainManager>,
        cache: Arc<IncrementalCache>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            project,
            config,
            toolchain,
            cache,
            cancel,
            artifacts: ArtifactStore::default(),
            diagnostics: Mutex::new(Diagnostics::default()),
            events: None,
            task_index: AtomicUsize::new(0),
            task_total: AtomicUsize::new(1),
            full_rebuild: AtomicBool::new(false),
        }
    }

    pub fn with_events(mut self, events: Sender<BuildEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn project(&self) -> &ProjectConfig {
        &self.project
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    pub fn toolchain(&self) -> &ToolchainManager {
        &self.toolchain
    }

    pub fn cache(&self) -> &IncrementalCache {
        &self.cache
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Yield point: errors with a cancelled `BuildError` once cancellation
    /// was requested.
    pub fn check_cancelled(&self, phase: BuildPhase) -> Result<(), BuildError> {
        if self.cancel.is_cancelled() {
            return Err(BuildError::cancelled(phase));
        }
        Ok(())
    }

    pub fn put<T: Any + Send + Sync>(&self, key: ArtifactKey<T>, value: T) {
        self.artifacts.put(key, value);
    }

    pub fn get<T: Any + Clone>(&self, key: ArtifactKey<T>) -> Option<T> {
        self.artifacts.get(key)
    }

    pub fn artifact_names(&self) -> Vec<&'static str> {
        self.artifacts.names()
    }

    /// Intermediate directory for `name`, e.g. `build/intermediates/dex`.
    pub fn intermediate(&self, name: &str) -> PathBuf {
        self.project.layout().intermediate(name)
    }

    pub fn set_full_rebuild(&self, full: bool) {
        self.full_rebuild.store(full, Ordering::SeqCst);
    }

    pub fn is_full_rebuild(&self) -> bool {
        self.full_rebuild.load(Ordering::SeqCst)
    }

    fn emit(&self, event: BuildEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    pub fn log(&self, line: impl Into<String>) {
        let line = line.into();
        info!(target: "droidforge::build", "{}", line);
        self.lock_diagnostics().logs.push(line.clone());
        self.emit(BuildEvent::Log(line));
    }

    pub fn warn(&self, line: impl Into<String>) {
        let line = line.into();
        warn!(target: "droidforge::build", "{}", line);
        {
            let mut diagnostics = self.lock_diagnostics();
            diagnostics.logs.push(format!("warning: {}", line));
            diagnostics.warnings.push(line.clone());
        }
        self.emit(BuildEvent::Log(format!("warning: {}", line)));
    }

    pub fn error(&self, line: impl Into<String>) {
        let line = line.into();
        error!(target: "droidforge::build", "{}", line);
        {
            let mut diagnostics = self.lock_diagnostics();
            diagnostics.logs.push(format!("error: {}", line));
            diagnostics.errors.push(line.clone());
        }
        self.emit(BuildEvent::Log(format!("error: {}", line)));
    }

    pub fn logs(&self) -> Vec<String> {
        self.lock_diagnostics().logs.clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.lock_diagnostics().warnings.clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.lock_diagnostics().errors.clone()
    }

    fn lock_diagnostics(&self) -> std::sync::MutexGuard<'_, Diagnostics> {
        self.diagnostics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn begin_task(&self, index: usize, total: usize) {
        self.task_index.store(index, Ordering::SeqCst);
        self.task_total.store(total.max(1), Ordering::SeqCst);
    }

    /// Reports `fraction` (0.0 to 1.0) of the current task as overall
    /// pipeline progress.
    pub fn progress(&self, fraction: f32, message: impl Into<String>) {
        let index = self.task_index.load(Ordering::SeqCst) as f32;
        let total = self.task_total.load(Ordering::SeqCst) as f32;
        let overall = (index + fraction.clamp(0.0, 1.0)) / total;
        let percent = (overall * 100.0).round().clamp(0.0, 100.0) as u8;
        self.emit(BuildEvent::Progress {
            percent,
            message: message.into(),
        });
    }

    pub fn tool_path(&self, tool: Tool) -> Option<PathBuf> {
        self.toolchain.tool_path(tool)
    }

    /// Runs an external tool, feeding every output line through the
    /// diagnostics classifier. Non-zero exit, timeout and cancellation become
    /// `BuildError`s carrying the tail of the output.
    pub fn run_tool(&self, phase: BuildPhase, spec: &ProcessSpec) -> Result<ProcessOutput, BuildError> {
        self.check_cancelled(phase)?;
        match process::run(spec, &self.cancel) {
            Ok(output) => {
                self.record_output(&output);
                Ok(output)
            }
            Err(ProcessError::Cancelled { .. }) => Err(BuildError::cancelled(phase)),
            Err(error) => {
                let details = error.output().map(|output| {
                    self.record_output(output);
                    tail(&output.combined, DETAIL_LINES)
                });
                let message = error.to_string();
                let mut build_error = BuildError::new(phase, message);
                if let Some(details) = details {
                    build_error = build_error.with_details(details);
                }
                Err(build_error.with_source(error))
            }
        }
    }

    fn record_output(&self, output: &ProcessOutput) {
        for line in output.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match classify(line) {
                LineKind::Log => self.log(line),
                LineKind::Warning => self.warn(line),
                LineKind::Error => self.error(line),
            }
        }
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\nd", 2), "c\nd");
        assert_eq!(tail("a", 5), "a");
        assert_eq!(tail("", 5), "");
    }
}
