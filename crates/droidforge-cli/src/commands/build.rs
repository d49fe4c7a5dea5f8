use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use droidforge_build::{BuildListener, BuildOutcome, BuildResult, Pipeline, Preset};
use droidforge_core::config::ForgeConfig;
use droidforge_core::ProjectConfig;
use droidforge_toolchain::ToolchainManager;
use tracing::info;

pub struct BuildArgs {
    pub project_dir: PathBuf,
    pub preset: Option<Preset>,
    /// Overrides the project's `debug` key.
    pub release: bool,
    pub quiet: bool,
}

pub struct BuildOutput {
    pub apk: PathBuf,
    pub elapsed: Duration,
    pub warnings: Vec<String>,
}

pub fn run(args: BuildArgs) -> Result<BuildOutput, String> {
    let config = ForgeConfig::load(&args.project_dir).map_err(|err| err.to_string())?;
    let mut project = ProjectConfig::load(&args.project_dir).map_err(|err| err.to_string())?;
    if args.release {
        project = project.with_debug(false);
    }
    info!(
        project = project.name(),
        variant = project.build_variant(),
        install_root = %config.toolchain.install_root.display(),
        "loaded project"
    );
    let toolchain = ToolchainManager::new(config.toolchain.clone())
        .map_err(|err| format!("failed to set up toolchain manager: {}", err))?;

    let mut pipeline = Pipeline::new(config, Arc::new(toolchain));
    if let Some(preset) = args.preset {
        pipeline = pipeline.with_preset(preset);
    }
    let handle = pipeline.execute(project).map_err(|err| err.report())?;
    let mut printer = ConsolePrinter { quiet: args.quiet };
    let result = handle.dispatch(&mut printer);
    into_output(result)
}

fn into_output(result: BuildResult) -> Result<BuildOutput, String> {
    let warnings = result.warnings.clone();
    match result.outcome {
        BuildOutcome::Success { output, elapsed } => Ok(BuildOutput {
            apk: output,
            elapsed,
            warnings,
        }),
        BuildOutcome::Cancelled => Err("build cancelled".to_string()),
        BuildOutcome::Failed { message, errors, .. } => {
            let mut report = message;
            for error in errors {
                if !report.contains(&error) {
                    report.push('\n');
                    report.push_str(&error);
                }
            }
            Err(report)
        }
    }
}

/// Task boundaries and progress on stdout; tool output only when not quiet.
struct ConsolePrinter {
    quiet: bool,
}

impl BuildListener for ConsolePrinter {
    fn on_build_started(&mut self, project: &str, tasks: usize) {
        println!("building {} ({} tasks)", project, tasks);
    }

    fn on_task_started(&mut self, name: &str, index: usize, total: usize) {
        println!("[{}/{}] {}", index + 1, total, name);
    }

    fn on_task_failed(&mut self, name: &str, error: &str) {
        eprintln!("{} failed: {}", name, error);
    }

    fn on_progress(&mut self, percent: u8, message: &str) {
        if !self.quiet {
            println!("  {:>3}% {}", percent, message);
        }
    }

    fn on_log(&mut self, line: &str) {
        if !self.quiet {
            println!("  {}", line);
        }
    }
}
