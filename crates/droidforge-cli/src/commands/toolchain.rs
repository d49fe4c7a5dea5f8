use std::path::PathBuf;
use std::sync::Arc;

use droidforge_core::config::ForgeConfig;
use droidforge_toolchain::{
    smoke_test, Component, ComponentStatus, InstallProgress, InstallReport, ProgressSink, Tool,
    ToolKind, ToolStatus, ToolchainManager,
};

pub struct StatusOutput {
    pub install_root: PathBuf,
    pub components: Vec<(Component, ComponentStatus)>,
    pub tools: Vec<ToolStatus>,
}

pub struct DoctorLine {
    pub tool: Tool,
    pub path: PathBuf,
    pub result: Result<String, String>,
}

pub fn manager(project_dir: &std::path::Path) -> Result<ToolchainManager, String> {
    let config = ForgeConfig::load(project_dir).map_err(|err| err.to_string())?;
    ToolchainManager::new(config.toolchain)
        .map_err(|err| format!("failed to set up toolchain manager: {}", err))
}

pub fn status(manager: &ToolchainManager) -> StatusOutput {
    StatusOutput {
        install_root: manager.install_root().to_path_buf(),
        components: Component::all()
            .into_iter()
            .map(|component| (component, manager.component_status(component)))
            .collect(),
        tools: manager.tool_statuses(),
    }
}

pub fn parse_components(names: &[String]) -> Result<Vec<Component>, String> {
    if names.is_empty() {
        return Ok(Component::all().to_vec());
    }
    names
        .iter()
        .map(|name| {
            Component::all()
                .into_iter()
                .find(|component| component.as_str() == name.trim())
                .ok_or_else(|| {
                    format!(
                        "unknown component '{}'; expected platform, build-tools, or ndk",
                        name
                    )
                })
        })
        .collect()
}

/// Installs `components`, printing progress lines, and fails if any of them
/// is still missing afterwards.
pub fn install(manager: &ToolchainManager, components: &[Component]) -> Result<InstallReport, String> {
    let progress: ProgressSink = Arc::new(|update: InstallProgress| match update.fraction {
        Some(fraction) => println!(
            "{}: {} ({:.0}%)",
            update.component,
            update.message,
            fraction * 100.0
        ),
        None => println!("{}: {}", update.component, update.message),
    });
    let timeout = manager.settings().install_timeout();
    let report = manager
        .ensure(components, timeout, progress)
        .map_err(|err| err.to_string())?;
    let failures = report.failures();
    if failures.is_empty() {
        return Ok(report);
    }
    Err(failures
        .iter()
        .map(|(component, reason)| format!("{} not installed: {}", component, reason))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Runs `--version` against every usable executable tool.
pub fn doctor(manager: &ToolchainManager) -> Vec<DoctorLine> {
    manager
        .tool_statuses()
        .into_iter()
        .filter(|status| status.probe.is_usable() && status.tool.kind() == ToolKind::Executable)
        .filter_map(|status| {
            let path = status.path?;
            let result = smoke_test(&path).map_err(|err| err.to_string());
            Some(DoctorLine {
                tool: status.tool,
                path,
                result,
            })
        })
        .collect()
}
