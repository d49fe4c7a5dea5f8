//! The nine pipeline tasks and the helpers they share.

mod dex;
mod java;
mod kotlin;
mod managed;
mod native;
mod optimize;
mod package;
mod resolve;
mod resources;
mod sign;

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use droidforge_core::process::ProcessSpec;
use droidforge_core::{BuildError, BuildPhase};
use droidforge_toolchain::Tool;

use crate::session::BuildSession;
use crate::strategy::Attempt;

pub use dex::ConvertToDexTask;
pub use java::CompileJavaTask;
pub use kotlin::CompileKotlinTask;
pub use native::CompileNativeTask;
pub use optimize::OptimizeTask;
pub use package::PackageApkTask;
pub use resolve::ResolveDependenciesTask;
pub use resources::ProcessResourcesTask;
pub use sign::SignApkTask;

pub(crate) fn io_error(phase: BuildPhase, path: &Path, error: std::io::Error) -> BuildError {
    BuildError::new(phase, format!("i/o failure at '{}'", path.display())).with_source(error)
}

/// Files under `dirs` whose extension is one of `extensions`, sorted.
pub(crate) fn collect_files(dirs: &[PathBuf], extensions: &[&str]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for dir in dirs {
        if !dir.is_dir() {
            continue;
        }
        for entry in WalkDir::new(dir).follow_links(true).into_iter().flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let matches = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
                .unwrap_or(false);
            if matches {
                files.push(entry.path().to_path_buf());
            }
        }
    }
    files.sort();
    files.dedup();
    files
}

pub(crate) fn has_files(dir: &Path, extension: &str) -> bool {
    !collect_files(&[dir.to_path_buf()], &[extension]).is_empty()
}

/// Removes and recreates `dir`.
pub(crate) fn reset_dir(phase: BuildPhase, dir: &Path) -> Result<(), BuildError> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|error| io_error(phase, dir, error))?;
    }
    fs::create_dir_all(dir).map_err(|error| io_error(phase, dir, error))
}

pub(crate) fn join_classpath(phase: BuildPhase, entries: &[PathBuf]) -> Result<OsString, BuildError> {
    std::env::join_paths(entries)
        .map_err(|error| BuildError::new(phase, "classpath entry contains a separator").with_source(error))
}

/// Compile classpath: the platform library followed by resolved jars.
pub(crate) fn compile_classpath(session: &BuildSession, extra: &[PathBuf]) -> Vec<PathBuf> {
    let mut classpath = Vec::new();
    if let Some(android_jar) = session.tool_path(Tool::AndroidJar) {
        classpath.push(android_jar);
    }
    classpath.extend(session.get(crate::artifacts::RESOLVED_CLASSPATH).unwrap_or_default());
    classpath.extend(extra.iter().cloned());
    classpath
}

/// `java -cp <jar> <main_class>`, when both the runtime and the jar are
/// usable.
pub(crate) fn java_bridge(
    session: &BuildSession,
    jar: Tool,
    main_class: &str,
) -> Attempt<ProcessSpec> {
    let Some(java) = session.tool_path(Tool::Java) else {
        return Attempt::Unavailable("no java runtime".to_string());
    };
    let Some(jar_path) = session.tool_path(jar) else {
        return Attempt::Unavailable(format!("{} not installed", jar.name()));
    };
    Attempt::Done(
        ProcessSpec::new(java)
            .arg("-cp")
            .arg(jar_path)
            .arg(main_class),
    )
}

pub(crate) fn executable(session: &BuildSession, tool: Tool) -> Attempt<ProcessSpec> {
    match session.tool_path(tool) {
        Some(path) => Attempt::Done(ProcessSpec::new(path)),
        None => Attempt::Unavailable(format!("{} not found", tool.name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_files_filters_and_sorts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("src");
        fs::create_dir_all(root.join("b")).expect("mkdir");
        fs::write(root.join("b/Two.java"), "class Two {}").expect("write");
        fs::write(root.join("One.JAVA"), "class One {}").expect("write");
        fs::write(root.join("notes.txt"), "x").expect("write");
        let files = collect_files(&[root.clone(), dir.path().join("missing")], &["java"]);
        assert_eq!(files, vec![root.join("One.JAVA"), root.join("b/Two.java")]);
    }
}
