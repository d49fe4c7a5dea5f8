//! Capability checks for located tools.

use std::fs;
use std::path::Path;
use std::time::Duration;

use droidforge_core::process::{self, ProcessSpec};
use droidforge_core::CancellationToken;

use crate::tool::ToolKind;

const SMOKE_TEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Probe {
    Usable,
    Missing,
    NotRegularFile,
    Empty,
    NotExecutable,
}

impl Probe {
    pub fn is_usable(self) -> bool {
        self == Probe::Usable
    }

    pub fn describe(self) -> &'static str {
        match self {
            Probe::Usable => "usable",
            Probe::Missing => "missing",
            Probe::NotRegularFile => "not a regular file",
            Probe::Empty => "empty",
            Probe::NotExecutable => "not executable",
        }
    }
}

/// Present, a regular file, non-empty and, for executables, runnable.
pub fn probe(path: &Path, kind: ToolKind) -> Probe {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(_) => return Probe::Missing,
    };
    if !metadata.is_file() {
        return Probe::NotRegularFile;
    }
    if metadata.len() == 0 {
        return Probe::Empty;
    }
    if kind == ToolKind::Executable && !process::is_executable(path) {
        return Probe::NotExecutable;
    }
    Probe::Usable
}

/// Runs `<tool> --version` and returns the first non-empty output line.
pub fn smoke_test(path: &Path) -> Result<String, process::ProcessError> {
    let spec = ProcessSpec::new(path)
        .arg("--version")
        .timeout(SMOKE_TEST_TIMEOUT);
    let output = process::run(&spec, &CancellationToken::new())?;
    let first_line = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .to_string();
    Ok(first_line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_distinguishes_failure_modes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let empty = dir.path().join("empty.jar");
        fs::write(&empty, b"").expect("write");
        let jar = dir.path().join("tool.jar");
        fs::write(&jar, b"PK\x03\x04").expect("write");

        assert_eq!(probe(&dir.path().join("absent"), ToolKind::Archive), Probe::Missing);
        assert_eq!(probe(dir.path(), ToolKind::Archive), Probe::NotRegularFile);
        assert_eq!(probe(&empty, ToolKind::Archive), Probe::Empty);
        assert_eq!(probe(&jar, ToolKind::Archive), Probe::Usable);
    }

    #[cfg(unix)]
    #[test]
    fn executables_need_exec_bit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("aapt2");
        fs::write(&script, "#!/bin/sh\necho 'Android Asset Packaging Tool (aapt) 2.19'\n")
            .expect("write");
        assert_eq!(probe(&script, ToolKind::Executable), Probe::NotExecutable);
        process::make_executable(&script).expect("chmod");
        assert_eq!(probe(&script, ToolKind::Executable), Probe::Usable);
        let version = smoke_test(&script).expect("smoke test");
        assert!(version.contains("2.19"));
    }
}
