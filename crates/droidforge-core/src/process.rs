//! Synchronous external process execution with a timeout and cooperative
//! cancellation.
//!
//! Output from stdout and stderr is captured on reader threads so a chatty
//! compiler cannot fill a pipe and stall. Cancellation and timeouts kill the
//! child; polling alone cannot interrupt a blocking wait.

use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::cancel::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Clone, Debug)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl ProcessSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn display_name(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Lines from both streams in arrival order.
    pub combined: String,
}

impl ProcessOutput {
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.combined.lines()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("'{program}' was not found")]
    NotFound { program: String },
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("'{program}' timed out after {}s", .timeout.as_secs())]
    TimedOut {
        program: String,
        timeout: Duration,
        output: ProcessOutput,
    },
    #[error("'{program}' was cancelled")]
    Cancelled { program: String },
    #[error("'{program}' exited with {}", exit_label(.exit_code))]
    Failed {
        program: String,
        exit_code: Option<i32>,
        output: ProcessOutput,
    },
}

impl ProcessError {
    /// Captured output, when the process got far enough to produce any.
    pub fn output(&self) -> Option<&ProcessOutput> {
        match self {
            ProcessError::TimedOut { output, .. } | ProcessError::Failed { output, .. } => {
                Some(output)
            }
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProcessError::Cancelled { .. })
    }

    /// True when the tool could not be started at all.
    pub fn is_missing_tool(&self) -> bool {
        matches!(self, ProcessError::NotFound { .. })
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

/// Runs `spec` to completion. Non-zero exit, timeout and cancellation are all
/// errors; the output is attached where it exists.
pub fn run(spec: &ProcessSpec, cancel: &CancellationToken) -> Result<ProcessOutput, ProcessError> {
    let program = spec.display_name();
    if cancel.is_cancelled() {
        return Err(ProcessError::Cancelled { program });
    }
    debug!(command = %spec.command_line(), "spawning process");

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &spec.working_dir {
        command.current_dir(dir);
    }
    for (key, value) in &spec.env {
        command.env(key, value);
    }
    let mut child = command.spawn().map_err(|error| match error.kind() {
        std::io::ErrorKind::NotFound => ProcessError::NotFound {
            program: program.clone(),
        },
        _ => ProcessError::Spawn {
            program: program.clone(),
            source: error,
        },
    })?;

    let combined = Arc::new(Mutex::new(String::new()));
    let stdout_reader = child
        .stdout
        .take()
        .map(|stream| spawn_reader(stream, Arc::clone(&combined)));
    let stderr_reader = child
        .stderr
        .take()
        .map(|stream| spawn_reader(stream, Arc::clone(&combined)));

    let started = Instant::now();
    let mut interrupted = None;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {}
            Err(error) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProcessError::Spawn {
                    program,
                    source: error,
                });
            }
        }
        if cancel.is_cancelled() {
            interrupted = Some(Interrupt::Cancelled);
        } else if started.elapsed() >= spec.timeout {
            interrupted = Some(Interrupt::TimedOut);
        }
        if interrupted.is_some() {
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        thread::sleep(POLL_INTERVAL);
    };

    // a killed child may leave grandchildren holding the pipes open, so
    // readers are only joined after a normal exit
    let (stdout, stderr) = if interrupted.is_none() {
        (join_reader(stdout_reader), join_reader(stderr_reader))
    } else {
        (String::new(), String::new())
    };
    let combined = combined
        .lock()
        .map(|buffer| buffer.clone())
        .unwrap_or_default();
    let output = ProcessOutput {
        exit_code: status.and_then(|status| status.code()),
        stdout,
        stderr,
        combined,
    };

    match (interrupted, status) {
        (Some(Interrupt::Cancelled), _) => Err(ProcessError::Cancelled { program }),
        (Some(Interrupt::TimedOut), _) => Err(ProcessError::TimedOut {
            program,
            timeout: spec.timeout,
            output,
        }),
        (None, Some(status)) if status.success() => Ok(output),
        (None, _) => Err(ProcessError::Failed {
            program,
            exit_code: output.exit_code,
            output,
        }),
    }
}

#[derive(Clone, Copy, Debug)]
enum Interrupt {
    Cancelled,
    TimedOut,
}

fn spawn_reader<R>(stream: R, combined: Arc<Mutex<String>>) -> thread::JoinHandle<String>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut own = String::new();
        let reader = BufReader::new(stream);
        for line in reader.split(b'\n') {
            let Ok(bytes) = line else { break };
            let text = String::from_utf8_lossy(&bytes);
            let text = text.trim_end_matches('\r');
            own.push_str(text);
            own.push('\n');
            if let Ok(mut buffer) = combined.lock() {
                buffer.push_str(text);
                buffer.push('\n');
            }
        }
        own
    })
}

fn join_reader(handle: Option<thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Capability probe: the path is a non-empty regular file the current user
/// may execute.
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() || metadata.len() == 0 {
        return false;
    }
    has_exec_bit(&metadata)
}

#[cfg(unix)]
fn has_exec_bit(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn has_exec_bit(_metadata: &std::fs::Metadata) -> bool {
    true
}

/// Marks a file executable for owner, group and others.
#[cfg(unix)]
pub fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    std::fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
