//! Pieces shared by the Kotlin and Java compile tasks.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use droidforge_core::process::ProcessSpec;
use droidforge_core::{BuildError, BuildPhase};
use droidforge_toolchain::Tool;

use crate::session::BuildSession;
use crate::strategy::{Attempt, Strategy};

use super::{executable, has_files, java_bridge};

pub(crate) struct CompileJob {
    pub phase: BuildPhase,
    pub sources: Vec<PathBuf>,
    pub classpath: OsString,
    pub output: PathBuf,
    pub options: Vec<String>,
    pub timeout: Duration,
}

impl CompileJob {
    fn apply(&self, spec: ProcessSpec) -> ProcessSpec {
        spec.args(&self.options)
            .arg("-d")
            .arg(&self.output)
            .arg("-classpath")
            .arg(&self.classpath)
            .args(&self.sources)
            .timeout(self.timeout)
    }
}

/// Compiler jar launched through the Java runtime.
pub(crate) struct BridgeCompiler {
    pub label: &'static str,
    pub jar: Tool,
    pub main_class: &'static str,
    pub job: Arc<CompileJob>,
}

impl Strategy<()> for BridgeCompiler {
    fn name(&self) -> &'static str {
        self.label
    }

    fn attempt(&self, session: &BuildSession) -> Result<Attempt<()>, BuildError> {
        let spec = match java_bridge(session, self.jar, self.main_class) {
            Attempt::Done(spec) => spec,
            Attempt::Unavailable(reason) => return Ok(Attempt::Unavailable(reason)),
        };
        session.run_tool(self.job.phase, &self.job.apply(spec))?;
        Ok(Attempt::Done(()))
    }
}

/// Compiler executable found on the host.
pub(crate) struct HostCompiler {
    pub label: &'static str,
    pub tool: Tool,
    pub job: Arc<CompileJob>,
}

impl Strategy<()> for HostCompiler {
    fn name(&self) -> &'static str {
        self.label
    }

    fn attempt(&self, session: &BuildSession) -> Result<Attempt<()>, BuildError> {
        let spec = match executable(session, self.tool) {
            Attempt::Done(spec) => spec,
            Attempt::Unavailable(reason) => return Ok(Attempt::Unavailable(reason)),
        };
        session.run_tool(self.job.phase, &self.job.apply(spec))?;
        Ok(Attempt::Done(()))
    }
}

/// Feeds every root through the incremental cache and reports whether the
/// compile can be skipped: nothing changed, no full rebuild was requested
/// and `output` still holds classes.
pub(crate) fn sources_unchanged(
    session: &BuildSession,
    phase: BuildPhase,
    roots: &[PathBuf],
    extensions: &[&str],
    output: &Path,
) -> Result<bool, BuildError> {
    let mut unchanged = true;
    for root in roots {
        let changes = session
            .cache()
            .analyze_changes(root, extensions)
            .map_err(|error| BuildError::new(phase, "incremental analysis failed").with_source(error))?;
        if !changes.is_empty() {
            unchanged = false;
        }
    }
    Ok(unchanged && !session.is_full_rebuild() && has_files(output, "class"))
}

pub(crate) fn persist_cache(session: &BuildSession) {
    if let Err(error) = session.cache().persist() {
        session.warn(format!("could not save incremental state: {}", error));
    }
}
