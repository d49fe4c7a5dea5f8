use std::sync::Arc;

use droidforge_core::{BuildError, BuildPhase};
use droidforge_resolve::{collect_declarations, DependencyResolver, ResolveEvent};

use crate::artifacts::{RESOLVED_CLASSPATH, RESOLVED_NATIVE_DIRS};
use crate::session::BuildSession;
use crate::task::Task;

use super::collect_files;

/// Resolves declared coordinates and adds local `libs/*.jar` to the
/// classpath. Individual dependency failures are warnings.
pub struct ResolveDependenciesTask {
    resolver: Arc<DependencyResolver>,
}

impl ResolveDependenciesTask {
    pub fn new(resolver: Arc<DependencyResolver>) -> Self {
        Self { resolver }
    }
}

impl Task for ResolveDependenciesTask {
    fn name(&self) -> &'static str {
        "resolve-dependencies"
    }

    fn phase(&self) -> BuildPhase {
        BuildPhase::DependencyResolution
    }

    fn execute(&self, session: &BuildSession) -> Result<(), BuildError> {
        let project = session.project();
        let declared = collect_declarations(project.project_dir()).map_err(|error| {
            BuildError::new(self.phase(), "cannot read dependency declarations").with_source(error)
        })?;

        let mut classpath = Vec::new();
        let mut native_dirs = Vec::new();
        if declared.is_empty() {
            session.log("no external dependencies declared");
        } else {
            session.log(format!("resolving {} dependencies", declared.len()));
            let total = declared.len();
            let settled = std::cell::Cell::new(0usize);
            let report = self.resolver.resolve_all(&declared, session.cancel_token(), &|event| {
                settled.set(settled.get() + 1);
                session.progress(settled.get() as f32 / total as f32, "resolving dependencies");
                match event {
                    ResolveEvent::Resolved { coordinate, origin } => {
                        session.log(format!("resolved {} ({:?})", coordinate, origin))
                    }
                    ResolveEvent::Failed { coordinate, reason } => {
                        session.warn(format!("could not resolve {}: {}", coordinate, reason))
                    }
                }
            });
            session.check_cancelled(self.phase())?;
            if !report.failures.is_empty() {
                session.log(format!(
                    "{} of {} dependencies unresolved",
                    report.failures.len(),
                    total
                ));
            }
            classpath.extend(report.classpath());
            native_dirs.extend(report.native_dirs());
        }

        let local_jars = collect_files(&[project.layout().libs_dir.clone()], &["jar"]);
        if !local_jars.is_empty() {
            session.log(format!("adding {} local jars from libs/", local_jars.len()));
        }
        classpath.extend(local_jars);

        session.put(RESOLVED_CLASSPATH, classpath);
        session.put(RESOLVED_NATIVE_DIRS, native_dirs);
        Ok(())
    }
}
