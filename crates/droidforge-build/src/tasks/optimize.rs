use std::fs;
use std::path::PathBuf;

use droidforge_core::{BuildError, BuildPhase};
use droidforge_toolchain::Tool;

use crate::artifacts::{CLASSES_JAR, DEX_FILES, RESOLVED_CLASSPATH};
use crate::session::BuildSession;
use crate::strategy::Attempt;
use crate::task::Task;

use super::dex::dex_outputs;
use super::{io_error, java_bridge, reset_dir};

const PHASE: BuildPhase = BuildPhase::Optimization;
const RULES_FILE: &str = "proguard-rules.pro";

/// Release-only shrinking with R8. Any failure is a warning and the
/// unoptimized dex set stays in place; the result is adopted only when it is
/// smaller. R8 sees the same program inputs as the dex converter, the
/// application classes plus every resolved library jar.
pub struct OptimizeTask;

impl Task for OptimizeTask {
    fn name(&self) -> &'static str {
        "optimize"
    }

    fn phase(&self) -> BuildPhase {
        PHASE
    }

    fn execute(&self, session: &BuildSession) -> Result<(), BuildError> {
        if session.project().is_debug() {
            session.log("debug build; skipping optimization");
            return Ok(());
        }
        let Some(classes_jar) = session.get(CLASSES_JAR) else {
            session.log("no compiled classes; skipping optimization");
            return Ok(());
        };
        let current = session.get(DEX_FILES).unwrap_or_default();
        let mut inputs = vec![classes_jar];
        inputs.extend(session.get(RESOLVED_CLASSPATH).unwrap_or_default());

        match self.shrink(session, &inputs) {
            Ok(Some(optimized)) => {
                let before = total_size(&current);
                let after = total_size(&optimized);
                if !optimized.is_empty() && after < before {
                    session.log(format!("optimized dex adopted ({} -> {} bytes)", before, after));
                    session.put(DEX_FILES, optimized);
                } else {
                    session.log(format!(
                        "optimized dex not smaller ({} -> {} bytes); keeping original",
                        before, after
                    ));
                }
            }
            Ok(None) => {}
            Err(error) if error.is_cancelled() => return Err(error),
            Err(error) => session.warn(format!("optimization failed: {}", error.report())),
        }
        Ok(())
    }
}

impl OptimizeTask {
    fn shrink(&self, session: &BuildSession, inputs: &[PathBuf]) -> Result<Option<Vec<PathBuf>>, BuildError> {
        let spec = match java_bridge(session, Tool::D8Jar, "com.android.tools.r8.R8") {
            Attempt::Done(spec) => spec,
            Attempt::Unavailable(reason) => {
                session.warn(format!("optimizer unavailable: {}", reason));
                return Ok(None);
            }
        };
        let project = session.project();
        let work_dir = session.intermediate("optimize");
        let output_dir = work_dir.join("out");
        reset_dir(PHASE, &output_dir)?;

        let rules = project.project_dir().join(RULES_FILE);
        let rules = if rules.is_file() {
            rules
        } else {
            let generated = work_dir.join("default-rules.pro");
            fs::write(&generated, default_rules(project.package()))
                .map_err(|error| io_error(PHASE, &generated, error))?;
            generated
        };

        let mut spec = spec
            .arg("--release")
            .arg("--output")
            .arg(&output_dir)
            .arg("--min-api")
            .arg(project.min_sdk().to_string())
            .arg("--pg-conf")
            .arg(&rules);
        if let Some(android_jar) = session.tool_path(Tool::AndroidJar) {
            spec = spec.arg("--lib").arg(android_jar);
        }
        let spec = spec
            .args(inputs)
            .timeout(session.config().timeouts.optimize());
        session.progress(0.3, "shrinking classes");
        session.run_tool(PHASE, &spec)?;
        Ok(Some(dex_outputs(&output_dir)))
    }
}

/// Keeps the application package and silences warnings about platform
/// classes missing from the library jar.
fn default_rules(package: &str) -> String {
    format!(
        "-keep class {}.** {{ *; }}\n-keepattributes *Annotation*,Signature,InnerClasses\n-dontwarn **\n",
        package
    )
}

fn total_size(files: &[PathBuf]) -> u64 {
    files
        .iter()
        .filter_map(|file| fs::metadata(file).ok())
        .map(|metadata| metadata.len())
        .sum()
}
