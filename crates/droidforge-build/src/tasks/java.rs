use std::sync::Arc;

use droidforge_core::{BuildError, BuildPhase};
use droidforge_toolchain::Tool;

use crate::artifacts::{GENERATED_SOURCES, JAVA_CLASSES, KOTLIN_CLASSES, KOTLIN_RECOMPILED};
use crate::session::BuildSession;
use crate::strategy::{run_ladder, Strategy};
use crate::task::Task;

use super::managed::{persist_cache, sources_unchanged, BridgeCompiler, CompileJob, HostCompiler};
use super::{collect_files, compile_classpath, join_classpath, reset_dir};

const PHASE: BuildPhase = BuildPhase::JavaCompilation;

/// Compiles `.java` sources plus generated `R.java`: bundled ecj first, then
/// host `javac`.
pub struct CompileJavaTask;

impl Task for CompileJavaTask {
    fn name(&self) -> &'static str {
        "compile-java"
    }

    fn phase(&self) -> BuildPhase {
        PHASE
    }

    fn execute(&self, session: &BuildSession) -> Result<(), BuildError> {
        let layout = session.project().layout();
        let mut roots = vec![layout.java_dir.clone()];
        if let Some(generated) = session.get(GENERATED_SOURCES) {
            roots.push(generated);
        }
        let sources = collect_files(&roots, &["java"]);
        if sources.is_empty() {
            session.log("no Java sources");
            return Ok(());
        }

        let output = session.intermediate("classes/java");
        let kotlin_recompiled = session.get(KOTLIN_RECOMPILED).unwrap_or(false);
        if sources_unchanged(session, PHASE, &roots, &["java"], &output)? && !kotlin_recompiled {
            session.log(format!("Java classes up to date ({} sources)", sources.len()));
            session.put(JAVA_CLASSES, output);
            return Ok(());
        }

        reset_dir(PHASE, &output)?;
        let extra: Vec<_> = session.get(KOTLIN_CLASSES).into_iter().collect();
        let classpath = join_classpath(PHASE, &compile_classpath(session, &extra))?;
        session.log(format!("compiling {} Java sources", sources.len()));
        let job = Arc::new(CompileJob {
            phase: PHASE,
            sources,
            classpath,
            output: output.clone(),
            options: ["-source", "1.8", "-target", "1.8", "-encoding", "UTF-8"]
                .iter()
                .map(|option| option.to_string())
                .collect(),
            timeout: session.config().timeouts.managed_compile(),
        });
        let strategies: Vec<Box<dyn Strategy<()>>> = vec![
            Box::new(BridgeCompiler {
                label: "bundled ecj",
                jar: Tool::EcjJar,
                main_class: "org.eclipse.jdt.internal.compiler.batch.Main",
                job: Arc::clone(&job),
            }),
            Box::new(HostCompiler {
                label: "javac",
                tool: Tool::Javac,
                job,
            }),
        ];
        run_ladder(session, PHASE, "Java compiler", &strategies)?;

        persist_cache(session);
        session.put(JAVA_CLASSES, output);
        Ok(())
    }
}
