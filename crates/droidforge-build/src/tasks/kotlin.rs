use std::sync::Arc;

use droidforge_core::{BuildError, BuildPhase};
use droidforge_toolchain::Tool;

use crate::artifacts::{KOTLIN_CLASSES, KOTLIN_RECOMPILED};
use crate::session::BuildSession;
use crate::strategy::{run_ladder, Strategy};
use crate::task::Task;

use super::managed::{persist_cache, sources_unchanged, BridgeCompiler, CompileJob, HostCompiler};
use super::{collect_files, compile_classpath, join_classpath, reset_dir};

const PHASE: BuildPhase = BuildPhase::KotlinCompilation;

/// Compiles `.kt` sources: bundled compiler jar first, then host `kotlinc`.
pub struct CompileKotlinTask;

impl Task for CompileKotlinTask {
    fn name(&self) -> &'static str {
        "compile-kotlin"
    }

    fn phase(&self) -> BuildPhase {
        PHASE
    }

    fn execute(&self, session: &BuildSession) -> Result<(), BuildError> {
        let layout = session.project().layout();
        let roots = vec![layout.kotlin_dir.clone(), layout.java_dir.clone()];
        let sources = collect_files(&roots, &["kt"]);
        if sources.is_empty() {
            session.log("no Kotlin sources");
            return Ok(());
        }

        let output = session.intermediate("classes/kotlin");
        if sources_unchanged(session, PHASE, &roots, &["kt"], &output)? {
            session.log(format!("Kotlin classes up to date ({} sources)", sources.len()));
            session.put(KOTLIN_CLASSES, output);
            session.put(KOTLIN_RECOMPILED, false);
            return Ok(());
        }

        reset_dir(PHASE, &output)?;
        let classpath = join_classpath(PHASE, &compile_classpath(session, &[]))?;
        session.log(format!("compiling {} Kotlin sources", sources.len()));
        let job = Arc::new(CompileJob {
            phase: PHASE,
            sources,
            classpath,
            output: output.clone(),
            options: vec!["-jvm-target".to_string(), "1.8".to_string(), "-no-reflect".to_string()],
            timeout: session.config().timeouts.managed_compile(),
        });
        let strategies: Vec<Box<dyn Strategy<()>>> = vec![
            Box::new(BridgeCompiler {
                label: "bundled kotlin compiler",
                jar: Tool::KotlinCompilerJar,
                main_class: "org.jetbrains.kotlin.cli.jvm.K2JVMCompiler",
                job: Arc::clone(&job),
            }),
            Box::new(HostCompiler {
                label: "kotlinc",
                tool: Tool::Kotlinc,
                job,
            }),
        ];
        run_ladder(session, PHASE, "Kotlin compiler", &strategies)?;

        persist_cache(session);
        session.put(KOTLIN_CLASSES, output);
        session.put(KOTLIN_RECOMPILED, true);
        Ok(())
    }
}
