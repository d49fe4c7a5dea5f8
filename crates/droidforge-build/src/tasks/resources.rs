use std::fs;
use std::path::Path;

use droidforge_core::process::ProcessSpec;
use droidforge_core::{BuildError, BuildPhase};
use droidforge_toolchain::Tool;

use crate::artifacts::{GENERATED_SOURCES, RESOURCE_APK};
use crate::session::BuildSession;
use crate::task::Task;

use super::{collect_files, io_error, reset_dir};

/// `aapt2 compile` over `src/main/res`, then `aapt2 link` against the
/// platform library into a resource container plus generated `R.java`.
pub struct ProcessResourcesTask;

impl Task for ProcessResourcesTask {
    fn name(&self) -> &'static str {
        "process-resources"
    }

    fn phase(&self) -> BuildPhase {
        BuildPhase::ResourceProcessing
    }

    fn execute(&self, session: &BuildSession) -> Result<(), BuildError> {
        let phase = self.phase();
        let project = session.project();
        let layout = project.layout();
        if !layout.manifest_path.is_file() {
            return Err(BuildError::new(
                phase,
                format!("manifest not found at '{}'", layout.manifest_path.display()),
            ));
        }
        let aapt2 = session
            .tool_path(Tool::Aapt2)
            .ok_or_else(|| BuildError::new(phase, "aapt2 is not installed"))?;
        let android_jar = session
            .tool_path(Tool::AndroidJar)
            .ok_or_else(|| BuildError::new(phase, "android.jar is not installed"))?;
        let timeout = session.config().timeouts.resources();

        let work_dir = session.intermediate("res");
        reset_dir(phase, &work_dir)?;
        let compiled = work_dir.join("compiled.zip");
        if layout.res_dir.is_dir() {
            session.progress(0.1, "compiling resources");
            let spec = ProcessSpec::new(&aapt2)
                .arg("compile")
                .arg("--dir")
                .arg(&layout.res_dir)
                .arg("-o")
                .arg(&compiled)
                .timeout(timeout);
            session.run_tool(phase, &spec)?;
        } else {
            session.log("no resources directory; linking manifest only");
        }

        session.progress(0.5, "linking resources");
        let resource_apk = work_dir.join("resources.ap_");
        let staging = work_dir.join("r-staging");
        let mut spec = ProcessSpec::new(&aapt2)
            .arg("link")
            .arg("-I")
            .arg(&android_jar)
            .arg("--manifest")
            .arg(&layout.manifest_path)
            .arg("-o")
            .arg(&resource_apk)
            .arg("--java")
            .arg(&staging)
            .arg("--auto-add-overlay")
            .arg("--min-sdk-version")
            .arg(project.min_sdk().to_string())
            .arg("--target-sdk-version")
            .arg(project.target_sdk().to_string())
            .arg("--version-code")
            .arg(project.version_code().to_string())
            .arg("--version-name")
            .arg(project.version_name())
            .arg("--rename-manifest-package")
            .arg(project.package())
            .timeout(timeout);
        if project.is_debug() {
            spec = spec.arg("--debug-mode");
        }
        if layout.assets_dir.is_dir() {
            spec = spec.arg("-A").arg(&layout.assets_dir);
        }
        if compiled.is_file() {
            spec = spec.arg(&compiled);
        }
        session.run_tool(phase, &spec)?;
        if !resource_apk.is_file() {
            return Err(BuildError::new(
                phase,
                "aapt2 link finished without producing a resource container",
            ));
        }

        let generated = session.intermediate("generated/r");
        let changed = sync_tree(phase, &staging, &generated)?;
        session.log(format!("resources linked; {} generated sources updated", changed));
        session.put(RESOURCE_APK, resource_apk);
        session.put(GENERATED_SOURCES, generated);
        Ok(())
    }
}

/// Mirrors `source` into `dest`, rewriting only files whose content changed
/// so unchanged `R.java` keeps its timestamp for the incremental cache.
/// Returns the number of files written.
fn sync_tree(phase: BuildPhase, source: &Path, dest: &Path) -> Result<usize, BuildError> {
    fs::create_dir_all(dest).map_err(|error| io_error(phase, dest, error))?;
    let mut written = 0;
    let mut wanted = Vec::new();
    for file in collect_files(&[source.to_path_buf()], &["java"]) {
        let Ok(relative) = file.strip_prefix(source) else {
            continue;
        };
        let target = dest.join(relative);
        wanted.push(target.clone());
        let contents = fs::read(&file).map_err(|error| io_error(phase, &file, error))?;
        if fs::read(&target).ok().as_deref() == Some(contents.as_slice()) {
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|error| io_error(phase, parent, error))?;
        }
        fs::write(&target, contents).map_err(|error| io_error(phase, &target, error))?;
        written += 1;
    }
    for stale in collect_files(&[dest.to_path_buf()], &["java"]) {
        if !wanted.contains(&stale) {
            fs::remove_file(&stale).map_err(|error| io_error(phase, &stale, error))?;
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_tree_rewrites_only_changed_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("staging");
        let dest = dir.path().join("generated");
        fs::create_dir_all(source.join("com/example")).expect("mkdir");
        fs::write(source.join("com/example/R.java"), "class R {}").expect("write");

        let phase = BuildPhase::ResourceProcessing;
        assert_eq!(sync_tree(phase, &source, &dest).expect("first sync"), 1);
        assert_eq!(sync_tree(phase, &source, &dest).expect("second sync"), 0);

        fs::write(dest.join("com/example/Old.java"), "class Old {}").expect("write");
        fs::write(source.join("com/example/R.java"), "class R { int x; }").expect("write");
        assert_eq!(sync_tree(phase, &source, &dest).expect("third sync"), 1);
        assert!(!dest.join("com/example/Old.java").exists());
        assert_eq!(
            fs::read_to_string(dest.join("com/example/R.java")).expect("read"),
            "class R { int x; }"
        );
    }
}
