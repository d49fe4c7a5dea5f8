use droidforge_core::{BuildError, BuildPhase};
use droidforge_pack::ApkBuilder;

use crate::artifacts::{DEX_FILES, NATIVE_LIBS_DIR, RESOLVED_NATIVE_DIRS, RESOURCE_APK, UNSIGNED_APK};
use crate::session::BuildSession;
use crate::task::Task;

const PHASE: BuildPhase = BuildPhase::Packaging;

/// Merges the resource container, dex files and native libraries into an
/// unsigned APK.
pub struct PackageApkTask;

impl Task for PackageApkTask {
    fn name(&self) -> &'static str {
        "package-apk"
    }

    fn phase(&self) -> BuildPhase {
        PHASE
    }

    fn execute(&self, session: &BuildSession) -> Result<(), BuildError> {
        session.check_cancelled(PHASE)?;
        let project = session.project();
        let layout = project.layout();
        let resource_apk = session
            .get(RESOURCE_APK)
            .ok_or_else(|| BuildError::new(PHASE, "no linked resources to package"))?;

        // NDK build output first, then prebuilt libraries, then AAR libraries
        let mut builder = ApkBuilder::new()
            .resource_apk(resource_apk)
            .dex_files(session.get(DEX_FILES).unwrap_or_default())
            .abis(project.abis().to_vec());
        if let Some(native) = session.get(NATIVE_LIBS_DIR) {
            builder = builder.native_dir(native);
        }
        builder = builder
            .native_dir(&layout.jni_libs_dir)
            .native_dir(&layout.libs_dir);
        for dir in session.get(RESOLVED_NATIVE_DIRS).unwrap_or_default() {
            builder = builder.native_dir(dir);
        }

        let output = session
            .intermediate("apk")
            .join(format!("{}-{}-unsigned.apk", project.name(), project.build_variant()));
        let summary = builder.write(&output).map_err(|error| {
            BuildError::new(PHASE, "could not assemble the APK").with_source(error)
        })?;
        if !summary.path.is_file() {
            return Err(BuildError::new(
                PHASE,
                format!("APK missing after packaging: '{}'", summary.path.display()),
            ));
        }
        session.log(format!(
            "packaged {} entries ({} dex, {} native libraries)",
            summary.entries.len(),
            summary.dex_count,
            summary.native_libs
        ));
        session.put(UNSIGNED_APK, summary.path);
        Ok(())
    }
}
