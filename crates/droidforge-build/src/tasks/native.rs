use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use droidforge_core::abi::Abi;
use droidforge_core::process::ProcessSpec;
use droidforge_core::{BuildError, BuildPhase};
use droidforge_toolchain::{Component, NativeToolchain, Tool};

use crate::artifacts::NATIVE_LIBS_DIR;
use crate::session::BuildSession;
use crate::strategy::{run_ladder, Attempt, Strategy};
use crate::task::Task;

use super::{collect_files, has_files, io_error, reset_dir};

const PHASE: BuildPhase = BuildPhase::NativeCompilation;
const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx"];
const CMAKE_SCRIPT: &str = "CMakeLists.txt";
const NDK_BUILD_SCRIPT: &str = "Android.mk";

/// Builds one shared library per target ABI from `src/main/cpp` and
/// `src/main/jni`.
pub struct CompileNativeTask;

impl Task for CompileNativeTask {
    fn name(&self) -> &'static str {
        "compile-native"
    }

    fn phase(&self) -> BuildPhase {
        PHASE
    }

    fn execute(&self, session: &BuildSession) -> Result<(), BuildError> {
        let project = session.project();
        if !project.native_enabled() {
            session.log("native code disabled; skipping");
            return Ok(());
        }
        let source_dirs = project.layout().existing_native_dirs();
        let sources = collect_files(&source_dirs, SOURCE_EXTENSIONS);
        let has_script = find_script(&source_dirs, CMAKE_SCRIPT).is_some()
            || find_script(&source_dirs, NDK_BUILD_SCRIPT).is_some();
        if sources.is_empty() && !has_script {
            session.log("no native sources found");
            return Ok(());
        }

        let abis = project.abis().to_vec();
        if abis.is_empty() {
            session.log("no matching ABIs; nothing to compile");
            return Ok(());
        }
        let toolchain = session
            .toolchain()
            .native_toolchain()
            .ok_or_else(|| BuildError::new(PHASE, "no usable native compiler (NDK clang) installed"))?;

        let lib_root = session.intermediate("native/lib");
        let obj_root = session.intermediate("native/obj");
        let library = library_name(project.name());
        for (index, abi) in abis.iter().copied().enumerate() {
            session.check_cancelled(PHASE)?;
            session.progress(index as f32 / abis.len() as f32, format!("compiling native code for {}", abi));
            let job = AbiJob {
                abi,
                api_level: project.min_sdk(),
                debug: project.is_debug(),
                toolchain: toolchain.clone(),
                source_dirs: source_dirs.clone(),
                sources: sources.clone(),
                lib_root: lib_root.clone(),
                lib_dir: lib_root.join(abi.as_str()),
                obj_dir: obj_root.join(abi.as_str()),
                library: library.clone(),
            };
            reset_dir(PHASE, &job.lib_dir)?;
            let strategies: Vec<Box<dyn Strategy<()>>> = vec![
                Box::new(CmakeBuild(job.clone())),
                Box::new(NdkBuild(job.clone())),
                Box::new(DirectCompile(job)),
            ];
            run_ladder(session, PHASE, &format!("native build ({})", abi), &strategies)?;
            session.log(format!("native: built {}", abi));
        }

        if has_files(&lib_root, "so") {
            session.put(NATIVE_LIBS_DIR, lib_root);
        } else {
            session.warn("native build produced no shared libraries");
        }
        Ok(())
    }
}

/// `MyApp 2` becomes `myapp_2`, used as `lib<name>.so`.
pub(crate) fn library_name(project_name: &str) -> String {
    let name: String = project_name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch.to_ascii_lowercase() } else { '_' })
        .collect();
    let name = name.trim_matches('_').to_string();
    if name.is_empty() {
        "app".to_string()
    } else {
        name
    }
}

fn find_script(dirs: &[PathBuf], name: &str) -> Option<PathBuf> {
    dirs.iter().map(|dir| dir.join(name)).find(|path| path.is_file())
}

#[derive(Clone, Debug)]
struct AbiJob {
    abi: Abi,
    api_level: u32,
    debug: bool,
    toolchain: NativeToolchain,
    source_dirs: Vec<PathBuf>,
    sources: Vec<PathBuf>,
    lib_root: PathBuf,
    lib_dir: PathBuf,
    obj_dir: PathBuf,
    library: String,
}

impl AbiJob {
    fn target_flag(&self) -> String {
        format!("--target={}", self.abi.clang_target(self.api_level))
    }

    fn sysroot_flag(&self) -> Option<String> {
        self.toolchain
            .sysroot
            .as_ref()
            .map(|sysroot| format!("--sysroot={}", sysroot.display()))
    }

    fn build_type(&self) -> &'static str {
        if self.debug {
            "Debug"
        } else {
            "Release"
        }
    }
}

struct CmakeBuild(AbiJob);

impl Strategy<()> for CmakeBuild {
    fn name(&self) -> &'static str {
        "cmake"
    }

    fn attempt(&self, session: &BuildSession) -> Result<Attempt<()>, BuildError> {
        let job = &self.0;
        let Some(script) = find_script(&job.source_dirs, CMAKE_SCRIPT) else {
            return Ok(Attempt::Unavailable("no CMakeLists.txt".to_string()));
        };
        let Some(cmake) = session.tool_path(Tool::Cmake) else {
            return Ok(Attempt::Unavailable("cmake not found".to_string()));
        };
        let source_dir = script.parent().unwrap_or(Path::new("."));
        let build_dir = session.intermediate("native/cmake").join(job.abi.as_str());
        let timeouts = &session.config().timeouts;

        let mut configure = ProcessSpec::new(&cmake)
            .arg("-S")
            .arg(source_dir)
            .arg("-B")
            .arg(&build_dir)
            .arg(format!("-DANDROID_ABI={}", job.abi))
            .arg(format!("-DANDROID_PLATFORM=android-{}", job.api_level))
            .arg(format!("-DCMAKE_BUILD_TYPE={}", job.build_type()))
            .arg(format!("-DCMAKE_LIBRARY_OUTPUT_DIRECTORY={}", job.lib_dir.display()))
            .timeout(timeouts.native_compile());
        let ndk_dir = Component::Ndk.install_dir(session.toolchain().settings());
        let toolchain_file = ndk_dir.join("build/cmake/android.toolchain.cmake");
        if toolchain_file.is_file() {
            configure = configure.arg(format!("-DCMAKE_TOOLCHAIN_FILE={}", toolchain_file.display()));
        } else {
            let target = job.abi.clang_target(job.api_level);
            let cxx = job.toolchain.clangxx.as_ref().unwrap_or(&job.toolchain.clang);
            configure = configure
                .arg(format!("-DCMAKE_C_COMPILER={}", job.toolchain.clang.display()))
                .arg(format!("-DCMAKE_CXX_COMPILER={}", cxx.display()))
                .arg(format!("-DCMAKE_C_COMPILER_TARGET={}", target))
                .arg(format!("-DCMAKE_CXX_COMPILER_TARGET={}", target));
            if let Some(sysroot) = &job.toolchain.sysroot {
                configure = configure.arg(format!("-DCMAKE_SYSROOT={}", sysroot.display()));
            }
        }
        session.run_tool(PHASE, &configure)?;

        let build = ProcessSpec::new(&cmake)
            .arg("--build")
            .arg(&build_dir)
            .timeout(timeouts.native_link());
        session.run_tool(PHASE, &build)?;
        Ok(Attempt::Done(()))
    }
}

struct NdkBuild(AbiJob);

impl Strategy<()> for NdkBuild {
    fn name(&self) -> &'static str {
        "ndk-build"
    }

    fn attempt(&self, session: &BuildSession) -> Result<Attempt<()>, BuildError> {
        let job = &self.0;
        let Some(script) = find_script(&job.source_dirs, NDK_BUILD_SCRIPT) else {
            return Ok(Attempt::Unavailable("no Android.mk".to_string()));
        };
        let Some(ndk_build) = session.tool_path(Tool::NdkBuild) else {
            return Ok(Attempt::Unavailable("ndk-build not found".to_string()));
        };
        let spec = ProcessSpec::new(ndk_build)
            .arg(format!("NDK_PROJECT_PATH={}", session.project().project_dir().display()))
            .arg(format!("APP_BUILD_SCRIPT={}", script.display()))
            .arg(format!("APP_ABI={}", job.abi))
            .arg(format!("APP_PLATFORM=android-{}", job.api_level))
            .arg(format!("NDK_OUT={}", job.obj_dir.display()))
            .arg(format!("NDK_LIBS_OUT={}", job.lib_root.display()))
            .arg(format!("NDK_DEBUG={}", u8::from(job.debug)))
            .timeout(session.config().timeouts.native_compile());
        session.run_tool(PHASE, &spec)?;
        Ok(Attempt::Done(()))
    }
}

/// Compiles each file with an explicit target triple, then links one shared
/// library. Cancellation is checked before every file.
struct DirectCompile(AbiJob);

impl Strategy<()> for DirectCompile {
    fn name(&self) -> &'static str {
        "direct clang"
    }

    fn attempt(&self, session: &BuildSession) -> Result<Attempt<()>, BuildError> {
        let job = &self.0;
        if job.sources.is_empty() {
            return Ok(Attempt::Unavailable("no C or C++ sources".to_string()));
        }
        reset_dir(PHASE, &job.obj_dir)?;
        let timeouts = &session.config().timeouts;
        let clangxx = job.toolchain.clangxx.as_ref().unwrap_or(&job.toolchain.clang);

        let mut objects = Vec::with_capacity(job.sources.len());
        for source in &job.sources {
            session.check_cancelled(PHASE)?;
            let object = job.obj_dir.join(object_path(source, &job.source_dirs));
            if let Some(parent) = object.parent() {
                fs::create_dir_all(parent).map_err(|error| io_error(PHASE, parent, error))?;
            }
            let compiler = if is_c_source(source) {
                &job.toolchain.clang
            } else {
                clangxx
            };
            let mut spec = ProcessSpec::new(compiler).arg(job.target_flag());
            if let Some(sysroot) = job.sysroot_flag() {
                spec = spec.arg(sysroot);
            }
            spec = spec.arg("-fPIC").arg(if job.debug { "-g" } else { "-O2" });
            for dir in &job.source_dirs {
                spec = spec.arg(format!("-I{}", dir.display()));
            }
            spec = spec
                .arg("-c")
                .arg(source)
                .arg("-o")
                .arg(&object)
                .timeout(timeouts.native_compile());
            debug!(source = %source.display(), abi = %job.abi, "compiling native source");
            session.run_tool(PHASE, &spec)?;
            objects.push(object);
        }

        session.check_cancelled(PHASE)?;
        let output = job.lib_dir.join(format!("lib{}.so", job.library));
        let linker = if job.sources.iter().all(|source| is_c_source(source)) {
            &job.toolchain.clang
        } else {
            clangxx
        };
        let mut spec = ProcessSpec::new(linker).arg(job.target_flag());
        if let Some(sysroot) = job.sysroot_flag() {
            spec = spec.arg(sysroot);
        }
        spec = spec
            .arg("-shared")
            .arg(format!("-Wl,-soname,lib{}.so", job.library))
            .arg("-o")
            .arg(&output)
            .args(&objects)
            .timeout(timeouts.native_link());
        if job.toolchain.has_sysroot_libs(job.abi) {
            spec = spec.arg("-llog").arg("-landroid");
        } else {
            session.warn(format!(
                "no sysroot libraries for {}; linking without -llog -landroid",
                job.abi
            ));
        }
        session.run_tool(PHASE, &spec)?;
        if !output.is_file() {
            return Err(BuildError::new(
                PHASE,
                format!("linker did not produce '{}'", output.display()),
            ));
        }
        Ok(Attempt::Done(()))
    }
}

fn is_c_source(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("c")
}

/// `src/main/cpp/util/math.cpp` becomes `util/math.cpp.o`. Sources outside
/// every root keep only their file name.
fn object_path(source: &Path, roots: &[PathBuf]) -> PathBuf {
    let relative = roots
        .iter()
        .find_map(|root| source.strip_prefix(root).ok())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| source.file_name().map(PathBuf::from).unwrap_or_default());
    let mut name = relative.into_os_string();
    name.push(".o");
    PathBuf::from(name)
}
