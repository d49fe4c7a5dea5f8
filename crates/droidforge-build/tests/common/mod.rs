#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use droidforge_build::BuildSession;
use droidforge_cache::IncrementalCache;
use droidforge_core::abi::Abi;
use droidforge_core::config::ForgeConfig;
use droidforge_core::{CancellationToken, ProjectConfig};
use droidforge_toolchain::{HostEnvironment, HttpDownloader, ToolchainManager};

pub struct Fixture {
    pub temp: tempfile::TempDir,
    pub project_dir: PathBuf,
    pub config: ForgeConfig,
    /// Every fake tool appends its argument list here.
    pub tool_log: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let project_dir = temp.path().join("project");
        fs::create_dir_all(&project_dir).expect("project dir");
        let mut config = ForgeConfig::default();
        config.toolchain.install_root = temp.path().join("sdk");
        config.toolchain.platform_sources = Vec::new();
        config.toolchain.build_tools_sources = Vec::new();
        config.toolchain.ndk_sources = Vec::new();
        config.toolchain.install_timeout_secs = 5;
        config.resolver.cache_dir = Some(temp.path().join("m2"));
        config.resolver.repositories = Vec::new();
        let tool_log = temp.path().join("tools.log");
        Self {
            temp,
            project_dir,
            config,
            tool_log,
        }
    }

    pub fn install_root(&self) -> PathBuf {
        self.config.toolchain.install_root.clone()
    }

    pub fn build_tools_dir(&self) -> PathBuf {
        self.install_root().join("build-tools/34.0.0")
    }

    /// Platform library plus an `aapt2` that links `template` as the
    /// resource container.
    pub fn install_sdk(&self) {
        let platform = self.install_root().join("platforms/android-34");
        fs::create_dir_all(&platform).expect("platform dir");
        fs::write(platform.join("android.jar"), b"not really a jar").expect("android.jar");

        let template = self.temp.path().join("template.ap_");
        write_zip(
            &template,
            &[
                ("AndroidManifest.xml", b"<manifest package=\"com.example.app\"/>"),
                ("resources.arsc", &[7u8; 128]),
                ("res/layout/main.xml", b"<LinearLayout/>"),
            ],
        );
        let script = format!(
            r#"#!/bin/sh
echo "aapt2 $*" >> '{log}'
mode="$1"
shift
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
if [ "$mode" = "link" ]; then
  cp '{template}' "$out"
else
  echo compiled > "$out"
fi
"#,
            log = self.tool_log.display(),
            template = template.display()
        );
        write_script(&self.build_tools_dir().join("aapt2"), &script);
    }

    /// NDK prebuilt `clang`/`clang++` that write whatever `-o` names. With
    /// `slow_abi` set, compiles for that triple sleep first.
    pub fn install_ndk(&self, slow_triple: Option<&str>) {
        let bin = self
            .install_root()
            .join("ndk/r27b/toolchains/llvm/prebuilt")
            .join(format!("linux-{}", std::env::consts::ARCH))
            .join("bin");
        let delay = match slow_triple {
            Some(triple) => format!(
                "case \"$*\" in\n  *{}*\" -c \"*) sleep 3 ;;\nesac\n",
                triple
            ),
            None => String::new(),
        };
        let script = format!(
            r#"#!/bin/sh
echo "clang $*" >> '{log}'
out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-o" ]; then out="$arg"; fi
  prev="$arg"
done
{delay}mkdir -p "$(dirname "$out")"
echo built > "$out"
"#,
            log = self.tool_log.display(),
            delay = delay
        );
        write_script(&bin.join("clang"), &script);
        write_script(&bin.join("clang++"), &script);
    }

    /// Host tool under `<install_root>/bin`, which takes precedence over the
    /// search path.
    pub fn install_host_tool(&self, name: &str, body: &str) {
        let script = format!(
            "#!/bin/sh\necho \"{} $*\" >> '{}'\n{}",
            name,
            self.tool_log.display(),
            body
        );
        write_script(&self.install_root().join("bin").join(name), &script);
    }

    pub fn write_manifest(&self) {
        let main = self.project_dir.join("src/main");
        fs::create_dir_all(main.join("res/values")).expect("res dir");
        fs::write(
            main.join("AndroidManifest.xml"),
            "<manifest package=\"com.example.app\"/>",
        )
        .expect("manifest");
        fs::write(main.join("res/values/strings.xml"), "<resources/>").expect("strings");
    }

    pub fn write_native_sources(&self) {
        let cpp = self.project_dir.join("src/main/cpp");
        fs::create_dir_all(&cpp).expect("cpp dir");
        fs::write(cpp.join("native-lib.cpp"), "int answer() { return 42; }").expect("cpp");
        fs::write(cpp.join("util.c"), "int twice(int x) { return 2 * x; }").expect("c");
    }

    pub fn project(&self, native: bool, abis: Vec<Abi>) -> ProjectConfig {
        ProjectConfig::builder()
            .name("demo")
            .package("com.example.app")
            .project_dir(&self.project_dir)
            .native_enabled(native)
            .abis(abis)
            .build()
            .expect("project")
    }

    pub fn toolchain(&self) -> Arc<ToolchainManager> {
        let downloader =
            HttpDownloader::new("droidforge-test", Duration::from_secs(5)).expect("downloader");
        Arc::new(
            ToolchainManager::with_downloader(self.config.toolchain.clone(), Arc::new(downloader))
                .with_host(HostEnvironment::default()),
        )
    }

    pub fn session(&self, project: ProjectConfig) -> BuildSession {
        let cache = Arc::new(IncrementalCache::open(&project));
        BuildSession::new(
            project,
            self.config.clone(),
            self.toolchain(),
            cache,
            CancellationToken::new(),
        )
    }

    pub fn tool_calls(&self) -> Vec<String> {
        fs::read_to_string(&self.tool_log)
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

pub fn write_script(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("script dir");
    }
    fs::write(path, body).expect("write script");
    let mut permissions = fs::metadata(path).expect("metadata").permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(path, permissions).expect("chmod");
}

pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = fs::File::create(path).expect("create zip");
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::<()>::default();
    for (name, body) in entries {
        writer.start_file(*name, options).expect("start entry");
        writer.write_all(body).expect("write entry");
    }
    writer.finish().expect("finish zip");
}

/// Files with `extension` anywhere under `dir`.
pub fn files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path().to_path_buf())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some(extension))
        .collect()
}
