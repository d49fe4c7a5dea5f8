use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use zip::write::FileOptions;
use zip::CompressionMethod;

use droidforge_core::process::ProcessSpec;
use droidforge_core::{BuildError, BuildPhase};
use droidforge_toolchain::Tool;

use crate::artifacts::{CLASSES_JAR, DEX_FILES, JAVA_CLASSES, KOTLIN_CLASSES, RESOLVED_CLASSPATH};
use crate::session::BuildSession;
use crate::strategy::{run_ladder, Attempt, Strategy};
use crate::task::Task;

use super::{collect_files, executable, io_error, java_bridge, reset_dir};

const PHASE: BuildPhase = BuildPhase::DexConversion;

/// Bundles compiled classes into one jar and converts it, with library
/// jars, to dex: `d8` binary, then `d8.jar` through Java, then legacy `dx`.
/// There is no placeholder output: with no converter the task fails.
pub struct ConvertToDexTask;

impl Task for ConvertToDexTask {
    fn name(&self) -> &'static str {
        "convert-to-dex"
    }

    fn phase(&self) -> BuildPhase {
        PHASE
    }

    fn execute(&self, session: &BuildSession) -> Result<(), BuildError> {
        let class_dirs: Vec<PathBuf> = [session.get(KOTLIN_CLASSES), session.get(JAVA_CLASSES)]
            .into_iter()
            .flatten()
            .collect();
        let libraries = session.get(RESOLVED_CLASSPATH).unwrap_or_default();

        let work_dir = session.intermediate("dex");
        let output_dir = work_dir.join("out");
        reset_dir(PHASE, &work_dir)?;
        fs::create_dir_all(&output_dir).map_err(|error| io_error(PHASE, &output_dir, error))?;

        let classes_jar = work_dir.join("classes.jar");
        let bundled = write_class_jar(&class_dirs, &classes_jar)?;
        let mut inputs = Vec::new();
        if bundled > 0 {
            session.log(format!("bundled {} classes into {}", bundled, classes_jar.display()));
            session.put(CLASSES_JAR, classes_jar.clone());
            inputs.push(classes_jar);
        }
        inputs.extend(libraries);
        if inputs.is_empty() {
            session.log("no compiled classes to convert");
            session.put(DEX_FILES, Vec::new());
            return Ok(());
        }

        let job = Arc::new(DexJob {
            inputs,
            output_dir: output_dir.clone(),
            android_jar: session.tool_path(Tool::AndroidJar),
            min_api: session.project().min_sdk(),
            debug: session.project().is_debug(),
        });
        let strategies: Vec<Box<dyn Strategy<()>>> = vec![
            Box::new(D8Binary(Arc::clone(&job))),
            Box::new(D8Jar(Arc::clone(&job))),
            Box::new(Dx(job)),
        ];
        session.progress(0.2, "converting classes to dex");
        run_ladder(session, PHASE, "dex converter", &strategies)?;

        let dex_files = dex_outputs(&output_dir);
        if dex_files.is_empty() {
            return Err(BuildError::new(PHASE, "dex converter produced no dex files"));
        }
        session.log(format!("produced {} dex files", dex_files.len()));
        session.put(DEX_FILES, dex_files);
        Ok(())
    }
}

struct DexJob {
    inputs: Vec<PathBuf>,
    output_dir: PathBuf,
    android_jar: Option<PathBuf>,
    min_api: u32,
    debug: bool,
}

impl DexJob {
    fn d8_args(&self, spec: ProcessSpec, session: &BuildSession) -> ProcessSpec {
        let mut spec = spec
            .arg("--output")
            .arg(&self.output_dir)
            .arg("--min-api")
            .arg(self.min_api.to_string())
            .arg(if self.debug { "--debug" } else { "--release" });
        if let Some(android_jar) = &self.android_jar {
            spec = spec.arg("--lib").arg(android_jar);
        }
        spec.args(&self.inputs).timeout(session.config().timeouts.dex())
    }
}

struct D8Binary(Arc<DexJob>);

impl Strategy<()> for D8Binary {
    fn name(&self) -> &'static str {
        "d8"
    }

    fn attempt(&self, session: &BuildSession) -> Result<Attempt<()>, BuildError> {
        let spec = match executable(session, Tool::D8) {
            Attempt::Done(spec) => spec,
            Attempt::Unavailable(reason) => return Ok(Attempt::Unavailable(reason)),
        };
        session.run_tool(PHASE, &self.0.d8_args(spec, session))?;
        Ok(Attempt::Done(()))
    }
}

struct D8Jar(Arc<DexJob>);

impl Strategy<()> for D8Jar {
    fn name(&self) -> &'static str {
        "d8.jar"
    }

    fn attempt(&self, session: &BuildSession) -> Result<Attempt<()>, BuildError> {
        let spec = match java_bridge(session, Tool::D8Jar, "com.android.tools.r8.D8") {
            Attempt::Done(spec) => spec,
            Attempt::Unavailable(reason) => return Ok(Attempt::Unavailable(reason)),
        };
        session.run_tool(PHASE, &self.0.d8_args(spec, session))?;
        Ok(Attempt::Done(()))
    }
}

struct Dx(Arc<DexJob>);

impl Strategy<()> for Dx {
    fn name(&self) -> &'static str {
        "dx"
    }

    fn attempt(&self, session: &BuildSession) -> Result<Attempt<()>, BuildError> {
        let spec = match executable(session, Tool::Dx) {
            Attempt::Done(spec) => spec,
            Attempt::Unavailable(reason) => return Ok(Attempt::Unavailable(reason)),
        };
        let job = &self.0;
        let spec = spec
            .arg("--dex")
            .arg(format!("--min-sdk-version={}", job.min_api))
            .arg("--multi-dex")
            .arg(format!("--output={}", job.output_dir.display()))
            .args(&job.inputs)
            .timeout(session.config().timeouts.dex());
        session.run_tool(PHASE, &spec)?;
        Ok(Attempt::Done(()))
    }
}

/// Writes every `.class` under `dirs` into `dest`; the first directory to
/// provide a path wins. Returns the number of classes written; no jar is
/// created when there are none.
fn write_class_jar(dirs: &[PathBuf], dest: &Path) -> Result<usize, BuildError> {
    let mut entries = Vec::new();
    let mut seen = HashSet::new();
    for dir in dirs {
        for file in collect_files(&[dir.clone()], &["class"]) {
            let Ok(relative) = file.strip_prefix(dir) else {
                continue;
            };
            let name = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            if seen.insert(name.clone()) {
                entries.push((name, file));
            }
        }
    }
    if entries.is_empty() {
        return Ok(0);
    }

    let jar = fs::File::create(dest).map_err(|error| io_error(PHASE, dest, error))?;
    let mut writer = zip::ZipWriter::new(jar);
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);
    for (name, file) in &entries {
        writer
            .start_file(name.as_str(), options)
            .map_err(|error| jar_error(dest, error))?;
        let mut input = fs::File::open(file).map_err(|error| io_error(PHASE, file, error))?;
        io::copy(&mut input, &mut writer).map_err(|error| io_error(PHASE, dest, error))?;
    }
    writer.finish().map_err(|error| jar_error(dest, error))?;
    Ok(entries.len())
}

fn jar_error(path: &Path, error: zip::result::ZipError) -> BuildError {
    BuildError::new(PHASE, format!("cannot write '{}'", path.display())).with_source(error)
}

/// `classes.dex`, `classes2.dex`, ... in load order.
pub(crate) fn dex_outputs(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<(u32, PathBuf)> = fs::read_dir(dir)
        .into_iter()
        .flatten()
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let index = dex_index(&name)?;
            Some((index, entry.path()))
        })
        .collect();
    files.sort();
    files.into_iter().map(|(_, path)| path).collect()
}

fn dex_index(name: &str) -> Option<u32> {
    let middle = name.strip_prefix("classes")?.strip_suffix(".dex")?;
    if middle.is_empty() {
        Some(1)
    } else {
        middle.parse().ok().filter(|index| *index >= 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dex_outputs_follow_load_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["classes10.dex", "classes2.dex", "classes.dex", "other.dex", "classes1.dex"] {
            fs::write(dir.path().join(name), b"dex").expect("write");
        }
        let names: Vec<String> = dex_outputs(dir.path())
            .iter()
            .map(|path| path.file_name().expect("name").to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["classes.dex", "classes2.dex", "classes10.dex"]);
    }

    #[test]
    fn class_jar_prefers_first_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = dir.path().join("kotlin");
        let second = dir.path().join("java");
        fs::create_dir_all(first.join("com/example")).expect("mkdir");
        fs::create_dir_all(second.join("com/example")).expect("mkdir");
        fs::write(first.join("com/example/A.class"), b"kotlin").expect("write");
        fs::write(second.join("com/example/A.class"), b"java").expect("write");
        fs::write(second.join("com/example/B.class"), b"java").expect("write");

        let jar = dir.path().join("classes.jar");
        assert_eq!(write_class_jar(&[first, second], &jar).expect("jar"), 2);
        let mut archive = zip::ZipArchive::new(fs::File::open(&jar).expect("open")).expect("zip");
        let mut entry = archive.by_name("com/example/A.class").expect("entry");
        let mut contents = String::new();
        io::Read::read_to_string(&mut entry, &mut contents).expect("read");
        assert_eq!(contents, "kotlin");
    }

    #[test]
    fn empty_class_dirs_write_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let jar = dir.path().join("classes.jar");
        assert_eq!(write_class_jar(&[dir.path().join("none")], &jar).expect("jar"), 0);
        assert!(!jar.exists());
    }
}
