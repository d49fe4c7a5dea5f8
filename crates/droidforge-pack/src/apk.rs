use std::collections::HashSet;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::CompressionMethod;

use droidforge_core::abi::Abi;

use crate::archive::{entry_options, files_under};
use crate::error::PackError;

/// What went into a written APK.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApkSummary {
    pub path: PathBuf,
    pub entries: Vec<String>,
    pub dex_count: usize,
    pub native_libs: usize,
}

/// Assembles an unsigned APK from the linked resource container, the dex
/// files and per-ABI native library directories. The first source to claim
/// an archive path wins.
#[derive(Clone, Debug, Default)]
pub struct ApkBuilder {
    resource_apk: Option<PathBuf>,
    dex_files: Vec<PathBuf>,
    native_dirs: Vec<PathBuf>,
    abis: Option<Vec<Abi>>,
}

impl ApkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource_apk(mut self, path: impl Into<PathBuf>) -> Self {
        self.resource_apk = Some(path.into());
        self
    }

    /// Dex files in load order: `classes.dex`, `classes2.dex`, ...
    pub fn dex_files(mut self, files: Vec<PathBuf>) -> Self {
        self.dex_files = files;
        self
    }

    /// Directory laid out as `<abi>/lib*.so`.
    pub fn native_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.native_dirs.push(dir.into());
        self
    }

    /// Restricts packaged native libraries to these ABIs.
    pub fn abis(mut self, abis: Vec<Abi>) -> Self {
        self.abis = Some(abis);
        self
    }

    pub fn write(&self, output: &Path) -> Result<ApkSummary, PackError> {
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).map_err(|error| PackError::io(parent, error))?;
        }
        let file = fs::File::create(output).map_err(|error| PackError::io(output, error))?;
        let mut writer = zip::ZipWriter::new(file);
        let mut summary = ApkSummary {
            path: output.to_path_buf(),
            ..ApkSummary::default()
        };
        let mut claimed = HashSet::new();

        if let Some(resource_apk) = &self.resource_apk {
            copy_resource_entries(resource_apk, &mut writer, &mut claimed, &mut summary)?;
        }

        for (index, dex) in self.dex_files.iter().enumerate() {
            if !dex.is_file() {
                return Err(PackError::MissingInput(dex.display().to_string()));
            }
            let name = dex_entry_name(index);
            if add_file(&mut writer, &name, dex, &mut claimed, &mut summary)? {
                summary.dex_count += 1;
            }
        }

        for dir in &self.native_dirs {
            for (relative, path) in files_under(dir)? {
                let Some(name) = self.native_entry_name(&relative) else {
                    continue;
                };
                if add_file(&mut writer, &name, &path, &mut claimed, &mut summary)? {
                    summary.native_libs += 1;
                }
            }
        }

        writer.finish().map_err(|error| PackError::zip(output, error))?;
        if !output.is_file() {
            return Err(PackError::OutputMissing(output.display().to_string()));
        }
        info!(
            apk = %output.display(),
            entries = summary.entries.len(),
            dex = summary.dex_count,
            native = summary.native_libs,
            "apk written"
        );
        Ok(summary)
    }

    /// `<abi>/<name>.so` with a known, selected ABI becomes `lib/<abi>/<name>.so`.
    fn native_entry_name(&self, relative: &str) -> Option<String> {
        let (abi_name, file_name) = relative.split_once('/')?;
        if file_name.contains('/') || !file_name.ends_with(".so") {
            return None;
        }
        let abi: Abi = abi_name.parse().ok()?;
        if let Some(selected) = &self.abis {
            if !selected.contains(&abi) {
                return None;
            }
        }
        Some(format!("lib/{}/{}", abi, file_name))
    }
}

pub fn dex_entry_name(index: usize) -> String {
    if index == 0 {
        "classes.dex".to_string()
    } else {
        format!("classes{}.dex", index + 1)
    }
}

fn add_file(
    writer: &mut zip::ZipWriter<fs::File>,
    name: &str,
    source: &Path,
    claimed: &mut HashSet<String>,
    summary: &mut ApkSummary,
) -> Result<bool, PackError> {
    if !claimed.insert(name.to_string()) {
        debug!(entry = name, source = %source.display(), "duplicate entry skipped");
        return Ok(false);
    }
    writer
        .start_file(name, entry_options(name)?)
        .map_err(|error| PackError::zip(source, error))?;
    let mut input = fs::File::open(source).map_err(|error| PackError::io(source, error))?;
    io::copy(&mut input, writer).map_err(|error| PackError::io(source, error))?;
    summary.entries.push(name.to_string());
    Ok(true)
}

/// Entries of the linked resource container are carried over as-is, except
/// that a compressed `resources.arsc` is rewritten stored.
fn copy_resource_entries(
    resource_apk: &Path,
    writer: &mut zip::ZipWriter<fs::File>,
    claimed: &mut HashSet<String>,
    summary: &mut ApkSummary,
) -> Result<(), PackError> {
    let file = fs::File::open(resource_apk).map_err(|_| {
        PackError::MissingInput(resource_apk.display().to_string())
    })?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|error| PackError::zip(resource_apk, error))?;
    for index in 0..archive.len() {
        let name = archive
            .by_index_raw(index)
            .map_err(|error| PackError::zip(resource_apk, error))?
            .name()
            .to_string();
        if name.ends_with('/') || !claimed.insert(name.clone()) {
            continue;
        }
        let needs_restore = {
            let entry = archive
                .by_index_raw(index)
                .map_err(|error| PackError::zip(resource_apk, error))?;
            name == "resources.arsc" && entry.compression() != CompressionMethod::Stored
        };
        if needs_restore {
            let mut entry = archive
                .by_index(index)
                .map_err(|error| PackError::zip(resource_apk, error))?;
            let mut bytes = Vec::new();
            entry
                .read_to_end(&mut bytes)
                .map_err(|error| PackError::io(resource_apk, error))?;
            writer
                .start_file(name.as_str(), entry_options(&name)?)
                .map_err(|error| PackError::zip(resource_apk, error))?;
            io::Write::write_all(writer, &bytes).map_err(|error| PackError::io(resource_apk, error))?;
        } else {
            let entry = archive
                .by_index_raw(index)
                .map_err(|error| PackError::zip(resource_apk, error))?;
            writer
                .raw_copy_file(entry)
                .map_err(|error| PackError::zip(resource_apk, error))?;
        }
        summary.entries.push(name);
    }
    Ok(())
}
