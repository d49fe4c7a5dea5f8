//! Archive unpacking for downloaded toolchain components.

use std::fs;
use std::io::{self, Read};
use std::path::{Component as PathComponent, Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, warn};
use walkdir::WalkDir;

use droidforge_core::process::make_executable;

use crate::error::ToolchainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    /// Entries refused because they would land outside the destination.
    pub skipped: Vec<String>,
}

/// Magic bytes decide; the source name is consulted only when they are
/// inconclusive.
pub fn detect_format(path: &Path, source_hint: &str) -> Option<ArchiveFormat> {
    let mut magic = [0u8; 4];
    let read = fs::File::open(path)
        .and_then(|mut file| file.read(&mut magic))
        .unwrap_or(0);
    if read >= 4 && magic == [b'P', b'K', 0x03, 0x04] {
        return Some(ArchiveFormat::Zip);
    }
    if read >= 2 && magic[0] == 0x1f && magic[1] == 0x8b {
        return Some(ArchiveFormat::TarGz);
    }
    let hint = source_hint.to_ascii_lowercase();
    if hint.ends_with(".zip") || hint.ends_with(".jar") {
        Some(ArchiveFormat::Zip)
    } else if hint.ends_with(".tar.gz") || hint.ends_with(".tgz") {
        Some(ArchiveFormat::TarGz)
    } else {
        None
    }
}

pub fn extract(
    archive: &Path,
    dest: &Path,
    format: ArchiveFormat,
) -> Result<ExtractSummary, ToolchainError> {
    fs::create_dir_all(dest).map_err(|error| ToolchainError::io(dest, error))?;
    let summary = match format {
        ArchiveFormat::Zip => extract_zip(archive, dest)?,
        ArchiveFormat::TarGz => extract_tar_gz(archive, dest)?,
    };
    for skipped in &summary.skipped {
        warn!(entry = %skipped, archive = %archive.display(), "skipped unsafe archive entry");
    }
    debug!(files = summary.files, dest = %dest.display(), "archive extracted");
    Ok(summary)
}

/// Relative path with no parent, root or prefix components.
pub fn is_safe_entry(name: &str) -> bool {
    if name.is_empty() || name.starts_with('/') || name.starts_with('\\') {
        return false;
    }
    Path::new(name)
        .components()
        .all(|component| matches!(component, PathComponent::Normal(_) | PathComponent::CurDir))
}

fn archive_error(archive: &Path, reason: impl ToString) -> ToolchainError {
    ToolchainError::Archive {
        path: archive.display().to_string(),
        reason: reason.to_string(),
    }
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<ExtractSummary, ToolchainError> {
    let file = fs::File::open(archive).map_err(|error| ToolchainError::io(archive, error))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|error| archive_error(archive, error))?;
    let mut summary = ExtractSummary::default();
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|error| archive_error(archive, error))?;
        let name = entry.name().to_string();
        let relative = match entry.enclosed_name() {
            Some(relative) if is_safe_entry(&name) => relative,
            _ => {
                summary.skipped.push(name);
                continue;
            }
        };
        let target = dest.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|error| ToolchainError::io(&target, error))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|error| ToolchainError::io(parent, error))?;
        }
        let mode = entry.unix_mode();
        if mode.map(|mode| mode & 0o170000 == 0o120000).unwrap_or(false) {
            let mut link_target = String::new();
            entry
                .read_to_string(&mut link_target)
                .map_err(|error| archive_error(archive, error))?;
            if !link_stays_inside(&relative, &link_target) {
                summary.skipped.push(name);
                continue;
            }
            create_symlink(&link_target, &target)?;
            summary.files += 1;
            continue;
        }
        let mut output =
            fs::File::create(&target).map_err(|error| ToolchainError::io(&target, error))?;
        io::copy(&mut entry, &mut output).map_err(|error| ToolchainError::io(&target, error))?;
        if mode.map(|mode| mode & 0o111 != 0).unwrap_or(false) {
            make_executable(&target).map_err(|error| ToolchainError::io(&target, error))?;
        }
        summary.files += 1;
    }
    Ok(summary)
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<ExtractSummary, ToolchainError> {
    let file = fs::File::open(archive).map_err(|error| ToolchainError::io(archive, error))?;
    let mut tarball = tar::Archive::new(GzDecoder::new(file));
    let mut summary = ExtractSummary::default();
    let entries = tarball
        .entries()
        .map_err(|error| archive_error(archive, error))?;
    for entry in entries {
        let mut entry = entry.map_err(|error| archive_error(archive, error))?;
        let name = entry
            .path()
            .map_err(|error| archive_error(archive, error))?
            .to_string_lossy()
            .into_owned();
        if !is_safe_entry(&name) {
            summary.skipped.push(name);
            continue;
        }
        let unpacked = entry
            .unpack_in(dest)
            .map_err(|error| archive_error(archive, error))?;
        if !unpacked {
            summary.skipped.push(name);
            continue;
        }
        if !entry.header().entry_type().is_dir() {
            summary.files += 1;
        }
    }
    Ok(summary)
}

fn link_stays_inside(entry: &Path, link_target: &str) -> bool {
    if link_target.starts_with('/') {
        return false;
    }
    let mut depth = entry.components().count() as isize - 1;
    for component in Path::new(link_target).components() {
        match component {
            PathComponent::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            PathComponent::Normal(_) => depth += 1,
            PathComponent::CurDir => {}
            _ => return false,
        }
    }
    true
}

#[cfg(unix)]
fn create_symlink(link_target: &str, path: &Path) -> Result<(), ToolchainError> {
    std::os::unix::fs::symlink(link_target, path).map_err(|error| ToolchainError::io(path, error))
}

#[cfg(not(unix))]
fn create_symlink(link_target: &str, path: &Path) -> Result<(), ToolchainError> {
    let resolved = path
        .parent()
        .map(|parent| parent.join(link_target))
        .unwrap_or_else(|| PathBuf::from(link_target));
    fs::copy(&resolved, path)
        .map(|_| ())
        .map_err(|error| ToolchainError::io(path, error))
}

/// Moves the contents of a lone top-level directory up one level until
/// `marker` appears. Returns whether the marker was found.
pub fn normalize_root(dir: &Path, marker: &str) -> Result<bool, ToolchainError> {
    loop {
        if dir.join(marker).exists() {
            return Ok(true);
        }
        let entries: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|error| ToolchainError::io(dir, error))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .collect();
        if entries.len() != 1 || !entries[0].is_dir() {
            return Ok(false);
        }
        // rename first so a child sharing the wrapper's name cannot collide
        let wrapper = dir.join(".droidforge-unwrap");
        fs::rename(&entries[0], &wrapper).map_err(|error| ToolchainError::io(&wrapper, error))?;
        for child in fs::read_dir(&wrapper).map_err(|error| ToolchainError::io(&wrapper, error))? {
            let child = child.map_err(|error| ToolchainError::io(&wrapper, error))?;
            let target = dir.join(child.file_name());
            fs::rename(child.path(), &target).map_err(|error| ToolchainError::io(&target, error))?;
        }
        fs::remove_dir(&wrapper).map_err(|error| ToolchainError::io(&wrapper, error))?;
    }
}

/// Sets exec bits on files inside `bin/` directories, extensionless files and
/// shell scripts. Archives do not reliably carry modes.
pub fn mark_executables(dir: &Path) -> Result<usize, ToolchainError> {
    let mut marked = 0;
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|error| ToolchainError::Io {
            path: dir.display().to_string(),
            source: io::Error::other(error.to_string()),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let in_bin = path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name == "bin")
            .unwrap_or(false);
        let extension = path.extension().and_then(|ext| ext.to_str());
        if in_bin || extension.is_none() || extension == Some("sh") {
            make_executable(path).map_err(|error| ToolchainError::io(path, error))?;
            marked += 1;
        }
    }
    Ok(marked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).expect("create zip");
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::<()>::default();
        for (name, body) in entries {
            writer.start_file(*name, options).expect("start");
            writer.write_all(body).expect("write");
        }
        writer.finish().expect("finish");
    }

    fn write_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).expect("create tar");
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::fast());
        let mut builder = tar::Builder::new(encoder);
        for (name, body) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_path(name).expect("path");
            header.set_cksum();
            builder.append(&header, *body).expect("append");
        }
        builder.into_inner().expect("tar").finish().expect("gzip");
    }

    #[test]
    fn detects_by_magic_before_suffix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let zip_path = dir.path().join("misnamed.tar.gz");
        write_zip(&zip_path, &[("a", b"1")]);
        assert_eq!(detect_format(&zip_path, "misnamed.tar.gz"), Some(ArchiveFormat::Zip));

        let tar_path = dir.path().join("tools.bin");
        write_tar_gz(&tar_path, &[("a", b"1")]);
        assert_eq!(detect_format(&tar_path, "tools.bin"), Some(ArchiveFormat::TarGz));

        let unknown = dir.path().join("blob");
        fs::write(&unknown, b"??").expect("write");
        assert_eq!(detect_format(&unknown, "https://x/blob.tgz"), Some(ArchiveFormat::TarGz));
        assert_eq!(detect_format(&unknown, "https://x/blob"), None);
    }

    #[test]
    fn zip_traversal_entries_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = dir.path().join("bt.zip");
        write_zip(
            &archive,
            &[("tools/aapt2", b"bin"), ("../escape.txt", b"x"), ("/abs.txt", b"y")],
        );
        let dest = dir.path().join("out");
        let summary = extract(&archive, &dest, ArchiveFormat::Zip).expect("extract");
        assert_eq!(summary.files, 1);
        assert_eq!(summary.skipped.len(), 2);
        assert!(dest.join("tools/aapt2").is_file());
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn tarball_extracts_and_unwraps_to_marker() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = dir.path().join("ndk.tar.gz");
        write_tar_gz(
            &archive,
            &[
                ("android-ndk-r27/ndk/toolchains/llvm/prebuilt/linux-aarch64/bin/clang", b"c"),
                ("android-ndk-r27/ndk/ndk-build", b"#!/bin/sh\n"),
            ],
        );
        let dest = dir.path().join("ndk");
        extract(&archive, &dest, ArchiveFormat::TarGz).expect("extract");
        assert!(normalize_root(&dest, "toolchains").expect("normalize"));
        assert!(dest.join("toolchains/llvm/prebuilt/linux-aarch64/bin/clang").is_file());
        assert!(dest.join("ndk-build").is_file());
        assert!(!dest.join("android-ndk-r27").exists());
    }

    #[test]
    fn normalize_reports_missing_marker() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("a")).expect("mkdir");
        fs::write(dir.path().join("a/readme.txt"), b"x").expect("write");
        fs::write(dir.path().join("b.txt"), b"x").expect("write");
        assert!(!normalize_root(dir.path(), "aapt2").expect("normalize"));
    }

    #[cfg(unix)]
    #[test]
    fn executables_are_marked() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("bin")).expect("mkdir");
        fs::write(dir.path().join("bin/clang.real"), b"x").expect("write");
        fs::write(dir.path().join("aapt2"), b"x").expect("write");
        fs::write(dir.path().join("lib.so"), b"x").expect("write");
        let marked = mark_executables(dir.path()).expect("mark");
        assert_eq!(marked, 2);
        assert!(droidforge_core::process::is_executable(&dir.path().join("bin/clang.real")));
        assert!(!droidforge_core::process::is_executable(&dir.path().join("lib.so")));
    }

    #[test]
    fn symlink_targets_cannot_escape() {
        assert!(link_stays_inside(Path::new("bin/clang"), "clang-17"));
        assert!(link_stays_inside(Path::new("bin/clang"), "../lib/x"));
        assert!(!link_stays_inside(Path::new("bin/clang"), "../../etc"));
        assert!(!link_stays_inside(Path::new("clang"), "/usr/bin/clang"));
    }
}
