//! Shared zip plumbing for APK writing and signing.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::CompressionMethod;

use crate::error::PackError;

/// Entries that must be mmap-able from the installed package.
pub fn is_stored_entry(archive_path: &str) -> bool {
    archive_path == "resources.arsc" || archive_path.ends_with(".so")
}

pub fn entry_options(archive_path: &str) -> Result<FileOptions<'static, ()>, PackError> {
    let timestamp = zip::DateTime::from_date_and_time(1980, 1, 1, 0, 0, 0).map_err(|_| {
        PackError::Zip {
            path: archive_path.to_string(),
            reason: "invalid zip timestamp".to_string(),
        }
    })?;
    let method = if is_stored_entry(archive_path) {
        CompressionMethod::Stored
    } else {
        CompressionMethod::Deflated
    };
    Ok(FileOptions::<()>::default()
        .compression_method(method)
        .last_modified_time(timestamp)
        .unix_permissions(0o644))
}

/// Regular files under `root`, sorted, as `(archive path, file)` pairs.
pub fn files_under(root: &Path) -> Result<Vec<(String, PathBuf)>, PackError> {
    let mut files = Vec::new();
    if !root.is_dir() {
        return Ok(files);
    }
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|error| PackError::Io {
            path: root.display().to_string(),
            source: std::io::Error::other(error.to_string()),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|error| PackError::Io {
                path: entry.path().display().to_string(),
                source: std::io::Error::other(error.to_string()),
            })?;
        files.push((path_to_archive_path(relative), entry.path().to_path_buf()));
    }
    files.sort_by(|left, right| left.0.cmp(&right.0));
    Ok(files)
}

pub fn path_to_archive_path(path: &Path) -> String {
    let mut components = Vec::new();
    for component in path.components() {
        components.push(component.as_os_str().to_string_lossy().into_owned());
    }
    components.join("/")
}
