use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::redirect::Policy;

use crate::error::ToolchainError;

const CHUNK_SIZE: usize = 64 * 1024;
const MAX_REDIRECTS: usize = 10;

/// Bytes written so far and the expected total, when the source announced one.
pub type ProgressFn<'a> = &'a dyn Fn(u64, Option<u64>);

/// Fetches one toolchain source into a local file.
pub trait Downloader: Send + Sync {
    fn download(
        &self,
        source: &str,
        dest: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<(), ToolchainError>;
}

/// HTTP(S) downloads through a blocking client; `file://` and absolute paths
/// are copied locally.
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, ToolchainError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .map_err(ToolchainError::Client)?;
        Ok(Self { client })
    }
}

impl Downloader for HttpDownloader {
    fn download(
        &self,
        source: &str,
        dest: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<(), ToolchainError> {
        if let Some(local) = local_source_path(source) {
            return copy_local(&local, dest, progress);
        }
        if !is_remote_url(source) {
            return Err(ToolchainError::UnsupportedSource(source.to_string()));
        }

        let mut response = self
            .client
            .get(source)
            .send()
            .map_err(|source_error| ToolchainError::Request {
                url: source.to_string(),
                source: source_error,
            })?;
        if !response.status().is_success() {
            return Err(ToolchainError::Status {
                url: source.to_string(),
                status: response.status().as_u16(),
            });
        }
        let total = response.content_length();
        write_via_part_file(dest, |file| {
            copy_with_progress(&mut response, file, total, progress)
                .map(|_| ())
                .map_err(|error| ToolchainError::io(dest, error))
        })
    }
}

pub fn is_remote_url(source: &str) -> bool {
    source.starts_with("https://") || source.starts_with("http://")
}

pub fn local_source_path(source: &str) -> Option<PathBuf> {
    if let Some(path) = source.strip_prefix("file://") {
        Some(PathBuf::from(path))
    } else if source.starts_with('/') {
        Some(PathBuf::from(source))
    } else {
        None
    }
}

/// Final path segment of a source, without query or fragment.
pub fn source_file_name(source: &str) -> Option<String> {
    let without_query = source.split(['?', '#']).next().unwrap_or(source);
    without_query
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
}

pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

fn copy_local(path: &Path, dest: &Path, progress: ProgressFn<'_>) -> Result<(), ToolchainError> {
    if !path.is_file() {
        return Err(ToolchainError::LocalSourceMissing(path.display().to_string()));
    }
    let mut input = fs::File::open(path).map_err(|error| ToolchainError::io(path, error))?;
    let total = input.metadata().ok().map(|metadata| metadata.len());
    write_via_part_file(dest, |file| {
        copy_with_progress(&mut input, file, total, progress)
            .map(|_| ())
            .map_err(|error| ToolchainError::io(path, error))
    })
}

/// Writes into `<dest>.part` and renames on success; the partial file is
/// removed on failure.
fn write_via_part_file<F>(dest: &Path, write: F) -> Result<(), ToolchainError>
where
    F: FnOnce(&mut fs::File) -> Result<(), ToolchainError>,
{
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|error| ToolchainError::io(parent, error))?;
    }
    let part = part_path(dest);
    let mut file = fs::File::create(&part).map_err(|error| ToolchainError::io(&part, error))?;
    let result = write(&mut file).and_then(|()| {
        file.flush().map_err(|error| ToolchainError::io(&part, error))
    });
    drop(file);
    if let Err(error) = result {
        let _ = fs::remove_file(&part);
        return Err(error);
    }
    fs::rename(&part, dest).map_err(|error| ToolchainError::io(dest, error))
}

fn copy_with_progress<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    total: Option<u64>,
    progress: ProgressFn<'_>,
) -> std::io::Result<u64> {
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        writer.write_all(&buffer[..read])?;
        written += read as u64;
        progress(written, total);
    }
    Ok(written)
}
