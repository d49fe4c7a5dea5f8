//! On-disk table of tracked files, one JSON document per project.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::fingerprint::sha256_hex;

pub const MANIFEST_VERSION: u32 = 1;
const INCREMENTAL_DIR: &str = "incremental";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    pub version: u32,
    pub project: String,
    /// Configuration fingerprint the entries were recorded under.
    pub fingerprint: Option<String>,
    /// Keyed by absolute file path.
    pub entries: BTreeMap<String, CacheEntry>,
}

impl CacheManifest {
    pub fn new(project: &str) -> Self {
        Self {
            version: MANIFEST_VERSION,
            project: project.to_string(),
            fingerprint: None,
            entries: BTreeMap::new(),
        }
    }

    /// Missing, unreadable, corrupt or foreign manifests all read as `None`.
    pub fn load(path: &Path, project: &str) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        let manifest: CacheManifest = serde_json::from_str(&content).ok()?;
        if manifest.version != MANIFEST_VERSION || manifest.project != project {
            return None;
        }
        Some(manifest)
    }

    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|error| CacheError::Serialization {
            reason: error.to_string(),
        })?;
        std::fs::write(path, json).map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// `<intermediates>/incremental/<sha256(project path)>.json`
pub fn manifest_path(intermediates_dir: &Path, project_dir: &Path) -> PathBuf {
    let key = sha256_hex(project_dir.to_string_lossy().as_bytes());
    intermediates_dir
        .join(INCREMENTAL_DIR)
        .join(format!("{}.json", key))
}
