use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

/// Last observed state of one tracked file. Identity is size plus mtime;
/// contents are never hashed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub path: String,
    pub size: u64,
    pub modified_ms: u64,
}

impl CacheEntry {
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|duration| duration.as_millis() as u64)
            .unwrap_or(0);
        Ok(Self {
            path: path.to_string_lossy().into_owned(),
            size: metadata.len(),
            modified_ms,
        })
    }

    pub fn token(&self) -> String {
        format!("{}:{}:{}", self.path, self.size, self.modified_ms)
    }
}
