use std::path::PathBuf;

/// Errors from reading or writing incremental state. Loading never surfaces
/// these; a bad manifest is a cache miss.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cache serialization error: {reason}")]
    Serialization { reason: String },

    #[error("failed to walk '{path}': {reason}")]
    Walk { path: PathBuf, reason: String },
}
