//! Incremental build state: which sources changed since the last successful
//! compile, and whether the project configuration moved underneath them.

pub mod changes;
pub mod entry;
pub mod error;
pub mod fingerprint;
pub mod incremental;
pub mod manifest;

pub use changes::ChangeSet;
pub use entry::CacheEntry;
pub use error::CacheError;
pub use fingerprint::config_fingerprint;
pub use incremental::IncrementalCache;
pub use manifest::CacheManifest;
