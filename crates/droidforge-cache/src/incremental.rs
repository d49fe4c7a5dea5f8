use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};
use walkdir::WalkDir;

use droidforge_core::ProjectConfig;

use crate::changes::ChangeSet;
use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::manifest::{manifest_path, CacheManifest};

struct CacheState {
    current: CacheManifest,
    persisted: CacheManifest,
}

/// Per-project table of tracked source files, shared by the tasks of one
/// build. Analysis updates the working table at once; `persist` and
/// `rollback` settle it against disk.
pub struct IncrementalCache {
    path: PathBuf,
    state: Mutex<CacheState>,
}

impl IncrementalCache {
    pub fn open(project: &ProjectConfig) -> Self {
        let layout = project.layout();
        let path = manifest_path(&layout.intermediates_dir, project.project_dir());
        Self::open_at(path, &project.project_dir().to_string_lossy())
    }

    pub fn open_at(path: PathBuf, project_key: &str) -> Self {
        let persisted = CacheManifest::load(&path, project_key).unwrap_or_else(|| {
            debug!(path = %path.display(), "no usable incremental manifest; starting empty");
            CacheManifest::new(project_key)
        });
        Self {
            path,
            state: Mutex::new(CacheState {
                current: persisted.clone(),
                persisted,
            }),
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // a panicked holder leaves only a stale table behind
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Walks `source_root` for files with one of `extensions` and classifies
    /// them. Known paths under the root with a matching extension that the
    /// walk did not see are reported deleted and dropped.
    pub fn analyze_changes(
        &self,
        source_root: &Path,
        extensions: &[&str],
    ) -> Result<ChangeSet, CacheError> {
        let mut changes = ChangeSet::default();
        let mut seen = BTreeSet::new();
        let mut state = self.lock();

        if source_root.is_dir() {
            for entry in WalkDir::new(source_root).follow_links(false).sort_by_file_name() {
                let entry = entry.map_err(|error| CacheError::Walk {
                    path: source_root.to_path_buf(),
                    reason: error.to_string(),
                })?;
                if !entry.file_type().is_file() || !has_extension(entry.path(), extensions) {
                    continue;
                }
                let observed = CacheEntry::from_path(entry.path()).map_err(|source| {
                    CacheError::Io {
                        path: entry.path().to_path_buf(),
                        source,
                    }
                })?;
                let key = observed.path.clone();
                match state.current.entries.get(&key) {
                    None => changes.added.push(entry.path().to_path_buf()),
                    Some(known) if known.token() != observed.token() => {
                        changes.modified.push(entry.path().to_path_buf())
                    }
                    Some(_) => changes.unchanged.push(entry.path().to_path_buf()),
                }
                seen.insert(key.clone());
                state.current.entries.insert(key, observed);
            }
        }

        let deleted: Vec<String> = state
            .current
            .entries
            .keys()
            .filter(|key| {
                let path = Path::new(key.as_str());
                path.starts_with(source_root)
                    && has_extension(path, extensions)
                    && !seen.contains(*key)
            })
            .cloned()
            .collect();
        for key in deleted {
            state.current.entries.remove(&key);
            changes.deleted.push(PathBuf::from(key));
        }

        debug!(
            root = %source_root.display(),
            added = changes.added.len(),
            modified = changes.modified.len(),
            deleted = changes.deleted.len(),
            unchanged = changes.unchanged.len(),
            "analyzed sources"
        );
        Ok(changes)
    }

    /// Compares `fingerprint` with the recorded one. On mismatch every entry
    /// is dropped and the new fingerprint recorded; returns whether that
    /// happened.
    pub fn config_changed(&self, fingerprint: &str) -> bool {
        let mut state = self.lock();
        if state.current.fingerprint.as_deref() == Some(fingerprint) {
            return false;
        }
        info!(
            previous = state.current.fingerprint.as_deref().unwrap_or("none"),
            "configuration changed; invalidating incremental state"
        );
        state.current.entries.clear();
        state.current.fingerprint = Some(fingerprint.to_string());
        true
    }

    /// Drops entries outside `roots` or pointing at files that no longer
    /// exist. Returns how many were removed.
    pub fn sweep(&self, roots: &[PathBuf]) -> usize {
        let mut state = self.lock();
        let before = state.current.entries.len();
        state.current.entries.retain(|key, _| {
            let path = Path::new(key.as_str());
            roots.iter().any(|root| path.starts_with(root)) && path.is_file()
        });
        before - state.current.entries.len()
    }

    pub fn invalidate_all(&self) {
        self.lock().current.entries.clear();
    }

    pub fn entry_count(&self) -> usize {
        self.lock().current.entries.len()
    }

    pub fn fingerprint(&self) -> Option<String> {
        self.lock().current.fingerprint.clone()
    }

    /// Writes the working table to disk; it becomes the rollback point.
    pub fn persist(&self) -> Result<(), CacheError> {
        let mut state = self.lock();
        state.current.save(&self.path)?;
        state.persisted = state.current.clone();
        debug!(entries = state.persisted.entries.len(), "incremental state persisted");
        Ok(())
    }

    /// Restores the working table to the last persisted state.
    pub fn rollback(&self) {
        let mut state = self.lock();
        state.current = state.persisted.clone();
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => extensions
            .iter()
            .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext)),
        None => false,
    }
}
