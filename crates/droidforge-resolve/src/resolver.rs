use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use droidforge_core::config::ForgeConfig;
use droidforge_core::{CancellationToken, Dependency};

use crate::aar::{self, AarContents};
use crate::error::ResolveError;
use crate::fetch::{Fetcher, HttpFetcher};

const AAR_UNPACK_DIR: &str = "aar";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolverOptions {
    pub repositories: Vec<String>,
    pub cache_dir: PathBuf,
    pub workers: usize,
    /// How long the caller waits on each outstanding coordinate.
    pub timeout: Duration,
}

impl ResolverOptions {
    pub fn from_config(config: &ForgeConfig) -> Self {
        Self {
            repositories: config.resolver.repositories.clone(),
            cache_dir: config.resolver_cache_dir(),
            workers: config.resolver.workers.max(1),
            timeout: config.resolver.timeout(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Already resolved earlier in this run.
    Run,
    /// Found in the on-disk dependency cache.
    Disk,
    /// Downloaded from the named repository.
    Remote(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub dependency: Dependency,
    /// Jar to place on the compile classpath; resource-only bundles have none.
    pub classes_jar: Option<PathBuf>,
    pub native_dir: Option<PathBuf>,
    pub origin: Origin,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolveEvent {
    Resolved { coordinate: String, origin: Origin },
    Failed { coordinate: String, reason: String },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolveReport {
    pub resolved: Vec<ResolvedArtifact>,
    pub failures: Vec<(Dependency, String)>,
}

impl ResolveReport {
    pub fn classpath(&self) -> Vec<PathBuf> {
        self.resolved
            .iter()
            .filter_map(|artifact| artifact.classes_jar.clone())
            .collect()
    }

    pub fn native_dirs(&self) -> Vec<PathBuf> {
        self.resolved
            .iter()
            .filter_map(|artifact| artifact.native_dir.clone())
            .collect()
    }
}

type JobResult = Result<ResolvedArtifact, String>;

struct Job {
    dependency: Dependency,
    reply: Sender<JobResult>,
}

/// Resolves flat coordinate lists against an ordered repository list.
///
/// The run map and the failed set live for the resolver's lifetime, so a
/// second `resolve_all` within one build never touches the network for a
/// coordinate it has already settled.
pub struct DependencyResolver {
    options: Arc<ResolverOptions>,
    fetcher: Arc<dyn Fetcher>,
    resolved: Arc<Mutex<HashMap<Dependency, ResolvedArtifact>>>,
    failed: Arc<Mutex<HashSet<Dependency>>>,
}

impl DependencyResolver {
    pub fn new(options: ResolverOptions, user_agent: &str, max_redirects: usize) -> Result<Self, ResolveError> {
        let fetcher = HttpFetcher::new(user_agent, options.timeout, max_redirects)?;
        Ok(Self::with_fetcher(options, Arc::new(fetcher)))
    }

    pub fn with_fetcher(options: ResolverOptions, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            options: Arc::new(options),
            fetcher,
            resolved: Arc::new(Mutex::new(HashMap::new())),
            failed: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolves every coordinate it can. Individual failures and timeouts are
    /// reported through `on_event` and the report; the batch itself never
    /// fails.
    pub fn resolve_all(
        &self,
        dependencies: &[Dependency],
        cancel: &CancellationToken,
        on_event: &dyn Fn(ResolveEvent),
    ) -> ResolveReport {
        let mut report = ResolveReport::default();
        let mut unique: Vec<Dependency> = Vec::new();
        for dependency in dependencies {
            if !unique.contains(dependency) {
                unique.push(dependency.clone());
            }
        }

        let mut pending = Vec::new();
        for dependency in unique {
            let known = lock(&self.resolved).get(&dependency).cloned();
            if let Some(mut artifact) = known {
                artifact.origin = Origin::Run;
                emit_resolved(on_event, &artifact);
                report.resolved.push(artifact);
                continue;
            }
            if lock(&self.failed).contains(&dependency) {
                let reason = "already failed earlier in this build".to_string();
                on_event(ResolveEvent::Failed {
                    coordinate: dependency.coordinate(),
                    reason: reason.clone(),
                });
                report.failures.push((dependency, reason));
                continue;
            }
            if let Some(artifact) = from_disk_cache(&self.options.cache_dir, &dependency) {
                lock(&self.resolved).insert(dependency.clone(), artifact.clone());
                emit_resolved(on_event, &artifact);
                report.resolved.push(artifact);
                continue;
            }
            pending.push(dependency);
        }

        if pending.is_empty() {
            return report;
        }
        info!(count = pending.len(), "fetching dependencies");

        let queue: Arc<Mutex<VecDeque<Job>>> = Arc::new(Mutex::new(VecDeque::new()));
        let mut waiting = Vec::with_capacity(pending.len());
        for dependency in pending {
            let (reply, receiver) = mpsc::channel();
            lock(&queue).push_back(Job {
                dependency: dependency.clone(),
                reply,
            });
            waiting.push((dependency, receiver));
        }
        let workers = self.options.workers.max(1).min(waiting.len());
        for _ in 0..workers {
            self.spawn_worker(Arc::clone(&queue), cancel.clone());
        }

        for (dependency, receiver) in waiting {
            let outcome = if cancel.is_cancelled() {
                Err("cancelled".to_string())
            } else {
                match receiver.recv_timeout(self.options.timeout) {
                    Ok(outcome) => outcome,
                    Err(RecvTimeoutError::Timeout) => {
                        // the worker may still be writing this coordinate; a
                        // later pass must not queue it again
                        lock(&self.failed).insert(dependency.clone());
                        Err(format!("timed out after {}s", self.options.timeout.as_secs()))
                    }
                    Err(RecvTimeoutError::Disconnected) => Err("worker stopped".to_string()),
                }
            };
            match outcome {
                Ok(artifact) => {
                    emit_resolved(on_event, &artifact);
                    report.resolved.push(artifact);
                }
                Err(reason) => {
                    warn!(coordinate = %dependency, %reason, "dependency not resolved");
                    on_event(ResolveEvent::Failed {
                        coordinate: dependency.coordinate(),
                        reason: reason.clone(),
                    });
                    report.failures.push((dependency, reason));
                }
            }
        }
        report
    }

    fn spawn_worker(&self, queue: Arc<Mutex<VecDeque<Job>>>, cancel: CancellationToken) {
        let options = Arc::clone(&self.options);
        let fetcher = Arc::clone(&self.fetcher);
        let resolved = Arc::clone(&self.resolved);
        let failed = Arc::clone(&self.failed);
        thread::spawn(move || loop {
            let job = match lock(&queue).pop_front() {
                Some(job) => job,
                None => break,
            };
            if cancel.is_cancelled() {
                let _ = job.reply.send(Err("cancelled".to_string()));
                continue;
            }
            let outcome = fetch_one(&options, fetcher.as_ref(), &job.dependency);
            match &outcome {
                Ok(artifact) => {
                    lock(&resolved).insert(job.dependency.clone(), artifact.clone());
                }
                Err(_) => {
                    lock(&failed).insert(job.dependency.clone());
                }
            }
            // the caller may have given up waiting
            let _ = job.reply.send(outcome);
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn emit_resolved(on_event: &dyn Fn(ResolveEvent), artifact: &ResolvedArtifact) {
    on_event(ResolveEvent::Resolved {
        coordinate: artifact.dependency.coordinate(),
        origin: artifact.origin.clone(),
    });
}

fn aar_unpack_dir(cache_dir: &Path, dependency: &Dependency) -> PathBuf {
    let jar = cache_dir.join(dependency.cache_relative_path("aar"));
    jar.parent()
        .map(|parent| parent.join(AAR_UNPACK_DIR))
        .unwrap_or_else(|| cache_dir.join(AAR_UNPACK_DIR))
}

fn non_empty_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|metadata| metadata.is_file() && metadata.len() > 0)
        .unwrap_or(false)
}

fn from_disk_cache(cache_dir: &Path, dependency: &Dependency) -> Option<ResolvedArtifact> {
    let jar = cache_dir.join(dependency.cache_relative_path("jar"));
    if non_empty_file(&jar) {
        return Some(ResolvedArtifact {
            dependency: dependency.clone(),
            classes_jar: Some(jar),
            native_dir: None,
            origin: Origin::Disk,
        });
    }
    let bundle = cache_dir.join(dependency.cache_relative_path("aar"));
    if !non_empty_file(&bundle) {
        return None;
    }
    let unpack_dir = aar_unpack_dir(cache_dir, dependency);
    let contents = if unpack_dir.is_dir() {
        aar::unpacked_contents(&unpack_dir)
    } else {
        aar::unpack_aar(&bundle, &unpack_dir).ok()?
    };
    Some(artifact_from_aar(dependency, contents, Origin::Disk))
}

fn artifact_from_aar(dependency: &Dependency, contents: AarContents, origin: Origin) -> ResolvedArtifact {
    ResolvedArtifact {
        dependency: dependency.clone(),
        classes_jar: contents.classes_jar,
        native_dir: contents.native_dir,
        origin,
    }
}

/// Tries each repository in order, `.jar` before `.aar`; any failure falls
/// through to the next candidate.
fn fetch_one(
    options: &ResolverOptions,
    fetcher: &dyn Fetcher,
    dependency: &Dependency,
) -> Result<ResolvedArtifact, String> {
    let mut reasons = Vec::new();
    for repository in &options.repositories {
        let base = repository.trim_end_matches('/');
        for extension in ["jar", "aar"] {
            let url = format!("{}/{}", base, dependency.remote_path(extension));
            let bytes = match fetcher.fetch(&url) {
                Ok(bytes) => bytes,
                Err(error) => {
                    debug!(%url, %error, "candidate unavailable");
                    reasons.push(error.to_string());
                    continue;
                }
            };
            let target = options.cache_dir.join(dependency.cache_relative_path(extension));
            if let Err(error) = write_atomically(&target, &bytes) {
                reasons.push(error.to_string());
                continue;
            }
            let origin = Origin::Remote(repository.clone());
            if extension == "jar" {
                return Ok(ResolvedArtifact {
                    dependency: dependency.clone(),
                    classes_jar: Some(target),
                    native_dir: None,
                    origin,
                });
            }
            let unpack_dir = aar_unpack_dir(&options.cache_dir, dependency);
            match aar::unpack_aar(&target, &unpack_dir) {
                Ok(contents) => return Ok(artifact_from_aar(dependency, contents, origin)),
                Err(error) => {
                    let _ = fs::remove_file(&target);
                    let _ = fs::remove_dir_all(&unpack_dir);
                    reasons.push(error.to_string());
                }
            }
        }
    }
    if reasons.is_empty() {
        return Err("no repositories configured".to_string());
    }
    Err(format!("not found in any repository ({})", reasons.join("; ")))
}

fn write_atomically(target: &Path, bytes: &[u8]) -> Result<(), ResolveError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|error| ResolveError::io(parent, error))?;
    }
    let mut part_name = target
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    part_name.push(".part");
    let part = target.with_file_name(part_name);
    fs::write(&part, bytes).map_err(|error| ResolveError::io(&part, error))?;
    fs::rename(&part, target).map_err(|error| ResolveError::io(target, error))
}
