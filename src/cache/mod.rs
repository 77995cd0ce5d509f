//! Content-addressed dependency cache.
//!
//! Every feature manager materializes its external artifacts through a
//! [`DependencyCache`]. One cache instance owns one [`CacheCategory`], i.e. one
//! directory below the cache root, so categories never collide with each other.
//!
//! # Guarantees
//!
//! - **Dedup**: equal `(key, content hash)` pairs map to one [`CacheEntry`]
//! - **No overwrite**: a key whose bytes changed gets a hash-suffixed file name;
//!   the file written for the old bytes is left untouched
//! - **At most one copy**: concurrent requests for the same unseen artifact wait for
//!   the first one instead of copying again
//! - **Atomic publish**: files are staged under a temporary name and renamed into
//!   place, so readers only ever see complete files
//! - **Idempotent re-runs**: an identical file already on disk is reused as-is
//!
//! # Concurrency
//!
//! The entry map holds `Pending(Notify)` while a fetch is in flight and
//! `Ready(entry)` afterwards. The first caller inserts `Pending` and copies; later
//! callers subscribe to the `Notify` before releasing the map entry (a
//! `notify_waiters` call only wakes futures that already exist) and re-check once
//! woken. A failed or cancelled fetch removes its `Pending` slot and wakes waiters,
//! which then retry on their own, so a failure only affects the requesting fetch.
//!
//! Across processes, publishers of the same artifact are serialized with a
//! [`CacheLock`] named after the artifact stem.

mod category;
pub mod lock;
pub mod naming;

pub use category::{CacheCategory, DependencyCategory};
pub use lock::CacheLock;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

use crate::artifact::{ArtifactKey, ContentHash, Origin, ResolvedArtifact};
use crate::constants::RULE_FILE_NAME;
use crate::core::{BuildError, Result};
use crate::resolver::ResolveContext;
use crate::utils::fs::{ensure_dir, same_content, stage_copy};

type EntryKey = (ArtifactKey, ContentHash);

enum EntryState {
    Pending(Arc<Notify>),
    Ready(CacheEntry),
}

/// Stable reference to a cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheEntry {
    file_name: String,
    path: PathBuf,
    artifact: ResolvedArtifact,
    materialized: bool,
}

impl CacheEntry {
    /// Entry pointing at an in-workspace file that was not copied.
    fn in_place(artifact: ResolvedArtifact) -> Self {
        let file_name = artifact
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| naming::stem(&artifact));
        Self {
            file_name,
            path: artifact.source.clone(),
            artifact,
            materialized: false,
        }
    }

    pub fn artifact(&self) -> &ResolvedArtifact {
        &self.artifact
    }

    pub fn key(&self) -> &ArtifactKey {
        &self.artifact.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn rule_name(&self) -> String {
        naming::rule_name(&self.file_name)
    }

    /// `false` for project-local files referenced where they are.
    pub fn is_materialized(&self) -> bool {
        self.materialized
    }
}

/// Copy/reuse counters for one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub copies: usize,
    pub reuses: usize,
}

/// Content-addressed store for one dependency category.
pub struct DependencyCache {
    category: CacheCategory,
    root: PathBuf,
    resolve: ResolveContext,
    entries: Arc<DashMap<EntryKey, EntryState>>,
    /// File name -> hash of the content that claimed it during this run.
    names: Arc<DashMap<String, ContentHash>>,
    sealed: AtomicBool,
    copies: AtomicUsize,
    reuses: AtomicUsize,
}

impl DependencyCache {
    pub fn new(category: CacheCategory, cache_root: &Path, resolve: ResolveContext) -> Self {
        let root = cache_root.join(category.dir_name());
        Self {
            category,
            root,
            resolve,
            entries: Arc::new(DashMap::new()),
            names: Arc::new(DashMap::new()),
            sealed: AtomicBool::new(false),
            copies: AtomicUsize::new(0),
            reuses: AtomicUsize::new(0),
        }
    }

    pub fn category(&self) -> &CacheCategory {
        &self.category
    }

    /// Directory this cache writes into.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve_context(&self) -> &ResolveContext {
        &self.resolve
    }

    /// Where this category's consolidated rule file lives.
    pub fn rule_file_path(&self) -> PathBuf {
        self.root.join(RULE_FILE_NAME)
    }

    /// Return the cache entry for `artifact`, materializing it on first request.
    ///
    /// Project-local files (`Origin::Local`) are referenced in place unless `forced`
    /// is set, in which case they are copied into the cache like any other artifact.
    pub async fn get(&self, artifact: &ResolvedArtifact, forced: bool) -> Result<CacheEntry> {
        if self.is_sealed() {
            return Err(BuildError::protocol(
                format!("{} cache", self.category),
                format!("'{}' requested after finalize", artifact.key),
            ));
        }

        if artifact.origin == Origin::Local && !forced {
            tracing::trace!(target: "cache", "Using project-local {} in place", artifact.key);
            return Ok(CacheEntry::in_place(artifact.clone()));
        }

        let id: EntryKey = (artifact.key.clone(), artifact.hash.clone());

        loop {
            match self.entries.entry(id.clone()) {
                Entry::Occupied(entry) => match entry.get() {
                    EntryState::Ready(cached) => return Ok(cached.clone()),
                    EntryState::Pending(notify) => {
                        let notify = Arc::clone(notify);
                        // Subscribe before releasing the entry or the wakeup can be missed
                        let notified = notify.notified();
                        drop(entry);

                        tracing::trace!(target: "cache", "Waiting for in-flight fetch of {}", artifact.key);
                        notified.await;
                    }
                },
                Entry::Vacant(entry) => {
                    entry.insert(EntryState::Pending(Arc::new(Notify::new())));
                    break;
                }
            }
        }

        let slot = PendingSlot {
            entries: self.entries.as_ref(),
            id,
            armed: true,
        };
        let cached = self.materialize(artifact).await?;
        slot.complete(cached.clone());
        Ok(cached)
    }

    async fn materialize(&self, artifact: &ResolvedArtifact) -> Result<CacheEntry> {
        let _lock = CacheLock::acquire(&self.root, &naming::stem(artifact)).await?;

        let root = self.root.clone();
        let names = Arc::clone(&self.names);
        let category = self.category.to_string();
        let owned = artifact.clone();

        let task = tokio::task::spawn_blocking(move || publish(&root, &names, &category, &owned));
        let published = match task.await {
            Ok(result) => result?,
            Err(e) => {
                return Err(BuildError::io(
                    format!("cache publish task for {} failed", artifact.key),
                    std::io::Error::other(e),
                ));
            }
        };

        if published.copied {
            self.copies.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(target: "cache", "Cached {} as {}/{}", artifact.key, self.category, published.file_name);
        } else {
            self.reuses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(target: "cache", "Reusing {}/{} for {}", self.category, published.file_name, artifact.key);
        }

        Ok(CacheEntry {
            path: self.root.join(&published.file_name),
            file_name: published.file_name,
            artifact: artifact.clone(),
            materialized: true,
        })
    }

    /// Path of a previously returned entry. Never fails.
    pub fn get_path<'a>(&self, entry: &'a CacheEntry) -> &'a Path {
        entry.path()
    }

    /// Resolve and fetch every artifact of `category`, in declaration order.
    ///
    /// Fails without fetching anything when any coordinate is unresolvable; the
    /// error names all of them.
    pub async fn build(&self, category: &DependencyCategory) -> Result<Vec<CacheEntry>> {
        let requester = format!("configuration '{}'", category.name);
        let resolved = self.resolve.resolve_all(&category.artifacts, Some(&requester))?;

        tracing::debug!(
            target: "cache",
            "Building {} ({} artifacts) into {}",
            requester,
            resolved.len(),
            self.category
        );
        futures::future::try_join_all(resolved.iter().map(|artifact| self.get(artifact, false))).await
    }

    /// Make the cache read-only. Later [`get`](Self::get) calls are protocol violations.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Snapshot of all materialized entries, sorted by file name.
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self
            .entries
            .iter()
            .filter_map(|item| match item.value() {
                EntryState::Ready(entry) => Some(entry.clone()),
                EntryState::Pending(_) => None,
            })
            .collect();
        entries.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        entries
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries().len(),
            copies: self.copies.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
        }
    }
}

/// Owns a `Pending` slot until the fetch completes. Dropping it unfinished (error
/// or cancellation) clears the slot and wakes waiters so they can retry.
struct PendingSlot<'a> {
    entries: &'a DashMap<EntryKey, EntryState>,
    id: EntryKey,
    armed: bool,
}

impl PendingSlot<'_> {
    fn complete(mut self, entry: CacheEntry) {
        self.armed = false;
        if let Some(EntryState::Pending(notify)) =
            self.entries.insert(self.id.clone(), EntryState::Ready(entry))
        {
            notify.notify_waiters();
        }
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some((_, EntryState::Pending(notify))) =
            self.entries.remove_if(&self.id, |_, state| matches!(state, EntryState::Pending(_)))
        {
            notify.notify_waiters();
        }
    }
}

struct Published {
    file_name: String,
    copied: bool,
}

/// Claim a file name for `artifact` and make sure the file exists under it.
///
/// Runs on the blocking pool while the artifact's [`CacheLock`] is held.
fn publish(
    root: &Path,
    names: &DashMap<String, ContentHash>,
    category: &str,
    artifact: &ResolvedArtifact,
) -> Result<Published> {
    let write_failure = |path: &Path, source: std::io::Error| BuildError::CacheWriteFailure {
        category: category.to_string(),
        coordinate: artifact.key.to_string(),
        path: path.to_path_buf(),
        source,
    };

    if !artifact.source.is_file() {
        return Err(BuildError::unresolved(&artifact.key, None));
    }
    ensure_dir(root).map_err(|e| write_failure(root, e))?;

    for candidate in naming::candidates(artifact) {
        let dest = root.join(&candidate);

        match names.entry(candidate.clone()) {
            Entry::Occupied(claimed) => {
                if claimed.get() == &artifact.hash && dest.is_file() {
                    return Ok(Published {
                        file_name: candidate,
                        copied: false,
                    });
                }
            }
            Entry::Vacant(slot) => {
                let reuse = dest.exists();
                if reuse && !same_content(&artifact.source, &dest).map_err(|e| write_failure(&dest, e))? {
                    tracing::debug!(
                        target: "cache",
                        "{} already holds different bytes; disambiguating {}",
                        dest.display(),
                        artifact.key
                    );
                    continue;
                }
                // Claim, then release the map shard before touching the disk
                drop(slot.insert(artifact.hash.clone()));

                if !reuse && let Err(e) = stage_copy(&artifact.source, &dest) {
                    names.remove(&candidate);
                    return Err(write_failure(&dest, e));
                }
                return Ok(Published {
                    file_name: candidate,
                    copied: !reuse,
                });
            }
        }
    }

    Err(write_failure(
        root,
        std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("every candidate name for {} holds different content", artifact.key),
        ),
    ))
}
