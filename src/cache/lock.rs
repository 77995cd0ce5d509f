//! Process-level file locks for cache publication.
//!
//! Several generator processes may share one cache root (e.g. two checkouts pointing
//! `BUCKFORGE_CACHE_DIR` at the same directory). In-process deduplication happens in
//! [`DependencyCache`](super::DependencyCache); this lock serializes publishers of the
//! same artifact across processes. Locks are per artifact name, so unrelated artifacts
//! are still copied in parallel.

use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::core::{BuildError, Result};

/// An exclusive lock on `{dir}/.locks/{name}.lock`, released on drop.
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Acquire the lock, waiting for other holders.
    ///
    /// The blocking OS lock call runs on the blocking thread pool so the async runtime
    /// keeps serving other fetches while this one waits.
    pub async fn acquire(dir: &Path, name: &str) -> Result<Self> {
        let locks_dir = dir.join(".locks");
        tokio::fs::create_dir_all(&locks_dir).await.map_err(|e| {
            BuildError::io(format!("creating lock directory {}", locks_dir.display()), e)
        })?;

        let lock_path = locks_dir.join(format!("{name}.lock"));
        let path = lock_path.clone();

        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&lock_path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(|e| BuildError::io(format!("lock task for {name} failed"), std::io::Error::other(e)))?
        .map_err(|e| BuildError::io(format!("acquiring lock {}", path.display()), e))?;

        tracing::trace!(target: "cache", "Acquired lock {}", path.display());
        Ok(Self { file, path })
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        #[allow(unstable_name_collisions)]
        if let Err(e) = self.file.unlock() {
            tracing::warn!(target: "cache", "Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}
