//! Concrete files produced by the host resolver.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

use super::ArtifactKey;
use crate::core::{BuildError, Result};
use crate::utils::fs::file_sha256;

/// How a [`ContentHash`] is derived for resolved artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashMode {
    /// SHA-256 over the file bytes.
    #[default]
    Content,
    /// SHA-256 over the coordinate string. Stable, but blind to upstream re-publishes.
    Coordinate,
}

/// Lowercase hex SHA-256 identifying the content of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of_file(path: &Path) -> std::io::Result<Self> {
        file_sha256(path).map(Self)
    }

    pub fn of_coordinate(key: &ArtifactKey) -> Self {
        let digest = Sha256::digest(key.to_string().as_bytes());
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 hex characters, used to disambiguate cache file names.
    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}

/// Where a resolved file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    /// Produced by the host resolver from an external repository.
    External,
    /// Lives inside the workspace (e.g. a jar checked into a module's `libs/`).
    Local,
}

/// A coordinate together with the concrete file the host resolver produced for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResolvedArtifact {
    pub key: ArtifactKey,
    pub source: PathBuf,
    pub hash: ContentHash,
    pub origin: Origin,
}

impl ResolvedArtifact {
    /// Bind `key` to `source`, hashing according to `mode`.
    ///
    /// A missing or unreadable backing file is reported as an unresolved dependency:
    /// the resolver claimed a file that does not exist.
    pub fn resolve(key: ArtifactKey, source: PathBuf, mode: HashMode, origin: Origin) -> Result<Self> {
        if !source.is_file() {
            tracing::debug!(target: "cache", "{} resolved to missing file {}", key, source.display());
            return Err(BuildError::unresolved(&key, None));
        }

        let hash = match mode {
            HashMode::Content => ContentHash::of_file(&source).map_err(|e| {
                BuildError::io(format!("hashing {} for {key}", source.display()), e)
            })?,
            HashMode::Coordinate => ContentHash::of_coordinate(&key),
        };

        Ok(Self {
            key,
            source,
            hash,
            origin,
        })
    }

    /// File extension of the backing file, defaulting to `jar`.
    pub fn extension(&self) -> &str {
        self.source.extension().and_then(|e| e.to_str()).unwrap_or("jar")
    }
}
