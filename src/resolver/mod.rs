//! Artifact resolvers.
//!
//! A resolver maps a coordinate to at most one file that the host build tool has
//! already downloaded. Resolvers never touch the network; the dependency cache only
//! materializes files they return.
//!
//! - [`StaticResolver`] - explicit coordinate table exported with the project model
//! - [`MavenLayoutResolver`] - local repositories in Maven layout (`~/.m2/repository`)
//! - [`ChainResolver`] - tries resolvers in order, first hit wins
//!
//! [`ResolveContext`] bundles a resolver with the hashing mode and workspace root so
//! every caller turns coordinates into [`ResolvedArtifact`]s the same way.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::artifact::{ArtifactKey, HashMode, Origin, ResolvedArtifact};
use crate::core::{BuildError, Result};

/// Looks up already-resolved files for coordinates.
pub trait ArtifactResolver: Send + Sync {
    /// Return the file for `key`, or `None` when the host produced nothing for it.
    fn resolve(&self, key: &ArtifactKey) -> Option<PathBuf>;
}

/// Explicit coordinate -> file table.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    files: HashMap<ArtifactKey, PathBuf>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: ArtifactKey, path: impl Into<PathBuf>) {
        self.files.insert(key, path.into());
    }

    pub fn with(mut self, key: ArtifactKey, path: impl Into<PathBuf>) -> Self {
        self.insert(key, path);
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl ArtifactResolver for StaticResolver {
    fn resolve(&self, key: &ArtifactKey) -> Option<PathBuf> {
        self.files.get(key).cloned()
    }
}

/// Local repository laid out as `group/as/dirs/name/version/name-version[-classifier].ext`.
#[derive(Debug, Clone)]
pub struct MavenLayoutResolver {
    root: PathBuf,
    extensions: Vec<String>,
}

impl MavenLayoutResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: vec!["jar".to_string(), "aar".to_string()],
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn candidate_dir(&self, key: &ArtifactKey) -> PathBuf {
        let mut dir = self.root.clone();
        for part in key.group().split('.') {
            dir.push(part);
        }
        dir.join(key.name()).join(key.version())
    }
}

impl ArtifactResolver for MavenLayoutResolver {
    fn resolve(&self, key: &ArtifactKey) -> Option<PathBuf> {
        let dir = self.candidate_dir(key);
        let stem = match key.classifier() {
            Some(c) => format!("{}-{}-{c}", key.name(), key.version()),
            None => format!("{}-{}", key.name(), key.version()),
        };

        self.extensions
            .iter()
            .map(|ext| dir.join(format!("{stem}.{ext}")))
            .find(|candidate| candidate.is_file())
    }
}

/// First resolver that knows the coordinate wins.
#[derive(Default, Clone)]
pub struct ChainResolver {
    resolvers: Vec<Arc<dyn ArtifactResolver>>,
}

impl ChainResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, resolver: Arc<dyn ArtifactResolver>) {
        self.resolvers.push(resolver);
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl ArtifactResolver for ChainResolver {
    fn resolve(&self, key: &ArtifactKey) -> Option<PathBuf> {
        self.resolvers.iter().find_map(|r| r.resolve(key))
    }
}

/// A resolver plus the rules for turning its answers into [`ResolvedArtifact`]s.
#[derive(Clone)]
pub struct ResolveContext {
    resolver: Arc<dyn ArtifactResolver>,
    hash_mode: HashMode,
    workspace: PathBuf,
}

impl ResolveContext {
    pub fn new(resolver: Arc<dyn ArtifactResolver>, hash_mode: HashMode, workspace: impl Into<PathBuf>) -> Self {
        Self {
            resolver,
            hash_mode,
            workspace: workspace.into(),
        }
    }

    pub fn hash_mode(&self) -> HashMode {
        self.hash_mode
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Resolve `key` to a concrete artifact.
    ///
    /// Fails with [`BuildError::UnresolvedDependency`] naming `requested_by` when the
    /// resolver has no file for the key or the file it returned does not exist.
    pub fn resolve(&self, key: &ArtifactKey, requested_by: Option<&str>) -> Result<ResolvedArtifact> {
        let Some(path) = self.resolver.resolve(key) else {
            tracing::debug!(target: "resolver", "No file for {}", key);
            return Err(BuildError::unresolved(key, requested_by));
        };

        let path = if path.is_absolute() { path } else { self.workspace.join(path) };
        let origin = if path.starts_with(&self.workspace) { Origin::Local } else { Origin::External };

        ResolvedArtifact::resolve(key.clone(), path, self.hash_mode, origin).map_err(|e| match e {
            BuildError::UnresolvedDependency { coordinate, .. } => BuildError::UnresolvedDependency {
                coordinate,
                requested_by: requested_by.map(str::to_string),
            },
            other => other,
        })
    }

    /// Resolve every key, failing with one error that names all unresolvable keys.
    pub fn resolve_all(&self, keys: &[ArtifactKey], requested_by: Option<&str>) -> Result<Vec<ResolvedArtifact>> {
        let mut resolved = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();

        for key in keys {
            match self.resolve(key, requested_by) {
                Ok(artifact) => resolved.push(artifact),
                Err(BuildError::UnresolvedDependency { coordinate, .. }) => missing.push(coordinate),
                Err(other) => return Err(other),
            }
        }

        if !missing.is_empty() {
            return Err(BuildError::UnresolvedDependency {
                coordinate: missing.join(", "),
                requested_by: requested_by.map(str::to_string),
            });
        }
        Ok(resolved)
    }
}
