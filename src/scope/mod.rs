//! Resolved per-module scopes and their memoizing cache.
//!
//! A [`Scope`] is the resolved view of one module's source set for one compilation
//! purpose: every external edge bound to a concrete file, every module edge checked
//! against the graph, declaration order preserved. [`TargetCache`] computes each
//! `(module, kind)` scope at most once per generation pass and hands every caller the
//! same `Arc<Scope>`.

mod target_cache;

pub use target_cache::TargetCache;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::artifact::ResolvedArtifact;
use crate::graph::{Language, LintRequest, ModuleId};

/// Compilation purpose of a scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScopeKind {
    Main,
    Test,
    /// Any other source set the host declares (`androidTest`, `benchmark`, ...).
    Custom(String),
}

impl ScopeKind {
    pub fn custom(name: &str) -> Self {
        Self::from(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Main => "main",
            Self::Test => "test",
            Self::Custom(name) => name,
        }
    }

    pub fn is_test(&self) -> bool {
        match self {
            Self::Main => false,
            Self::Test => true,
            Self::Custom(name) => name.ends_with("Test") || name.ends_with("test"),
        }
    }
}

impl From<String> for ScopeKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "main" => Self::Main,
            "test" => Self::Test,
            _ => Self::Custom(value),
        }
    }
}

impl From<ScopeKind> for String {
    fn from(kind: ScopeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencyEdge {
    External(ResolvedArtifact),
    Module(ModuleId),
}

impl DependencyEdge {
    pub fn as_external(&self) -> Option<&ResolvedArtifact> {
        match self {
            Self::External(artifact) => Some(artifact),
            Self::Module(_) => None,
        }
    }
}

/// Resolved view of one module's sources and dependencies for one [`ScopeKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub module: ModuleId,
    pub kind: ScopeKind,
    pub module_path: PathBuf,
    pub source_roots: Vec<PathBuf>,
    /// Compile classpath in declaration order.
    pub compile: Vec<DependencyEdge>,
    pub runtime: Vec<DependencyEdge>,
    pub annotation_processors: Vec<ResolvedArtifact>,
    pub compiler_options: Vec<String>,
    pub runtimes: BTreeMap<Language, String>,
    pub lint: Option<LintRequest>,
    pub transforms: Vec<ResolvedArtifact>,
    pub robolectric: bool,
}

impl Scope {
    /// Scope with no sources and no dependencies.
    pub fn empty(module: ModuleId, kind: ScopeKind, module_path: PathBuf) -> Self {
        Self {
            module,
            kind,
            module_path,
            source_roots: Vec::new(),
            compile: Vec::new(),
            runtime: Vec::new(),
            annotation_processors: Vec::new(),
            compiler_options: Vec::new(),
            runtimes: BTreeMap::new(),
            lint: None,
            transforms: Vec::new(),
            robolectric: false,
        }
    }

    /// Label used when reporting who asked for something, e.g. `:app (test)`.
    pub fn requester(&self) -> String {
        format!("{} ({})", self.module, self.kind)
    }

    /// External artifacts on the compile then runtime classpath.
    pub fn external_artifacts(&self) -> impl Iterator<Item = &ResolvedArtifact> {
        self.compile
            .iter()
            .chain(self.runtime.iter())
            .filter_map(DependencyEdge::as_external)
    }

    pub fn is_empty(&self) -> bool {
        self.source_roots.is_empty()
            && self.compile.is_empty()
            && self.runtime.is_empty()
            && self.annotation_processors.is_empty()
            && self.transforms.is_empty()
            && self.runtimes.is_empty()
            && self.lint.is_none()
            && !self.robolectric
    }
}
