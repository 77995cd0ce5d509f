//! Read-only view of the host build graph.
//!
//! The host tool exports one immutable snapshot per generation pass. Everything in
//! this module is plain data: [`TargetCache`](crate::scope::TargetCache) turns it
//! into resolved [`Scope`](crate::scope::Scope)s, and nothing here ever changes
//! after loading.

mod model;

pub use model::ProjectModel;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::artifact::ArtifactKey;
use crate::core::{BuildError, Result};
use crate::scope::ScopeKind;

/// Supplies module snapshots. Must return the same data for the whole pass.
pub trait HostGraph: Send + Sync {
    /// Every module, in a stable order.
    fn modules(&self) -> Vec<ModuleId>;

    fn module(&self, id: &ModuleId) -> Option<Arc<ModuleSnapshot>>;
}

/// Host path of a module, e.g. `:app` or `:libs:network`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(path: &str) -> Result<Self> {
        let invalid = |reason: &str| BuildError::InvalidCoordinate {
            input: path.to_string(),
            reason: reason.to_string(),
        };

        let Some(rest) = path.strip_prefix(':') else {
            return Err(invalid("module paths start with ':'"));
        };
        if !rest.is_empty()
            && rest.split(':').any(|seg| seg.is_empty() || seg.chars().any(char::is_whitespace))
        {
            return Err(invalid("module path segments must be non-empty and contain no whitespace"));
        }
        Ok(Self(path.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ModuleId {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ModuleId {
    type Error = BuildError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<ModuleId> for String {
    fn from(id: ModuleId) -> Self {
        id.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// JVM languages that need a runtime library next to the generated rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Kotlin,
    Scala,
    Groovy,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Kotlin, Language::Scala, Language::Groovy];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kotlin => "kotlin",
            Self::Scala => "scala",
            Self::Groovy => "groovy",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared dependency edge, as written in the host build.
///
/// Serialized as a plain string: module references start with `:`, everything else
/// must be a coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeclaredDependency {
    External(ArtifactKey),
    Module(ModuleId),
}

impl FromStr for DeclaredDependency {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with(':') {
            ModuleId::new(s).map(Self::Module)
        } else {
            s.parse().map(Self::External)
        }
    }
}

impl TryFrom<String> for DeclaredDependency {
    type Error = BuildError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DeclaredDependency> for String {
    fn from(dep: DeclaredDependency) -> Self {
        dep.to_string()
    }
}

impl fmt::Display for DeclaredDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::External(key) => key.fmt(f),
            Self::Module(id) => id.fmt(f),
        }
    }
}

/// A scope's request for lint; `version: None` defers to configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LintRequest {
    pub version: Option<String>,
}

/// Raw data of one source set as exported by the host tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSet {
    pub source_roots: Vec<PathBuf>,
    pub compile: Vec<DeclaredDependency>,
    pub runtime: Vec<DeclaredDependency>,
    pub annotation_processors: Vec<ArtifactKey>,
    pub compiler_options: Vec<String>,
    /// Language runtime versions requested by this source set.
    pub runtimes: BTreeMap<Language, String>,
    pub lint: Option<LintRequest>,
    pub transforms: Vec<ArtifactKey>,
    pub robolectric: bool,
}

/// Immutable snapshot of one host module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSnapshot {
    pub id: ModuleId,
    /// Module directory relative to the workspace root.
    #[serde(default)]
    pub path: PathBuf,
    #[serde(default)]
    pub source_sets: BTreeMap<ScopeKind, SourceSet>,
}

impl ModuleSnapshot {
    pub fn new(id: ModuleId, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            path: path.into(),
            source_sets: BTreeMap::new(),
        }
    }

    pub fn with_source_set(mut self, kind: ScopeKind, source_set: SourceSet) -> Self {
        self.source_sets.insert(kind, source_set);
        self
    }

    pub fn source_set(&self, kind: &ScopeKind) -> Option<&SourceSet> {
        self.source_sets.get(kind)
    }
}
