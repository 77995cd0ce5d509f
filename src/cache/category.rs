//! Dependency categories and their disjoint cache namespaces.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::artifact::ArtifactKey;
use crate::graph::Language;

/// Which sub-namespace of the cache root a [`DependencyCache`](super::DependencyCache) owns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheCategory {
    External,
    Processor,
    Lint,
    Runtime(Language),
    Transform,
    Robolectric,
    /// Jars of build tools invoked by path, e.g. ProGuard.
    Tool,
    /// User-defined cache from `[extra_dep_caches]`.
    Extra(String),
}

impl CacheCategory {
    /// Directory below the cache root, e.g. `processor` or `extra/proto`.
    pub fn dir_name(&self) -> String {
        match self {
            Self::External => "external".to_string(),
            Self::Processor => "processor".to_string(),
            Self::Lint => "lint".to_string(),
            Self::Runtime(language) => language.as_str().to_string(),
            Self::Transform => "transform".to_string(),
            Self::Robolectric => "robolectric".to_string(),
            Self::Tool => "tool".to_string(),
            Self::Extra(name) => format!("extra/{name}"),
        }
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir_name())
    }
}

/// A named configuration whose artifacts are resolved as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyCategory {
    pub name: String,
    pub artifacts: Vec<ArtifactKey>,
}

impl DependencyCategory {
    pub fn new(name: impl Into<String>, artifacts: Vec<ArtifactKey>) -> Self {
        Self {
            name: name.into(),
            artifacts,
        }
    }
}
