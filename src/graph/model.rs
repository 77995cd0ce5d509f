//! JSON project model exported by the host tool.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{HostGraph, ModuleId, ModuleSnapshot};
use crate::artifact::ArtifactKey;
use crate::core::{BuildError, Result};
use crate::resolver::StaticResolver;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawModel {
    #[serde(default)]
    modules: Vec<ModuleSnapshot>,
    #[serde(default)]
    artifacts: BTreeMap<ArtifactKey, PathBuf>,
}

/// Module snapshots plus the coordinate -> file table the host resolved.
///
/// ```json
/// {
///   "modules": [
///     { "id": ":app", "path": "app",
///       "source_sets": { "main": { "compile": ["com.google.guava:guava:19.0"] } } }
///   ],
///   "artifacts": { "com.google.guava:guava:19.0": "/home/me/.gradle/caches/guava-19.0.jar" }
/// }
/// ```
#[derive(Debug, Default, Clone)]
pub struct ProjectModel {
    modules: BTreeMap<ModuleId, Arc<ModuleSnapshot>>,
    artifacts: BTreeMap<ArtifactKey, PathBuf>,
}

impl ProjectModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a model file. Relative artifact paths are taken relative to the file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BuildError::io(format!("reading project model {}", path.display()), e))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&content, base).map_err(|e| match e {
            BuildError::Model { reason, .. } => BuildError::Model {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse model JSON, resolving relative artifact paths against `base`.
    pub fn parse(content: &str, base: &Path) -> Result<Self> {
        let raw: RawModel = serde_json::from_str(content).map_err(|e| BuildError::Model {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;

        let mut model = Self::new();
        for module in raw.modules {
            if model.modules.contains_key(&module.id) {
                return Err(BuildError::Model {
                    path: PathBuf::new(),
                    reason: format!("module '{}' is declared more than once", module.id),
                });
            }
            model.modules.insert(module.id.clone(), Arc::new(module));
        }
        for (key, file) in raw.artifacts {
            let file = if file.is_absolute() { file } else { base.join(file) };
            model.artifacts.insert(key, file);
        }

        tracing::debug!(
            "Loaded project model: {} modules, {} artifacts",
            model.modules.len(),
            model.artifacts.len()
        );
        Ok(model)
    }

    pub fn with_module(mut self, module: ModuleSnapshot) -> Self {
        self.modules.insert(module.id.clone(), Arc::new(module));
        self
    }

    pub fn with_artifact(mut self, key: ArtifactKey, path: impl Into<PathBuf>) -> Self {
        self.artifacts.insert(key, path.into());
        self
    }

    pub fn artifacts(&self) -> &BTreeMap<ArtifactKey, PathBuf> {
        &self.artifacts
    }

    /// The artifact table as a resolver.
    pub fn resolver(&self) -> StaticResolver {
        self.artifacts
            .iter()
            .fold(StaticResolver::new(), |resolver, (key, path)| resolver.with(key.clone(), path.clone()))
    }
}

impl HostGraph for ProjectModel {
    fn modules(&self) -> Vec<ModuleId> {
        self.modules.keys().cloned().collect()
    }

    fn module(&self, id: &ModuleId) -> Option<Arc<ModuleSnapshot>> {
        self.modules.get(id).cloned()
    }
}
