//! Temporary workspace fixture.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::artifact::ArtifactKey;
use crate::constants::{CONFIG_FILE_NAME, DEFAULT_CACHE_DIR};
use crate::graph::{DeclaredDependency, ModuleId, ModuleSnapshot, ProjectModel, SourceSet};
use crate::scope::ScopeKind;

/// Service file listing annotation processor classes inside a jar.
pub const PROCESSOR_SERVICE: &str = "META-INF/services/javax.annotation.processing.Processor";

/// A workspace directory next to a fake artifact repository.
///
/// The repository lives outside the workspace, so artifacts published there
/// resolve as external; [`publish_local`](Self::publish_local) places files
/// inside the workspace instead.
pub struct TestWorkspace {
    _temp: TempDir,
    workspace: PathBuf,
    repo: PathBuf,
    modules: BTreeMap<ModuleId, ModuleSnapshot>,
    artifacts: BTreeMap<ArtifactKey, PathBuf>,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let workspace = temp.path().join("workspace");
        let repo = temp.path().join("repo");
        std::fs::create_dir_all(&workspace)?;
        std::fs::create_dir_all(&repo)?;

        Ok(Self {
            _temp: temp,
            workspace,
            repo,
            modules: BTreeMap::new(),
            artifacts: BTreeMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.workspace
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    pub fn cache_root(&self) -> PathBuf {
        self.workspace.join(DEFAULT_CACHE_DIR)
    }

    /// Write `content` as the repository file for `coordinate` and add it to the
    /// artifact table. Publishing again replaces the bytes in place, which is
    /// how an upstream re-publish without a version bump looks.
    pub fn publish(&mut self, coordinate: &str, content: &[u8]) -> Result<PathBuf> {
        let key: ArtifactKey = coordinate.parse()?;
        let path = self.repo.join(format!("{}.{}-{}.jar", key.group(), key.name(), key.version()));
        std::fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
        self.artifacts.insert(key, path.clone());
        Ok(path)
    }

    /// Publish a processor jar whose service file lists `classes`.
    pub fn publish_processor(&mut self, coordinate: &str, classes: &[&str]) -> Result<PathBuf> {
        let path = self.publish(coordinate, b"")?;
        let file = std::fs::File::create(&path)?;
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file(PROCESSOR_SERVICE, zip::write::SimpleFileOptions::default())?;
        for class in classes {
            writeln!(zip, "{class}")?;
        }
        zip.finish()?;
        Ok(path)
    }

    /// Place a file at `relative` inside the workspace and map `coordinate` to it.
    pub fn publish_local(&mut self, relative: &str, coordinate: &str, content: &[u8]) -> Result<PathBuf> {
        let key: ArtifactKey = coordinate.parse()?;
        let path = self.workspace.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        self.artifacts.insert(key, path.clone());
        Ok(path)
    }

    /// Declare a coordinate the resolver knows but whose file does not exist.
    pub fn publish_missing(&mut self, coordinate: &str) -> Result<()> {
        let key: ArtifactKey = coordinate.parse()?;
        let path = self.repo.join(format!("missing-{}.jar", key.name()));
        self.artifacts.insert(key, path);
        Ok(())
    }

    /// Add or replace one source set of a module, creating the module on first use.
    pub fn source_set(&mut self, module: &str, kind: ScopeKind, source_set: SourceSet) -> &mut Self {
        let id = ModuleId::new(module).unwrap_or_else(|e| panic!("bad module id {module}: {e}"));
        let dir = module.trim_start_matches(':').replace(':', "/");
        self.modules
            .entry(id.clone())
            .or_insert_with(|| ModuleSnapshot::new(id, dir))
            .source_sets
            .insert(kind, source_set);
        self
    }

    /// Shorthand for a source set with only compile dependencies.
    pub fn depends(&mut self, module: &str, kind: ScopeKind, compile: &[&str]) -> &mut Self {
        let compile = compile
            .iter()
            .map(|dep| dep.parse::<DeclaredDependency>().unwrap_or_else(|e| panic!("bad dependency {dep}: {e}")))
            .collect();
        self.source_set(module, kind, SourceSet { compile, ..SourceSet::default() })
    }

    pub fn model(&self) -> ProjectModel {
        let model = self
            .modules
            .values()
            .fold(ProjectModel::new(), |model, module| model.with_module(module.clone()));
        self.artifacts
            .iter()
            .fold(model, |model, (key, path)| model.with_artifact(key.clone(), path.clone()))
    }

    /// Serialize the model as JSON into the workspace and return its path.
    pub fn write_model(&self, file_name: &str) -> Result<PathBuf> {
        let json = serde_json::json!({
            "modules": self.modules.values().collect::<Vec<_>>(),
            "artifacts": self.artifacts,
        });
        let path = self.workspace.join(file_name);
        std::fs::write(&path, serde_json::to_vec_pretty(&json)?)?;
        Ok(path)
    }

    pub fn write_config(&self, content: &str) -> Result<PathBuf> {
        let path = self.workspace.join(CONFIG_FILE_NAME);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Read a workspace-relative file.
    pub fn read(&self, relative: &str) -> Result<String> {
        let path = self.workspace.join(relative);
        std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))
    }
}
