//! Finalization coordinator.
//!
//! Drives one generation pass through explicit phases:
//!
//! ```text
//! Uninitialized --begin_generation--> Accumulating --end_generation--> Finalizing --> Finalized
//!                                      visit_module / visit_all
//! ```
//!
//! During accumulation modules may be visited in any order and concurrently; every
//! visit resolves the module's scopes through the shared [`TargetCache`] and hands
//! them to every manager's `register`. The phase lives in a `tokio::sync::RwLock`:
//! visits hold the read side for their whole duration and `end_generation` takes
//! the write side, so finalize cannot start while a visit is still registering.
//!
//! Finalize runs once per manager. The coordinator tracks each manager's
//! [`ManagerLifecycle`] itself instead of trusting call order, and runs managers
//! concurrently since their cache categories are disjoint.

mod state;

pub use state::{GenerationState, ManagerLifecycle, StateFile};

use chrono::Utc;
use dashmap::DashSet;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::cache::{CacheCategory, DependencyCache};
use crate::config::GenConfig;
use crate::constants::{GEN_DIR, STATE_FILE};
use crate::core::{BuildError, Diagnostic, Result};
use crate::graph::{HostGraph, Language, ModuleId, ProjectModel};
use crate::manager::{
    AnnotationProcessorCache, DependencyManager, ExtraCacheManager, FeatureManager, FinalizeReport,
    LintManager, RuntimeManager, TestFrameworkManager, ToolManager, TransformManager,
};
use crate::resolver::{ArtifactResolver, ChainResolver, MavenLayoutResolver, ResolveContext};
use crate::scope::TargetCache;
use crate::utils::fs::{ensure_dir, remove_dir_all};
use crate::utils::resolve_against;

/// Outcome of a completed generation pass.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub modules_visited: usize,
    pub scopes_resolved: usize,
    pub reports: Vec<FinalizeReport>,
}

impl GenerationReport {
    /// Diagnostics of every manager, in manager order.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.reports.iter().flat_map(|r| r.diagnostics.iter())
    }

    pub fn rule_files(&self) -> impl Iterator<Item = &Path> {
        self.reports.iter().filter_map(|r| r.rule_file.as_deref())
    }
}

pub struct Coordinator {
    workspace: PathBuf,
    cache_root: PathBuf,
    max_parallel: usize,
    targets: Arc<TargetCache>,
    dependencies: Arc<DependencyManager>,
    processors: Arc<AnnotationProcessorCache>,
    lint: Arc<LintManager>,
    tools: Arc<ToolManager>,
    managers: Vec<Arc<dyn FeatureManager>>,
    state: RwLock<GenerationState>,
    lifecycles: Mutex<BTreeMap<String, ManagerLifecycle>>,
    visited: DashSet<ModuleId>,
}

impl Coordinator {
    /// Construct caches and managers. The pass starts `Uninitialized`.
    pub fn new(
        workspace: &Path,
        config: &GenConfig,
        graph: Arc<dyn HostGraph>,
        resolver: Arc<dyn ArtifactResolver>,
    ) -> Self {
        let resolve = ResolveContext::new(resolver, config.hash_mode, workspace);
        let cache_root = config.cache_root(workspace);
        let cache = |category: CacheCategory| Arc::new(DependencyCache::new(category, &cache_root, resolve.clone()));

        let dependencies = Arc::new(DependencyManager::new(
            cache(CacheCategory::External),
            config.external.conflict_policy,
            config.forced.clone(),
        ));
        let processors = Arc::new(AnnotationProcessorCache::new(
            cache(CacheCategory::Processor),
            config.processors.conflict_policy,
        ));
        let lint = Arc::new(LintManager::new(cache(CacheCategory::Lint), config.lint.clone()));
        let tools = Arc::new(ToolManager::new(cache(CacheCategory::Tool), config.tools.clone()));

        let mut managers: Vec<Arc<dyn FeatureManager>> = vec![
            dependencies.clone() as Arc<dyn FeatureManager>,
            processors.clone() as Arc<dyn FeatureManager>,
            lint.clone() as Arc<dyn FeatureManager>,
        ];
        for language in Language::ALL {
            managers.push(Arc::new(RuntimeManager::new(
                language,
                cache(CacheCategory::Runtime(language)),
                config.runtime(language).clone(),
            )));
        }
        managers.push(Arc::new(TransformManager::new(cache(CacheCategory::Transform), config.transform.clone())));
        managers.push(Arc::new(TestFrameworkManager::new(cache(CacheCategory::Robolectric), config.test.clone())));
        managers.push(tools.clone() as Arc<dyn FeatureManager>);
        for (name, artifacts) in &config.extra_dep_caches {
            managers.push(Arc::new(ExtraCacheManager::new(
                name,
                cache(CacheCategory::Extra(name.clone())),
                artifacts.clone(),
            )));
        }

        let lifecycles = managers
            .iter()
            .map(|m| (m.name().to_string(), ManagerLifecycle::Accumulating))
            .collect();

        Self {
            workspace: workspace.to_path_buf(),
            cache_root,
            max_parallel: config.max_parallel.max(1),
            targets: Arc::new(TargetCache::new(graph, resolve)),
            dependencies,
            processors,
            lint,
            tools,
            managers,
            state: RwLock::new(GenerationState::Uninitialized),
            lifecycles: Mutex::new(lifecycles),
            visited: DashSet::new(),
        }
    }

    /// Coordinator over an exported project model. The model's artifact table is
    /// consulted first, then the configured local repositories in order.
    pub fn from_model(workspace: &Path, config: &GenConfig, model: ProjectModel) -> Self {
        let mut chain = ChainResolver::new();
        chain.push(Arc::new(model.resolver()));
        for repository in &config.repositories {
            chain.push(Arc::new(MavenLayoutResolver::new(resolve_against(workspace, repository))));
        }
        Self::new(workspace, config, Arc::new(model), Arc::new(chain))
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn target_cache(&self) -> &Arc<TargetCache> {
        &self.targets
    }

    pub fn dependency_manager(&self) -> &DependencyManager {
        &self.dependencies
    }

    pub fn processor_cache(&self) -> &AnnotationProcessorCache {
        &self.processors
    }

    pub fn lint_manager(&self) -> &LintManager {
        &self.lint
    }

    pub fn tool_manager(&self) -> &ToolManager {
        &self.tools
    }

    pub fn managers(&self) -> &[Arc<dyn FeatureManager>] {
        &self.managers
    }

    pub async fn state(&self) -> GenerationState {
        *self.state.read().await
    }

    pub async fn manager_lifecycles(&self) -> BTreeMap<String, ManagerLifecycle> {
        self.lifecycles.lock().await.clone()
    }

    /// Enter the accumulation phase. Clears the per-generation scratch directory.
    pub async fn begin_generation(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if *state != GenerationState::Uninitialized {
            return Err(BuildError::protocol(
                "coordinator",
                format!("begin_generation called while {}", *state),
            ));
        }

        let gen_dir = self.workspace.join(GEN_DIR);
        remove_dir_all(&gen_dir)
            .and_then(|()| ensure_dir(&gen_dir))
            .map_err(|e| BuildError::io(format!("resetting {}", gen_dir.display()), e))?;
        ensure_dir(&self.cache_root)
            .map_err(|e| BuildError::io(format!("creating cache root {}", self.cache_root.display()), e))?;

        *state = GenerationState::Accumulating;
        tracing::info!(
            target: "coordinator",
            "Generation started ({} managers, cache {})",
            self.managers.len(),
            self.cache_root.display()
        );
        Ok(())
    }

    /// Resolve every scope of `module` and register it with every manager.
    ///
    /// Nothing is registered unless all of the module's scopes resolve, so a
    /// failed visit leaves no trace in the finalized output.
    pub async fn visit_module(&self, module: &ModuleId) -> Result<()> {
        let state = self.state.read().await;
        if *state != GenerationState::Accumulating {
            return Err(BuildError::protocol(
                "coordinator",
                format!("module {module} visited while {}", *state),
            ));
        }

        let snapshot = self.targets.graph().module(module).ok_or_else(|| BuildError::UnknownModule {
            module: module.to_string(),
            requested_by: "the generation driver".to_string(),
        })?;

        // A module registers all of its scopes or none of them
        let mut scopes = Vec::with_capacity(snapshot.source_sets.len());
        for kind in snapshot.source_sets.keys() {
            scopes.push(self.targets.get_scope(module, kind).await?);
        }
        for scope in &scopes {
            futures::future::try_join_all(self.managers.iter().map(|m| m.register(scope))).await?;
        }

        self.visited.insert(module.clone());
        tracing::debug!(target: "coordinator", "Visited {} ({} scopes)", module, snapshot.source_sets.len());
        drop(state);
        Ok(())
    }

    /// Visit every module of the graph, at most `max_parallel` at a time.
    pub async fn visit_all(&self) -> Result<usize> {
        let modules = self.targets.graph().modules();
        let count = modules.len();

        stream::iter(modules)
            .map(|module| async move { self.visit_module(&module).await })
            .buffer_unordered(self.max_parallel)
            .try_collect::<Vec<()>>()
            .await?;

        tracing::info!(target: "coordinator", "Visited {} modules", count);
        Ok(count)
    }

    /// Close accumulation and finalize every manager exactly once.
    ///
    /// Waits for in-flight visits. On success the state file is written; on
    /// failure the pass still ends `Finalized` and later calls are rejected.
    pub async fn end_generation(&self) -> Result<GenerationReport> {
        let mut state = self.state.write().await;
        match *state {
            GenerationState::Accumulating => {}
            GenerationState::Finalizing | GenerationState::Finalized => {
                return Err(BuildError::protocol("coordinator", "end_generation called more than once"));
            }
            GenerationState::Uninitialized => {
                return Err(BuildError::protocol("coordinator", "end_generation called before begin_generation"));
            }
        }
        *state = GenerationState::Finalizing;
        tracing::info!(target: "coordinator", "Finalizing {} managers", self.managers.len());

        let results = futures::future::join_all(self.managers.iter().map(|m| self.finalize_manager(m))).await;
        *state = GenerationState::Finalized;
        drop(state);

        let mut reports = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(target: "coordinator", "{}", e);
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let report = GenerationReport {
            modules_visited: self.visited.len(),
            scopes_resolved: self.targets.resolution_count(),
            reports,
        };
        self.write_state_file(&report)?;
        Ok(report)
    }

    async fn finalize_manager(&self, manager: &Arc<dyn FeatureManager>) -> Result<FinalizeReport> {
        {
            let mut lifecycles = self.lifecycles.lock().await;
            let lifecycle = lifecycles
                .entry(manager.name().to_string())
                .or_insert(ManagerLifecycle::Accumulating);
            if *lifecycle != ManagerLifecycle::Accumulating {
                return Err(BuildError::protocol(
                    manager.name(),
                    format!("finalize requested while {lifecycle:?}"),
                ));
            }
            // Claim the finalize before running it so a racing caller cannot repeat it
            *lifecycle = ManagerLifecycle::Finalized;
        }

        let result = manager.finalize().await;
        if result.is_err() {
            self.lifecycles
                .lock()
                .await
                .insert(manager.name().to_string(), ManagerLifecycle::Failed);
        }
        result
    }

    fn write_state_file(&self, report: &GenerationReport) -> Result<()> {
        let categories = report
            .reports
            .iter()
            .map(|r| (r.category.to_string(), r.entries.iter().filter(|e| e.is_materialized()).count()))
            .collect();
        let rule_files = report
            .rule_files()
            .map(|p| p.strip_prefix(&self.workspace).unwrap_or(p).to_path_buf())
            .collect();

        StateFile {
            generated_at: Utc::now(),
            buckforge_version: env!("CARGO_PKG_VERSION").to_string(),
            modules: report.modules_visited,
            rule_files,
            categories,
        }
        .write(&self.workspace.join(STATE_FILE))
    }

    /// `begin_generation`, `visit_all`, `end_generation`.
    pub async fn run(&self) -> Result<GenerationReport> {
        self.begin_generation().await?;
        self.visit_all().await?;
        self.end_generation().await
    }
}
