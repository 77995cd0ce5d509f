//! Memoized scope resolution.
//!
//! Resolution is keyed by `(module, kind)`. The map only ever holds a
//! `tokio::sync::OnceCell` per key: the first caller initializes it, concurrent
//! callers wait on the same cell, and a failed resolution leaves the cell empty so
//! the next caller tries again. There is no invalidation; the host graph is
//! immutable for the pass.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::OnceCell;

use super::{DependencyEdge, Scope, ScopeKind};
use crate::artifact::{ArtifactKey, ResolvedArtifact};
use crate::core::{BuildError, Result};
use crate::graph::{DeclaredDependency, HostGraph, ModuleId};
use crate::resolver::ResolveContext;

type ScopeSlot = Arc<OnceCell<Arc<Scope>>>;

/// Shared, memoizing scope resolver.
pub struct TargetCache {
    graph: Arc<dyn HostGraph>,
    resolve: ResolveContext,
    scopes: DashMap<(ModuleId, ScopeKind), ScopeSlot>,
    resolutions: Arc<AtomicUsize>,
}

impl TargetCache {
    pub fn new(graph: Arc<dyn HostGraph>, resolve: ResolveContext) -> Self {
        Self {
            graph,
            resolve,
            scopes: DashMap::new(),
            resolutions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn graph(&self) -> &Arc<dyn HostGraph> {
        &self.graph
    }

    /// Return the scope for `(module, kind)`, resolving it on first access.
    ///
    /// A module without a source set of this kind yields an empty scope. Fails with
    /// [`BuildError::UnknownModule`] for modules the graph does not know and with
    /// [`BuildError::UnresolvedDependency`] naming every coordinate the resolver
    /// could not bind to a file.
    pub async fn get_scope(&self, module: &ModuleId, kind: &ScopeKind) -> Result<Arc<Scope>> {
        // Clone the slot out so no map shard lock is held across the await
        let slot: ScopeSlot = self
            .scopes
            .entry((module.clone(), kind.clone()))
            .or_default()
            .clone();

        let scope = slot
            .get_or_try_init(|| {
                let graph = Arc::clone(&self.graph);
                let resolve = self.resolve.clone();
                let resolutions = Arc::clone(&self.resolutions);
                let module = module.clone();
                let kind = kind.clone();

                async move {
                    let task = tokio::task::spawn_blocking(move || {
                        resolutions.fetch_add(1, Ordering::Relaxed);
                        resolve_scope(graph.as_ref(), &resolve, &module, &kind).map(Arc::new)
                    });
                    match task.await {
                        Ok(result) => result,
                        Err(e) => Err(BuildError::io(
                            "scope resolution task failed",
                            std::io::Error::other(e),
                        )),
                    }
                }
            })
            .await?;

        Ok(Arc::clone(scope))
    }

    /// Scopes resolved so far, without triggering resolution.
    pub fn resolved(&self) -> Vec<Arc<Scope>> {
        let mut scopes: Vec<Arc<Scope>> =
            self.scopes.iter().filter_map(|slot| slot.value().get().cloned()).collect();
        scopes.sort_by(|a, b| (&a.module, &a.kind).cmp(&(&b.module, &b.kind)));
        scopes
    }

    /// How many times full resolution ran (failed attempts included).
    pub fn resolution_count(&self) -> usize {
        self.resolutions.load(Ordering::Relaxed)
    }
}

fn resolve_scope(
    graph: &dyn HostGraph,
    resolve: &ResolveContext,
    module: &ModuleId,
    kind: &ScopeKind,
) -> Result<Scope> {
    let snapshot = graph.module(module).ok_or_else(|| BuildError::UnknownModule {
        module: module.to_string(),
        requested_by: "the generation pass".to_string(),
    })?;

    let mut scope = Scope::empty(module.clone(), kind.clone(), snapshot.path.clone());
    let Some(set) = snapshot.source_set(kind) else {
        tracing::debug!(target: "scope", "{} has no {} source set", module, kind);
        return Ok(scope);
    };

    let requester = scope.requester();
    let mut missing = Vec::new();

    scope.compile = resolve_edges(graph, resolve, &set.compile, &requester, &mut missing)?;
    scope.runtime = resolve_edges(graph, resolve, &set.runtime, &requester, &mut missing)?;
    scope.annotation_processors =
        resolve_keys(resolve, &set.annotation_processors, &requester, &mut missing)?;
    scope.transforms = resolve_keys(resolve, &set.transforms, &requester, &mut missing)?;

    if !missing.is_empty() {
        tracing::debug!(target: "scope", "{}: {} unresolved coordinates", requester, missing.len());
        return Err(BuildError::UnresolvedDependency {
            coordinate: missing.join(", "),
            requested_by: Some(requester),
        });
    }

    scope.source_roots = set
        .source_roots
        .iter()
        .map(|root| snapshot.path.join(root))
        .collect();
    scope.compiler_options = set.compiler_options.clone();
    scope.runtimes = set.runtimes.clone();
    scope.lint = set.lint.clone();
    scope.robolectric = set.robolectric;

    tracing::debug!(
        target: "scope",
        "Resolved {}: {} compile, {} runtime, {} processors",
        requester,
        scope.compile.len(),
        scope.runtime.len(),
        scope.annotation_processors.len()
    );
    Ok(scope)
}

/// Resolve declared edges in order, collapsing exact duplicates.
fn resolve_edges(
    graph: &dyn HostGraph,
    resolve: &ResolveContext,
    declared: &[DeclaredDependency],
    requester: &str,
    missing: &mut Vec<String>,
) -> Result<Vec<DependencyEdge>> {
    let mut seen = HashSet::new();
    let mut edges = Vec::with_capacity(declared.len());

    for dep in declared {
        if !seen.insert(dep) {
            continue;
        }
        match dep {
            DeclaredDependency::Module(id) => {
                if graph.module(id).is_none() {
                    return Err(BuildError::UnknownModule {
                        module: id.to_string(),
                        requested_by: requester.to_string(),
                    });
                }
                edges.push(DependencyEdge::Module(id.clone()));
            }
            DeclaredDependency::External(key) => {
                if let Some(artifact) = resolve_one(resolve, key, requester, missing)? {
                    edges.push(DependencyEdge::External(artifact));
                }
            }
        }
    }
    Ok(edges)
}

fn resolve_keys(
    resolve: &ResolveContext,
    keys: &[ArtifactKey],
    requester: &str,
    missing: &mut Vec<String>,
) -> Result<Vec<ResolvedArtifact>> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(keys.len());
    for key in keys {
        if seen.insert(key)
            && let Some(artifact) = resolve_one(resolve, key, requester, missing)?
        {
            resolved.push(artifact);
        }
    }
    Ok(resolved)
}

fn resolve_one(
    resolve: &ResolveContext,
    key: &ArtifactKey,
    requester: &str,
    missing: &mut Vec<String>,
) -> Result<Option<ResolvedArtifact>> {
    match resolve.resolve(key, Some(requester)) {
        Ok(artifact) => Ok(Some(artifact)),
        Err(BuildError::UnresolvedDependency { coordinate, .. }) => {
            if !missing.contains(&coordinate) {
                missing.push(coordinate);
            }
            Ok(None)
        }
        Err(other) => Err(other),
    }
}
