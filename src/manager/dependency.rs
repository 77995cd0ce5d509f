//! General external dependencies.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use super::{FeatureManager, FinalizeReport, Ledger, abandon, finish, prebuilt_rules, target_label};
use crate::artifact::{ArtifactKey, Origin, ResolvedArtifact};
use crate::cache::{CacheCategory, DependencyCache};
use crate::core::{Diagnostic, ErrorCategory, Result};
use crate::rules::RuleFile;
use crate::scope::Scope;
use crate::version::ConflictPolicy;

/// Collects every external compile/runtime edge and caches one version of each.
///
/// Project-local jars are left where they are. Coordinates listed in `forced` are
/// always copied into the cache and pin their logical dependency to that version.
pub struct DependencyManager {
    cache: Arc<DependencyCache>,
    ledger: Ledger<ResolvedArtifact>,
    policy: ConflictPolicy,
    forced: Vec<ArtifactKey>,
    targets: OnceLock<BTreeMap<ArtifactKey, String>>,
}

impl DependencyManager {
    pub fn new(cache: Arc<DependencyCache>, policy: ConflictPolicy, forced: Vec<ArtifactKey>) -> Self {
        Self {
            cache,
            ledger: Ledger::new("dependency manager"),
            policy,
            forced,
            targets: OnceLock::new(),
        }
    }

    /// Label of the cached rule serving `key` after finalize.
    ///
    /// Every requested version maps to the rule of the version that was selected.
    pub fn target_for(&self, key: &ArtifactKey) -> Option<&str> {
        self.targets.get()?.get(key).map(String::as_str)
    }
}

#[async_trait]
impl FeatureManager for DependencyManager {
    fn name(&self) -> &str {
        "dependencies"
    }

    fn category(&self) -> CacheCategory {
        CacheCategory::External
    }

    async fn register(&self, scope: &Scope) -> Result<()> {
        self.ledger.ensure_open(&scope.requester()).await?;

        let requester = scope.requester();
        for artifact in scope.external_artifacts().filter(|a| a.origin == Origin::External) {
            self.ledger
                .record(&artifact.key.logical_id(), artifact.key.version(), &requester, artifact.clone())
                .await?;
        }
        Ok(())
    }

    async fn finalize(&self) -> Result<FinalizeReport> {
        let mut requirements = self.ledger.close().await?;
        let mut diagnostics = Vec::new();
        let mut requested: Vec<(ArtifactKey, String)> = Vec::new();

        let result: Result<Vec<_>> = async {
            let pinned = self
                .cache
                .resolve_context()
                .resolve_all(&self.forced, Some("forced dependencies"))?;

            let mut fetches = Vec::new();
            for artifact in &pinned {
                let logical_id = artifact.key.logical_id();
                if let Some(versions) = requirements.take(&logical_id) {
                    for (version, requests) in versions {
                        if version != artifact.key.version() {
                            diagnostics.push(Diagnostic::new(
                                ErrorCategory::VersionConflict,
                                Some(logical_id.clone()),
                                format!(
                                    "{version} requested by {} replaced by forced {}",
                                    requests.requesters.iter().cloned().collect::<Vec<_>>().join(", "),
                                    artifact.key.version()
                                ),
                            ));
                        }
                        requested.push((requests.payload.key.clone(), logical_id.clone()));
                    }
                }
                fetches.push((artifact.clone(), true));
            }

            let (selected, merge_diagnostics) = requirements.select(self.policy)?;
            diagnostics.extend(merge_diagnostics);
            for (_, _, requests) in requirements.all() {
                requested.push((requests.payload.key.clone(), requests.payload.key.logical_id()));
            }
            for choice in selected {
                fetches.push((choice.payload, false));
            }

            futures::future::try_join_all(
                fetches.iter().map(|(artifact, forced)| self.cache.get(artifact, *forced)),
            )
            .await
        }
        .await;

        let entries = match result {
            Ok(entries) => entries,
            Err(e) => return Err(abandon(self.name(), &self.cache, e)),
        };

        let by_logical_id: BTreeMap<String, String> = entries
            .iter()
            .map(|entry| (entry.key().logical_id(), target_label(&self.cache, entry)))
            .collect();
        let mut targets: BTreeMap<ArtifactKey, String> = requested
            .into_iter()
            .filter_map(|(key, logical_id)| by_logical_id.get(&logical_id).map(|t| (key, t.clone())))
            .collect();
        for entry in &entries {
            targets.insert(entry.key().clone(), target_label(&self.cache, entry));
        }
        // close() already rejected a second finalize, so the cell is unset here
        let _ = self.targets.set(targets);

        let mut rules = RuleFile::new();
        for rule in prebuilt_rules(&entries) {
            rules.push(rule);
        }
        finish(self.name(), &self.cache, rules, entries, diagnostics)
    }
}
