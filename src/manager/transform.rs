//! Bytecode transforms.

use async_trait::async_trait;
use std::sync::Arc;

use super::{FeatureManager, FinalizeReport, Ledger, abandon, bundle_rule, finish, prebuilt_rules};
use crate::artifact::ResolvedArtifact;
use crate::cache::{CacheCategory, DependencyCache};
use crate::config::TransformConfig;
use crate::core::{Diagnostic, ErrorCategory, Result};
use crate::rules::RuleFile;
use crate::scope::Scope;

/// Transform runner classpath: configured dependencies plus transform jars declared
/// by scopes. Configured coordinates pin their logical dependency.
pub struct TransformManager {
    cache: Arc<DependencyCache>,
    ledger: Ledger<ResolvedArtifact>,
    config: TransformConfig,
}

impl TransformManager {
    pub fn new(cache: Arc<DependencyCache>, config: TransformConfig) -> Self {
        Self {
            cache,
            ledger: Ledger::new("transform manager"),
            config,
        }
    }
}

#[async_trait]
impl FeatureManager for TransformManager {
    fn name(&self) -> &str {
        "transforms"
    }

    fn category(&self) -> CacheCategory {
        CacheCategory::Transform
    }

    async fn register(&self, scope: &Scope) -> Result<()> {
        let requester = scope.requester();
        self.ledger.ensure_open(&requester).await?;
        for transform in &scope.transforms {
            self.ledger
                .record(&transform.key.logical_id(), transform.key.version(), &requester, transform.clone())
                .await?;
        }
        Ok(())
    }

    async fn finalize(&self) -> Result<FinalizeReport> {
        let mut requirements = self.ledger.close().await?;
        if !self.config.enabled {
            if !requirements.is_empty() {
                tracing::debug!(target: "manager", "transforms disabled; ignoring {} requests", requirements.len());
            }
            return finish(self.name(), &self.cache, RuleFile::new(), Vec::new(), Vec::new());
        }

        let result: Result<_> = async {
            let configured = self
                .cache
                .resolve_context()
                .resolve_all(&self.config.dependencies, Some("transform configuration"))?;

            let mut diagnostics = Vec::new();
            for artifact in &configured {
                let Some(versions) = requirements.take(&artifact.key.logical_id()) else {
                    continue;
                };
                for version in versions.keys().filter(|v| v.as_str() != artifact.key.version()) {
                    diagnostics.push(Diagnostic::new(
                        ErrorCategory::VersionConflict,
                        Some(artifact.key.logical_id()),
                        format!("{version} replaced by configured {}", artifact.key.version()),
                    ));
                }
            }

            let (selected, merge_diagnostics) = requirements.select(self.config.conflict_policy)?;
            diagnostics.extend(merge_diagnostics);

            let artifacts: Vec<ResolvedArtifact> =
                configured.into_iter().chain(selected.into_iter().map(|s| s.payload)).collect();
            let entries =
                futures::future::try_join_all(artifacts.iter().map(|a| self.cache.get(a, true))).await?;
            Ok((entries, diagnostics))
        }
        .await;

        let (entries, diagnostics) = match result {
            Ok(done) => done,
            Err(e) => return Err(abandon(self.name(), &self.cache, e)),
        };

        let mut rules = RuleFile::new();
        if !entries.is_empty() {
            for rule in prebuilt_rules(&entries) {
                rules.push(rule);
            }
            rules.push(bundle_rule("transform-classpath", &entries));
        }
        finish(self.name(), &self.cache, rules, entries, diagnostics)
    }
}
