//! User-defined extra dependency caches.

use async_trait::async_trait;
use std::sync::Arc;

use super::{FeatureManager, FinalizeReport, Ledger, abandon, finish, prebuilt_rules};
use crate::artifact::ArtifactKey;
use crate::cache::{CacheCategory, DependencyCache, DependencyCategory};
use crate::core::Result;
use crate::rules::RuleFile;
use crate::scope::Scope;

/// A named set of coordinates from `[extra_dep_caches]`, fetched as a whole.
pub struct ExtraCacheManager {
    name: String,
    cache: Arc<DependencyCache>,
    ledger: Ledger<()>,
    artifacts: Vec<ArtifactKey>,
}

impl ExtraCacheManager {
    pub fn new(name: &str, cache: Arc<DependencyCache>, artifacts: Vec<ArtifactKey>) -> Self {
        Self {
            name: format!("extra-{name}"),
            cache,
            ledger: Ledger::new(format!("extra cache '{name}'")),
            artifacts,
        }
    }
}

#[async_trait]
impl FeatureManager for ExtraCacheManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> CacheCategory {
        self.cache.category().clone()
    }

    async fn register(&self, scope: &Scope) -> Result<()> {
        self.ledger.ensure_open(&scope.requester()).await
    }

    async fn finalize(&self) -> Result<FinalizeReport> {
        self.ledger.close().await?;

        let category = DependencyCategory::new(self.name.clone(), self.artifacts.clone());
        let entries = match self.cache.build(&category).await {
            Ok(entries) => entries,
            Err(e) => return Err(abandon(self.name(), &self.cache, e)),
        };

        let mut rules = RuleFile::new();
        for rule in prebuilt_rules(&entries) {
            rules.push(rule);
        }
        finish(&self.name, &self.cache, rules, entries, Vec::new())
    }
}
