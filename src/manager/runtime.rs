//! Language runtimes (Kotlin, Scala, Groovy).

use async_trait::async_trait;
use std::sync::{Arc, OnceLock};

use super::{FeatureManager, FinalizeReport, Ledger, abandon, bundle_rule, finish, prebuilt_rules};
use crate::cache::{CacheCategory, DependencyCache, DependencyCategory};
use crate::config::RuntimeConfig;
use crate::core::Result;
use crate::graph::Language;
use crate::rules::RuleFile;
use crate::scope::Scope;

/// One instance per language. Mixing incompatible runtime versions in one build is
/// unsafe, so the default policy fails fast on a major-version split.
pub struct RuntimeManager {
    language: Language,
    name: String,
    cache: Arc<DependencyCache>,
    ledger: Ledger<()>,
    config: RuntimeConfig,
    version: OnceLock<String>,
}

impl RuntimeManager {
    pub fn new(language: Language, cache: Arc<DependencyCache>, config: RuntimeConfig) -> Self {
        Self {
            language,
            name: format!("{language}-runtime"),
            cache,
            ledger: Ledger::new(format!("{language} runtime manager")),
            config,
            version: OnceLock::new(),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Runtime version in use, once finalized and needed.
    pub fn selected_version(&self) -> Option<&str> {
        self.version.get().map(String::as_str)
    }
}

#[async_trait]
impl FeatureManager for RuntimeManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> CacheCategory {
        CacheCategory::Runtime(self.language)
    }

    async fn register(&self, scope: &Scope) -> Result<()> {
        let requester = scope.requester();
        match scope.runtimes.get(&self.language) {
            Some(version) => self.ledger.record(self.language.as_str(), version, &requester, ()).await,
            None => self.ledger.ensure_open(&requester).await,
        }
    }

    async fn finalize(&self) -> Result<FinalizeReport> {
        let requirements = self.ledger.close().await?;
        if requirements.is_empty() {
            return finish(&self.name, &self.cache, RuleFile::new(), Vec::new(), Vec::new());
        }

        let result: Result<_> = async {
            let (version, diagnostics) =
                requirements.select_pinned(self.config.conflict_policy, self.config.version.as_deref())?;
            let Some(version) = version else {
                return Ok((None, Vec::new(), diagnostics));
            };
            let artifacts = self
                .config
                .artifacts
                .iter()
                .map(|module| module.at(&version))
                .collect::<Result<Vec<_>>>()?;
            let category = DependencyCategory::new(format!("{} runtime", self.language), artifacts);
            let entries = self.cache.build(&category).await?;
            Ok((Some(version), entries, diagnostics))
        }
        .await;

        let (version, entries, diagnostics) = match result {
            Ok(done) => done,
            Err(e) => return Err(abandon(self.name(), &self.cache, e)),
        };

        let mut rules = RuleFile::new();
        if let Some(version) = version {
            tracing::info!(target: "manager", "{} runtime {}", self.language, version);
            for rule in prebuilt_rules(&entries) {
                rules.push(rule);
            }
            rules.push(bundle_rule(&self.name, &entries));
            let _ = self.version.set(version);
        }
        finish(&self.name, &self.cache, rules, entries, diagnostics)
    }
}
