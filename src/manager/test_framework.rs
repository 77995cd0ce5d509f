//! Robolectric runtimes for JVM unit tests.

use async_trait::async_trait;
use std::sync::Arc;

use super::{FeatureManager, FinalizeReport, Ledger, abandon, finish, prebuilt_rules};
use crate::cache::{CacheCategory, DependencyCache, DependencyCategory};
use crate::config::TestConfig;
use crate::core::Result;
use crate::rules::RuleFile;
use crate::scope::Scope;

const ROBOLECTRIC_ID: &str = "robolectric";

/// Fetches every configured `android-all` jar when any scope runs Robolectric.
///
/// SDK levels are distinct runtimes rather than competing versions, so nothing is
/// merged: all configured jars are kept.
pub struct TestFrameworkManager {
    cache: Arc<DependencyCache>,
    ledger: Ledger<()>,
    config: TestConfig,
}

impl TestFrameworkManager {
    pub fn new(cache: Arc<DependencyCache>, config: TestConfig) -> Self {
        Self {
            cache,
            ledger: Ledger::new("test framework manager"),
            config,
        }
    }
}

#[async_trait]
impl FeatureManager for TestFrameworkManager {
    fn name(&self) -> &str {
        "robolectric"
    }

    fn category(&self) -> CacheCategory {
        CacheCategory::Robolectric
    }

    async fn register(&self, scope: &Scope) -> Result<()> {
        let requester = scope.requester();
        if scope.robolectric {
            self.ledger.record(ROBOLECTRIC_ID, "*", &requester, ()).await
        } else {
            self.ledger.ensure_open(&requester).await
        }
    }

    async fn finalize(&self) -> Result<FinalizeReport> {
        let requirements = self.ledger.close().await?;
        if requirements.is_empty() && !self.config.robolectric {
            return finish(self.name(), &self.cache, RuleFile::new(), Vec::new(), Vec::new());
        }

        let category = DependencyCategory::new("robolectric runtimes", self.config.android_all.clone());
        let entries = match self.cache.build(&category).await {
            Ok(entries) => entries,
            Err(e) => return Err(abandon(self.name(), &self.cache, e)),
        };

        let mut rules = RuleFile::new();
        for rule in prebuilt_rules(&entries) {
            rules.push(rule);
        }
        finish(self.name(), &self.cache, rules, entries, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::testing::{Env, scope};
    use crate::scope::ScopeKind;

    fn config(env: &mut Env) -> TestConfig {
        let sdk27 = env.publish("org.robolectric:android-all:8.1.0-robolectric-4611921");
        let sdk28 = env.publish("org.robolectric:android-all:9-robolectric-4913185-2");
        TestConfig {
            robolectric: false,
            android_all: vec![sdk27.key, sdk28.key],
        }
    }

    #[tokio::test]
    async fn keeps_every_sdk_level() {
        let mut env = Env::new();
        let config = config(&mut env);
        let manager = TestFrameworkManager::new(env.cache(CacheCategory::Robolectric), config);

        let mut test_scope = scope(":app", ScopeKind::Test);
        test_scope.robolectric = true;
        manager.register(&test_scope).await.unwrap();
        manager.register(&scope(":app", ScopeKind::Main)).await.unwrap();

        let report = manager.finalize().await.unwrap();
        assert_eq!(report.entries.len(), 2);
        assert!(report.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn unused_robolectric_fetches_nothing() {
        let mut env = Env::new();
        let config = config(&mut env);
        let cache = env.cache(CacheCategory::Robolectric);
        let manager = TestFrameworkManager::new(Arc::clone(&cache), config);
        manager.register(&scope(":app", ScopeKind::Test)).await.unwrap();

        let report = manager.finalize().await.unwrap();
        assert!(report.rule_file.is_none());
        assert_eq!(cache.stats().copies, 0);
    }

    #[tokio::test]
    async fn config_flag_forces_fetch() {
        let mut env = Env::new();
        let mut config = config(&mut env);
        config.robolectric = true;
        let manager = TestFrameworkManager::new(env.cache(CacheCategory::Robolectric), config);

        let report = manager.finalize().await.unwrap();
        assert_eq!(report.entries.len(), 2);
    }
}
