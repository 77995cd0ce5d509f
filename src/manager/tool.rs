//! Build tool jars.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use super::{FeatureManager, FinalizeReport, Ledger, abandon, finish, prebuilt_rules, target_label};
use crate::artifact::ResolvedArtifact;
use crate::cache::{CacheCategory, DependencyCache};
use crate::config::ToolsConfig;
use crate::core::Result;
use crate::rules::RuleFile;
use crate::scope::Scope;

/// A tool jar pinned after finalize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolJar {
    pub version: String,
    pub path: PathBuf,
    pub target: String,
}

/// Tools such as ProGuard that rules invoke by jar path.
///
/// The version comes from whatever the scopes' classpaths carry for the tool's
/// `group:name`; the jar is always copied into the `tool` cache, even when a
/// project-local file could serve it.
pub struct ToolManager {
    cache: Arc<DependencyCache>,
    ledger: Ledger<ResolvedArtifact>,
    config: ToolsConfig,
    tools: OnceLock<BTreeMap<String, ToolJar>>,
}

impl ToolManager {
    pub fn new(cache: Arc<DependencyCache>, config: ToolsConfig) -> Self {
        Self {
            cache,
            ledger: Ledger::new("tool manager"),
            config,
            tools: OnceLock::new(),
        }
    }

    /// The cached jar of tool `name`, once finalized and only if some scope carried it.
    pub fn tool(&self, name: &str) -> Option<&ToolJar> {
        self.tools.get()?.get(name)
    }

    pub fn tool_path(&self, name: &str) -> Option<&Path> {
        self.tool(name).map(|t| t.path.as_path())
    }
}

#[async_trait]
impl FeatureManager for ToolManager {
    fn name(&self) -> &str {
        "tools"
    }

    fn category(&self) -> CacheCategory {
        CacheCategory::Tool
    }

    async fn register(&self, scope: &Scope) -> Result<()> {
        let requester = scope.requester();
        self.ledger.ensure_open(&requester).await?;
        for artifact in scope.external_artifacts() {
            let key = &artifact.key;
            let tool = self
                .config
                .jars
                .iter()
                .find(|(_, module)| module.group() == key.group() && module.name() == key.name());
            if let Some((name, _)) = tool {
                self.ledger.record(name, key.version(), &requester, artifact.clone()).await?;
            }
        }
        Ok(())
    }

    async fn finalize(&self) -> Result<FinalizeReport> {
        let requirements = self.ledger.close().await?;

        let result: Result<_> = async {
            let (selected, diagnostics) = requirements.select(self.config.conflict_policy)?;
            let entries =
                futures::future::try_join_all(selected.iter().map(|s| self.cache.get(&s.payload, true))).await?;
            Ok((selected, entries, diagnostics))
        }
        .await;

        let (selected, entries, diagnostics) = match result {
            Ok(done) => done,
            Err(e) => return Err(abandon(self.name(), &self.cache, e)),
        };

        let tools = selected
            .iter()
            .zip(&entries)
            .map(|(choice, entry)| {
                let jar = ToolJar {
                    version: choice.version.clone(),
                    path: self.cache.get_path(entry).to_path_buf(),
                    target: target_label(&self.cache, entry),
                };
                tracing::debug!(target: "manager", "tool {} -> {}", choice.logical_id, jar.path.display());
                (choice.logical_id.clone(), jar)
            })
            .collect();
        let _ = self.tools.set(tools);

        let mut rules = RuleFile::new();
        for rule in prebuilt_rules(&entries) {
            rules.push(rule);
        }
        finish(self.name(), &self.cache, rules, entries, diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{HashMode, Origin};
    use crate::manager::testing::{Env, scope};
    use crate::scope::{DependencyEdge, ScopeKind};

    #[tokio::test]
    async fn tool_version_follows_the_classpath() {
        let mut env = Env::new();
        let old = env.publish("net.sf.proguard:proguard-base:6.0.3");
        let new = env.publish("net.sf.proguard:proguard-base:6.2.2");
        let unrelated = env.publish("com.google.guava:guava:19.0");
        let manager = ToolManager::new(env.cache(CacheCategory::Tool), ToolsConfig::default());

        let mut a = scope(":a", ScopeKind::Main);
        a.compile = vec![DependencyEdge::External(old), DependencyEdge::External(unrelated)];
        let mut b = scope(":b", ScopeKind::Main);
        b.runtime = vec![DependencyEdge::External(new)];
        manager.register(&a).await.unwrap();
        manager.register(&b).await.unwrap();

        let report = manager.finalize().await.unwrap();
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.diagnostics.len(), 1);

        let proguard = manager.tool("proguard").unwrap();
        assert_eq!(proguard.version, "6.2.2");
        assert_eq!(proguard.target, "//.buckforge/cache/tool:net.sf.proguard.proguard-base-6.2.2");
        assert_eq!(
            manager.tool_path("proguard"),
            Some(env.cache_root().join("tool/net.sf.proguard.proguard-base-6.2.2.jar").as_path())
        );
        assert!(report.rule_file.unwrap().ends_with("tool/BUCK"));
    }

    #[tokio::test]
    async fn local_tool_jar_is_still_copied() {
        let env = Env::new();
        let local = env.workspace().join("libs/proguard.jar");
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        std::fs::write(&local, b"proguard").unwrap();
        let artifact = ResolvedArtifact::resolve(
            "net.sf.proguard:proguard-base:6.2.2".parse().unwrap(),
            local.clone(),
            HashMode::Content,
            Origin::Local,
        )
        .unwrap();
        let manager = ToolManager::new(env.cache(CacheCategory::Tool), ToolsConfig::default());

        let mut a = scope(":a", ScopeKind::Main);
        a.compile = vec![DependencyEdge::External(artifact)];
        manager.register(&a).await.unwrap();
        manager.finalize().await.unwrap();

        let path = manager.tool_path("proguard").unwrap();
        assert!(path.starts_with(env.cache_root().join("tool")));
        assert_ne!(path, local.as_path());
    }

    #[tokio::test]
    async fn absent_tool_emits_nothing() {
        let env = Env::new();
        let manager = ToolManager::new(env.cache(CacheCategory::Tool), ToolsConfig::default());
        manager.register(&scope(":a", ScopeKind::Main)).await.unwrap();

        let report = manager.finalize().await.unwrap();
        assert!(report.rule_file.is_none());
        assert!(manager.tool("proguard").is_none());
    }
}
