//! Android lint.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use super::{FeatureManager, FinalizeReport, Ledger, abandon, bundle_rule, finish, prebuilt_rules};
use crate::cache::{CacheCategory, DependencyCache, DependencyCategory};
use crate::config::LintConfig;
use crate::constants::CONFIG_FILE_NAME;
use crate::core::{BuildError, Diagnostic, ErrorCategory, Result};
use crate::rules::RuleFile;
use crate::scope::Scope;
use crate::version::select_version;

const LINT_ID: &str = "lint";
/// Version recorded for scopes that ask for lint without naming a version.
const UNSPECIFIED: &str = "";

/// Fetches the lint toolchain once, at one version, for every module that runs lint.
pub struct LintManager {
    cache: Arc<DependencyCache>,
    ledger: Ledger<()>,
    config: LintConfig,
    version: OnceLock<String>,
}

impl LintManager {
    pub fn new(cache: Arc<DependencyCache>, config: LintConfig) -> Self {
        Self {
            cache,
            ledger: Ledger::new("lint manager"),
            config,
            version: OnceLock::new(),
        }
    }

    /// JVM arguments for the lint runner.
    pub fn jvm_args(&self) -> &str {
        &self.config.jvm_args
    }

    /// Lint version in use, once finalized with lint enabled.
    pub fn selected_version(&self) -> Option<&str> {
        self.version.get().map(String::as_str)
    }

    fn choose_version(&self, requests: &BTreeMap<String, BTreeSet<String>>) -> Result<(String, Vec<Diagnostic>)> {
        let explicit: BTreeMap<String, BTreeSet<String>> = requests
            .iter()
            .filter(|(version, _)| version.as_str() != UNSPECIFIED)
            .map(|(v, r)| (v.clone(), r.clone()))
            .collect();

        if let Some(pinned) = &self.config.version {
            let diagnostics = explicit
                .iter()
                .filter(|(version, _)| *version != pinned)
                .map(|(version, requesters)| {
                    Diagnostic::new(
                        ErrorCategory::VersionConflict,
                        Some(LINT_ID.to_string()),
                        format!(
                            "{version} requested by {} replaced by pinned {pinned}",
                            requesters.iter().cloned().collect::<Vec<_>>().join(", ")
                        ),
                    )
                })
                .collect();
            return Ok((pinned.clone(), diagnostics));
        }

        if explicit.is_empty() {
            let requesters: Vec<String> = requests.values().flatten().cloned().collect();
            return Err(BuildError::Config {
                path: PathBuf::from(CONFIG_FILE_NAME),
                reason: format!(
                    "lint requested by {} but no lint version is configured ([lint] version)",
                    requesters.join(", ")
                ),
            });
        }

        let selection = select_version(LINT_ID, &explicit, self.config.conflict_policy)?;
        let diagnostics = if selection.overridden.is_empty() {
            Vec::new()
        } else {
            vec![Diagnostic::new(
                ErrorCategory::VersionConflict,
                Some(LINT_ID.to_string()),
                format!("selected {} over {}", selection.version, selection.overridden.join(", ")),
            )]
        };
        Ok((selection.version, diagnostics))
    }
}

#[async_trait]
impl FeatureManager for LintManager {
    fn name(&self) -> &str {
        "lint"
    }

    fn category(&self) -> CacheCategory {
        CacheCategory::Lint
    }

    async fn register(&self, scope: &Scope) -> Result<()> {
        let requester = scope.requester();
        match (&scope.lint, self.config.disabled) {
            (Some(request), false) => {
                let version = request.version.as_deref().unwrap_or(UNSPECIFIED);
                self.ledger.record(LINT_ID, version, &requester, ()).await
            }
            _ => self.ledger.ensure_open(&requester).await,
        }
    }

    async fn finalize(&self) -> Result<FinalizeReport> {
        let requirements = self.ledger.close().await?;
        if requirements.is_empty() {
            tracing::debug!(target: "manager", "lint not requested{}", if self.config.disabled { " (disabled)" } else { "" });
            return finish(self.name(), &self.cache, RuleFile::new(), Vec::new(), Vec::new());
        }

        let requests: BTreeMap<String, BTreeSet<String>> = requirements
            .all()
            .map(|(_, version, requested)| (version.to_string(), requested.requesters.clone()))
            .collect();

        let result: Result<_> = async {
            let (version, diagnostics) = self.choose_version(&requests)?;
            let artifacts = self
                .config
                .artifacts
                .iter()
                .map(|module| module.at(&version))
                .collect::<Result<Vec<_>>>()?;
            let entries = self.cache.build(&DependencyCategory::new(LINT_ID, artifacts)).await?;
            Ok((version, entries, diagnostics))
        }
        .await;

        let (version, entries, diagnostics) = match result {
            Ok(done) => done,
            Err(e) => return Err(abandon(self.name(), &self.cache, e)),
        };

        let mut rules = RuleFile::new();
        for rule in prebuilt_rules(&entries) {
            rules.push(rule);
        }
        rules.push(bundle_rule(LINT_ID, &entries).attr("jvm_args", self.config.jvm_args.clone()));
        let _ = self.version.set(version);

        finish(self.name(), &self.cache, rules, entries, diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::LintRequest;
    use crate::manager::testing::{Env, scope};
    use crate::scope::ScopeKind;

    fn lint_scope(module: &str, version: Option<&str>) -> Scope {
        let mut s = scope(module, ScopeKind::Main);
        s.lint = Some(LintRequest {
            version: version.map(str::to_string),
        });
        s
    }

    fn publish_lint(env: &mut Env, version: &str) {
        for name in ["lint", "lint-api", "lint-checks"] {
            env.publish(&format!("com.android.tools.lint:{name}:{version}"));
        }
    }

    #[tokio::test]
    async fn pinned_version_fetches_toolchain_once() {
        let mut env = Env::new();
        publish_lint(&mut env, "26.5.0");
        let config = LintConfig {
            version: Some("26.5.0".to_string()),
            ..LintConfig::default()
        };
        let manager = LintManager::new(env.cache(CacheCategory::Lint), config);

        manager.register(&lint_scope(":a", None)).await.unwrap();
        manager.register(&lint_scope(":b", Some("26.4.0"))).await.unwrap();

        let report = manager.finalize().await.unwrap();
        assert_eq!(report.entries.len(), 3);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(manager.selected_version(), Some("26.5.0"));
        assert_eq!(manager.jvm_args(), "-Xmx1024m");

        let rules = std::fs::read_to_string(report.rule_file.unwrap()).unwrap();
        assert!(rules.contains("jvm_args = \"-Xmx1024m\""));
    }

    #[tokio::test]
    async fn unpinned_merges_requested_versions() {
        let mut env = Env::new();
        publish_lint(&mut env, "26.5.0");
        let manager = LintManager::new(env.cache(CacheCategory::Lint), LintConfig::default());

        manager.register(&lint_scope(":a", Some("26.4.0"))).await.unwrap();
        manager.register(&lint_scope(":b", Some("26.5.0"))).await.unwrap();

        manager.finalize().await.unwrap();
        assert_eq!(manager.selected_version(), Some("26.5.0"));
    }

    #[tokio::test]
    async fn missing_toolchain_jar_fails_finalize() {
        let mut env = Env::new();
        env.publish("com.android.tools.lint:lint:26.5.0");
        let manager = LintManager::new(
            env.cache(CacheCategory::Lint),
            LintConfig {
                version: Some("26.5.0".to_string()),
                ..LintConfig::default()
            },
        );
        manager.register(&lint_scope(":a", None)).await.unwrap();

        let err = manager.finalize().await.unwrap_err();
        assert!(matches!(err, BuildError::UnresolvedDependency { .. }));
        assert!(!env.cache_root().join("lint/BUCK").exists());
    }

    #[tokio::test]
    async fn disabled_or_unrequested_lint_emits_nothing() {
        let env = Env::new();
        let manager = LintManager::new(
            env.cache(CacheCategory::Lint),
            LintConfig {
                disabled: true,
                ..LintConfig::default()
            },
        );
        manager.register(&lint_scope(":a", Some("26.5.0"))).await.unwrap();

        let report = manager.finalize().await.unwrap();
        assert!(report.rule_file.is_none());
        assert!(manager.selected_version().is_none());
    }

    #[tokio::test]
    async fn unversioned_request_without_pin_is_a_config_error() {
        let env = Env::new();
        let manager = LintManager::new(env.cache(CacheCategory::Lint), LintConfig::default());
        manager.register(&lint_scope(":a", None)).await.unwrap();
        assert!(matches!(manager.finalize().await.unwrap_err(), BuildError::Config { .. }));
    }
}
