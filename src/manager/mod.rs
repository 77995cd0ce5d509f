//! Feature managers.
//!
//! Each manager owns one narrow category of external dependency and one
//! [`DependencyCache`]. During accumulation the coordinator calls
//! [`FeatureManager::register`] with every visited scope; the manager records what
//! the scope needs in its [`Ledger`]. After the last module, the coordinator calls
//! [`FeatureManager::finalize`] exactly once: the manager merges the requests under
//! its [`ConflictPolicy`](crate::version::ConflictPolicy), materializes the winners,
//! seals its cache and writes one consolidated rule file.
//!
//! | Manager | Category | Merge policy |
//! |---------|----------|--------------|
//! | [`DependencyManager`] | `external` | configurable, default `highest`; `forced` pins win |
//! | [`AnnotationProcessorCache`] | `processor` | configurable, default `highest` |
//! | [`LintManager`] | `lint` | pinned `lint.version`, else configurable (default `highest`) |
//! | [`RuntimeManager`] | `kotlin` / `scala` / `groovy` | pinned version, else default `highest-compatible` |
//! | [`TransformManager`] | `transform` | configured dependencies pin, else default `highest` |
//! | [`TestFrameworkManager`] | `robolectric` | no merge, every configured runtime is kept |
//! | [`ToolManager`] | `tool` | configurable, default `highest`; always copied |
//! | [`ExtraCacheManager`] | `extra/<name>` | no merge, the configured set is fetched as-is |

mod dependency;
mod extra;
mod ledger;
mod lint;
mod processor;
mod runtime;
mod test_framework;
mod tool;
mod transform;

pub use dependency::DependencyManager;
pub use extra::ExtraCacheManager;
pub use ledger::{Ledger, Requested, Requirements, Selected};
pub use lint::LintManager;
pub use processor::AnnotationProcessorCache;
pub use runtime::RuntimeManager;
pub use test_framework::TestFrameworkManager;
pub use tool::{ToolJar, ToolManager};
pub use transform::TransformManager;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cache::{CacheCategory, CacheEntry, DependencyCache};
use crate::core::{BuildError, Diagnostic, Result};
use crate::rules::{Rule, RuleFile};
use crate::scope::Scope;

/// Common accumulate/finalize interface of all managers.
#[async_trait]
pub trait FeatureManager: Send + Sync {
    fn name(&self) -> &str;

    fn category(&self) -> CacheCategory;

    /// Inspect `scope` and record what it needs. Scopes needing nothing are fine.
    async fn register(&self, scope: &Scope) -> Result<()>;

    /// Merge, fetch and emit. Valid exactly once.
    async fn finalize(&self) -> Result<FinalizeReport>;
}

/// What one manager produced at finalize.
#[derive(Debug, Clone)]
pub struct FinalizeReport {
    pub manager: String,
    pub category: CacheCategory,
    /// `None` when the manager had nothing to emit.
    pub rule_file: Option<PathBuf>,
    pub entries: Vec<CacheEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

/// `prebuilt_jar`/`android_prebuilt_aar` rules for materialized entries, one per name.
pub(crate) fn prebuilt_rules(entries: &[CacheEntry]) -> Vec<Rule> {
    let unique: BTreeMap<String, &CacheEntry> = entries
        .iter()
        .filter(|entry| entry.is_materialized())
        .map(|entry| (entry.rule_name(), entry))
        .collect();
    unique.into_values().map(Rule::prebuilt).collect()
}

/// Build label of a cached entry, e.g. `//.buckforge/cache/external:junit.junit-4.12`.
pub(crate) fn target_label(cache: &DependencyCache, entry: &CacheEntry) -> String {
    if !entry.is_materialized() {
        return entry.path().display().to_string();
    }
    let workspace = cache.resolve_context().workspace();
    let dir = match cache.root().strip_prefix(workspace) {
        Ok(relative) => format!("//{}", path_to_label(relative)),
        Err(_) => cache.root().display().to_string(),
    };
    format!("{dir}:{}", entry.rule_name())
}

fn path_to_label(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Seal `cache`, write (or clear) its rule file and assemble the report.
pub(crate) fn finish(
    manager: &str,
    cache: &DependencyCache,
    rules: RuleFile,
    entries: Vec<CacheEntry>,
    diagnostics: Vec<Diagnostic>,
) -> Result<FinalizeReport> {
    cache.seal();
    let path = cache.rule_file_path();
    let category = cache.category().to_string();

    let rule_file = if rules.is_empty() {
        remove_stale_rule_file(manager, &path)?;
        None
    } else {
        rules.write(&path, &category)?;
        Some(path)
    };

    for diagnostic in &diagnostics {
        tracing::warn!(target: "manager", "{}: {}", manager, diagnostic);
    }
    tracing::info!(
        target: "manager",
        "{} finalized: {} artifacts{}",
        manager,
        entries.len(),
        rule_file.as_ref().map(|p| format!(" -> {}", p.display())).unwrap_or_default()
    );

    Ok(FinalizeReport {
        manager: manager.to_string(),
        category: cache.category().clone(),
        rule_file,
        entries,
        diagnostics,
    })
}

/// Seal `cache` after a failed finalize and drop the rule file of a previous run,
/// which would otherwise still point at that run's selection. Returns `error`.
pub(crate) fn abandon(manager: &str, cache: &DependencyCache, error: BuildError) -> BuildError {
    cache.seal();
    if let Err(cleanup) = remove_stale_rule_file(manager, &cache.rule_file_path()) {
        tracing::warn!(target: "manager", "{}: {}", manager, cleanup);
    }
    error
}

fn remove_stale_rule_file(manager: &str, path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(target: "manager", "{}: removed stale {}", manager, path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BuildError::io(format!("removing stale rule file {}", path.display()), e)),
    }
}

/// Entries grouped behind one `java_library` so consumers depend on a single target.
pub(crate) fn bundle_rule(name: &str, entries: &[CacheEntry]) -> Rule {
    let deps: Vec<String> = prebuilt_rules(entries).iter().map(Rule::local_target).collect();
    Rule::new("java_library", name).list("exported_deps", deps)
}
