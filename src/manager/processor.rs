//! Annotation processors.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use super::{FeatureManager, FinalizeReport, Ledger, abandon, finish, target_label};
use crate::artifact::{ArtifactKey, ResolvedArtifact};
use crate::cache::{CacheCategory, CacheEntry, DependencyCache};
use crate::core::{BuildError, Diagnostic, ErrorCategory, Result};
use crate::rules::{Rule, RuleFile};
use crate::scope::Scope;
use crate::version::ConflictPolicy;

/// Service file listing the processor classes a jar provides.
const PROCESSOR_SERVICE: &str = "META-INF/services/javax.annotation.processing.Processor";

/// Caches processor jars for the whole build and emits one
/// `java_annotation_processor` per unique processor, however many modules use it.
pub struct AnnotationProcessorCache {
    cache: Arc<DependencyCache>,
    ledger: Ledger<ResolvedArtifact>,
    policy: ConflictPolicy,
    targets: OnceLock<BTreeMap<String, String>>,
}

impl AnnotationProcessorCache {
    pub fn new(cache: Arc<DependencyCache>, policy: ConflictPolicy) -> Self {
        Self {
            cache,
            ledger: Ledger::new("annotation processor cache"),
            policy,
            targets: OnceLock::new(),
        }
    }

    /// Label of the processor rule serving `key`'s logical dependency, after finalize.
    pub fn processor_target(&self, key: &ArtifactKey) -> Option<&str> {
        self.targets.get()?.get(&key.logical_id()).map(String::as_str)
    }

    fn processor_rules(&self, entry: &CacheEntry, classes: Vec<String>) -> [Rule; 2] {
        let jar = Rule::prebuilt(entry);
        let processor = Rule::new("java_annotation_processor", processor_rule_name(entry))
            .list("deps", [jar.local_target()])
            .list("processor_classes", classes)
            .flag("does_not_affect_abi", false);
        [jar, processor]
    }
}

fn processor_rule_name(entry: &CacheEntry) -> String {
    format!("{}-processor", entry.rule_name())
}

/// Processor classes declared in the jar's service file; empty when there are none.
pub(crate) fn discover_processor_classes(jar: &Path) -> Vec<String> {
    let read = || -> std::result::Result<String, Box<dyn std::error::Error>> {
        let file = std::fs::File::open(jar)?;
        let mut archive = zip::ZipArchive::new(std::io::BufReader::new(file))?;
        let mut service = archive.by_name(PROCESSOR_SERVICE)?;
        let mut content = String::new();
        service.read_to_string(&mut content)?;
        Ok(content)
    };

    match read() {
        Ok(content) => content
            .lines()
            .map(|line| line.split('#').next().unwrap_or("").trim())
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        Err(e) => {
            tracing::trace!(target: "manager", "No processor service in {}: {}", jar.display(), e);
            Vec::new()
        }
    }
}

#[async_trait]
impl FeatureManager for AnnotationProcessorCache {
    fn name(&self) -> &str {
        "annotation-processors"
    }

    fn category(&self) -> CacheCategory {
        CacheCategory::Processor
    }

    async fn register(&self, scope: &Scope) -> Result<()> {
        let requester = scope.requester();
        self.ledger.ensure_open(&requester).await?;
        for processor in &scope.annotation_processors {
            self.ledger
                .record(&processor.key.logical_id(), processor.key.version(), &requester, processor.clone())
                .await?;
        }
        Ok(())
    }

    async fn finalize(&self) -> Result<FinalizeReport> {
        let requirements = self.ledger.close().await?;

        let result: Result<_> = async {
            let (selected, diagnostics) = requirements.select(self.policy)?;
            // Processors always run from the cache, local jars included
            let entries = futures::future::try_join_all(
                selected.iter().map(|choice| self.cache.get(&choice.payload, true)),
            )
            .await?;
            Ok((entries, diagnostics))
        }
        .await;

        let (entries, mut diagnostics) = match result {
            Ok(done) => done,
            Err(e) => return Err(abandon(self.name(), &self.cache, e)),
        };

        let paths: Vec<_> = entries.iter().map(|e| e.path().to_path_buf()).collect();
        let classes = tokio::task::spawn_blocking(move || {
            paths.iter().map(|p| discover_processor_classes(p)).collect::<Vec<_>>()
        })
        .await
        .map_err(|e| BuildError::io("scanning processor jars", std::io::Error::other(e)))?;

        let mut rules = RuleFile::new();
        let mut targets = BTreeMap::new();
        for (entry, classes) in entries.iter().zip(classes) {
            if classes.is_empty() {
                diagnostics.push(Diagnostic::new(
                    ErrorCategory::InvalidInput,
                    Some(entry.key().to_string()),
                    format!("no processor classes declared in {PROCESSOR_SERVICE}"),
                ));
            }
            let label = target_label(&self.cache, entry);
            let (dir, _) = label.rsplit_once(':').unwrap_or((label.as_str(), ""));
            targets.insert(entry.key().logical_id(), format!("{dir}:{}", processor_rule_name(entry)));

            for rule in self.processor_rules(entry, classes) {
                rules.push(rule);
            }
        }
        let _ = self.targets.set(targets);

        finish(self.name(), &self.cache, rules, entries, diagnostics)
    }
}
