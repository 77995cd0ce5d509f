//! Generation settings loaded from `buckforge.toml`.
//!
//! Every field has a default, so an absent file is a valid (empty) configuration.
//!
//! # Lookup
//!
//! 1. `--config <path>` on the command line
//! 2. `BUCKFORGE_CONFIG` environment variable
//! 3. `buckforge.toml` in the workspace root (optional)
//!
//! An explicitly named file must exist. `BUCKFORGE_CACHE_DIR` overrides `cache_dir`.
//!
//! # Example
//!
//! ```toml
//! cache_dir = ".buckforge/cache"
//! max_parallel = 16
//! hash_mode = "content"
//! repositories = ["~/.m2/repository"]
//! forced = ["com.google.guava:guava:28.1-android"]
//!
//! [external]
//! conflict_policy = "highest"
//!
//! [lint]
//! version = "26.5.0"
//! jvm_args = "-Xmx2g"
//!
//! [kotlin]
//! version = "1.3.72"
//! conflict_policy = "highest-compatible"
//!
//! [test]
//! android_all = ["org.robolectric:android-all:9-robolectric-4913185-2"]
//!
//! [tools.jars]
//! proguard = "net.sf.proguard:proguard-base"
//!
//! [extra_dep_caches]
//! proto = ["com.google.protobuf:protoc:3.11.4"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::artifact::{ArtifactKey, ArtifactModule, HashMode};
use crate::constants::{CONFIG_FILE_NAME, DEFAULT_CACHE_DIR, ENV_CACHE_DIR, ENV_CONFIG, default_max_parallel};
use crate::core::{BuildError, Result};
use crate::graph::Language;
use crate::utils::resolve_against;
use crate::version::ConflictPolicy;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenConfig {
    /// Cache root, relative to the workspace unless absolute.
    pub cache_dir: PathBuf,
    /// Upper bound on modules visited concurrently.
    pub max_parallel: usize,
    pub hash_mode: HashMode,
    /// Local Maven-layout repositories consulted after the project model's table.
    pub repositories: Vec<PathBuf>,
    /// Coordinates always materialized into the external cache, pinning their version.
    pub forced: Vec<ArtifactKey>,
    pub external: PolicyConfig,
    pub processors: PolicyConfig,
    pub lint: LintConfig,
    pub kotlin: RuntimeConfig,
    pub scala: RuntimeConfig,
    pub groovy: RuntimeConfig,
    pub transform: TransformConfig,
    pub test: TestConfig,
    pub tools: ToolsConfig,
    /// Named extra caches, each built wholesale.
    pub extra_dep_caches: BTreeMap<String, Vec<ArtifactKey>>,
}

impl Default for GenConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            max_parallel: default_max_parallel(),
            hash_mode: HashMode::default(),
            repositories: Vec::new(),
            forced: Vec::new(),
            external: PolicyConfig::default(),
            processors: PolicyConfig::default(),
            lint: LintConfig::default(),
            kotlin: RuntimeConfig::for_language(Language::Kotlin),
            scala: RuntimeConfig::for_language(Language::Scala),
            groovy: RuntimeConfig::for_language(Language::Groovy),
            transform: TransformConfig::default(),
            test: TestConfig::default(),
            tools: ToolsConfig::default(),
            extra_dep_caches: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    pub conflict_policy: ConflictPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LintConfig {
    /// Pinned lint version; wins over versions requested by scopes.
    pub version: Option<String>,
    pub disabled: bool,
    pub jvm_args: String,
    pub conflict_policy: ConflictPolicy,
    /// Artifacts fetched at the selected version.
    pub artifacts: Vec<ArtifactModule>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            version: None,
            disabled: false,
            jvm_args: "-Xmx1024m".to_string(),
            conflict_policy: ConflictPolicy::Highest,
            artifacts: modules(&[
                "com.android.tools.lint:lint",
                "com.android.tools.lint:lint-api",
                "com.android.tools.lint:lint-checks",
            ]),
        }
    }
}

/// Settings of one language runtime manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Pinned runtime version; wins over versions requested by scopes.
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_runtime_policy")]
    pub conflict_policy: ConflictPolicy,
    /// Runtime and compiler artifacts fetched at the selected version.
    #[serde(default)]
    pub artifacts: Vec<ArtifactModule>,
}

fn default_runtime_policy() -> ConflictPolicy {
    ConflictPolicy::HighestCompatible
}

impl RuntimeConfig {
    pub fn for_language(language: Language) -> Self {
        Self {
            version: None,
            conflict_policy: default_runtime_policy(),
            artifacts: default_runtime_artifacts(language),
        }
    }

    /// Fill in the language's default artifacts when none were configured.
    fn with_defaults(mut self, language: Language) -> Self {
        if self.artifacts.is_empty() {
            self.artifacts = default_runtime_artifacts(language);
        }
        self
    }
}

fn default_runtime_artifacts(language: Language) -> Vec<ArtifactModule> {
    match language {
        Language::Kotlin => modules(&[
            "org.jetbrains.kotlin:kotlin-stdlib",
            "org.jetbrains.kotlin:kotlin-compiler-embeddable",
        ]),
        Language::Scala => modules(&["org.scala-lang:scala-library", "org.scala-lang:scala-compiler"]),
        Language::Groovy => modules(&["org.codehaus.groovy:groovy"]),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformConfig {
    pub enabled: bool,
    pub dependencies: Vec<ArtifactKey>,
    pub conflict_policy: ConflictPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestConfig {
    /// Fetch Robolectric runtimes even when no scope asks for them.
    pub robolectric: bool,
    /// `android-all` runtime jars, one per SDK level.
    pub android_all: Vec<ArtifactKey>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            robolectric: false,
            android_all: [
                "org.robolectric:android-all:8.1.0-robolectric-4611921",
                "org.robolectric:android-all:9-robolectric-4913185-2",
            ]
            .iter()
            .filter_map(|c| c.parse().ok())
            .collect(),
        }
    }
}

/// Tool jars pinned at the version found on the scopes' classpaths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    pub conflict_policy: ConflictPolicy,
    /// Tool name to the `group:name` looked up on classpaths.
    pub jars: BTreeMap<String, ArtifactModule>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::Highest,
            jars: [("proguard", "net.sf.proguard:proguard-base")]
                .iter()
                .filter_map(|(name, id)| Some((name.to_string(), id.parse().ok()?)))
                .collect(),
        }
    }
}

fn modules(ids: &[&str]) -> Vec<ArtifactModule> {
    ids.iter().filter_map(|id| id.parse().ok()).collect()
}

impl GenConfig {
    /// Load the configuration for `workspace`, honoring the lookup order above.
    pub async fn load(workspace: &Path, explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(ENV_CONFIG).map(PathBuf::from);

        let mut config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => {
                let path = resolve_against(workspace, &path);
                if !path.is_file() {
                    return Err(BuildError::Config {
                        path,
                        reason: "file does not exist".to_string(),
                    });
                }
                Self::load_from(&path).await?
            }
            None => {
                let path = workspace.join(CONFIG_FILE_NAME);
                if path.is_file() {
                    Self::load_from(&path).await?
                } else {
                    tracing::debug!("No {} in {}, using defaults", CONFIG_FILE_NAME, workspace.display());
                    Self::default()
                }
            }
        };

        if let Some(dir) = std::env::var_os(ENV_CACHE_DIR) {
            tracing::debug!("Cache dir overridden by {}", ENV_CACHE_DIR);
            config.cache_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| BuildError::io(format!("reading config {}", path.display()), e))?;
        Self::parse(&content).map_err(|e| match e {
            BuildError::Config { reason, .. } => BuildError::Config {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate TOML content.
    pub fn parse(content: &str) -> Result<Self> {
        let invalid = |reason: String| BuildError::Config {
            path: PathBuf::from(CONFIG_FILE_NAME),
            reason,
        };

        let mut config: Self = toml::from_str(content).map_err(|e| invalid(e.to_string()))?;
        config.kotlin = config.kotlin.with_defaults(Language::Kotlin);
        config.scala = config.scala.with_defaults(Language::Scala);
        config.groovy = config.groovy.with_defaults(Language::Groovy);

        if config.max_parallel == 0 {
            return Err(invalid("max_parallel must be at least 1".to_string()));
        }
        for name in config.extra_dep_caches.keys() {
            if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
                return Err(invalid(format!("extra_dep_caches name '{name}' is not a valid directory name")));
            }
        }
        Ok(config)
    }

    /// Absolute cache root for `workspace`.
    pub fn cache_root(&self, workspace: &Path) -> PathBuf {
        resolve_against(workspace, &self.cache_dir)
    }

    pub fn runtime(&self, language: Language) -> &RuntimeConfig {
        match language {
            Language::Kotlin => &self.kotlin,
            Language::Scala => &self.scala,
            Language::Groovy => &self.groovy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn empty_file_yields_defaults() {
        let config = GenConfig::parse("").unwrap();
        assert_eq!(config.cache_dir, PathBuf::from(".buckforge/cache"));
        assert_eq!(config.external.conflict_policy, ConflictPolicy::Highest);
        assert_eq!(config.kotlin.conflict_policy, ConflictPolicy::HighestCompatible);
        assert_eq!(config.lint.jvm_args, "-Xmx1024m");
        assert_eq!(config.lint.artifacts.len(), 3);
        assert_eq!(config.test.android_all.len(), 2);
        assert_eq!(config.tools.jars["proguard"].to_string(), "net.sf.proguard:proguard-base");
        assert!(config.max_parallel >= 1);
    }

    #[test]
    fn sections_override_defaults() {
        let config = GenConfig::parse(
            r#"
            hash_mode = "coordinate"
            forced = ["com.google.guava:guava:28.1-android"]

            [processors]
            conflict_policy = "fail"

            [kotlin]
            version = "1.3.72"

            [scala]
            artifacts = ["org.scala-lang:scala-library"]

            [tools.jars]
            r8 = "com.android.tools:r8"

            [extra_dep_caches]
            proto = ["com.google.protobuf:protoc:3.11.4"]
            "#,
        )
        .unwrap();

        assert_eq!(config.hash_mode, HashMode::Coordinate);
        assert_eq!(config.forced.len(), 1);
        assert_eq!(config.processors.conflict_policy, ConflictPolicy::Fail);
        assert_eq!(config.kotlin.version.as_deref(), Some("1.3.72"));
        assert_eq!(config.kotlin.artifacts.len(), 2);
        assert_eq!(config.kotlin.conflict_policy, ConflictPolicy::HighestCompatible);
        assert_eq!(config.scala.artifacts.len(), 1);
        assert_eq!(config.extra_dep_caches["proto"].len(), 1);
        assert_eq!(config.tools.jars.len(), 1);
        assert!(config.tools.jars.contains_key("r8"));
    }

    #[test]
    fn invalid_values_are_rejected_at_load() {
        assert!(GenConfig::parse("forced = [\"guava\"]").is_err());
        assert!(GenConfig::parse("max_parallel = 0").is_err());
        assert!(GenConfig::parse("[extra_dep_caches]\n\"a/b\" = []").is_err());
        assert!(GenConfig::parse("unknown_key = 1").is_err());
        assert!(GenConfig::parse("[external]\nconflict_policy = \"newest\"").is_err());
    }

    #[tokio::test]
    #[serial]
    async fn workspace_file_and_env_overrides() {
        let dir = TempDir::new().unwrap();
        unsafe {
            std::env::remove_var(ENV_CONFIG);
            std::env::remove_var(ENV_CACHE_DIR);
        }

        let config = GenConfig::load(dir.path(), None).await.unwrap();
        assert_eq!(config.cache_root(dir.path()), dir.path().join(".buckforge/cache"));

        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "cache_dir = \"out/cache\"").unwrap();
        let config = GenConfig::load(dir.path(), None).await.unwrap();
        assert_eq!(config.cache_root(dir.path()), dir.path().join("out/cache"));

        unsafe {
            std::env::set_var(ENV_CACHE_DIR, "/tmp/shared-cache");
        }
        let config = GenConfig::load(dir.path(), None).await.unwrap();
        unsafe {
            std::env::remove_var(ENV_CACHE_DIR);
        }
        assert_eq!(config.cache_root(dir.path()), PathBuf::from("/tmp/shared-cache"));
    }

    #[tokio::test]
    #[serial]
    async fn explicit_config_must_exist() {
        let dir = TempDir::new().unwrap();
        let err = GenConfig::load(dir.path(), Some(Path::new("missing.toml"))).await.unwrap_err();
        assert!(matches!(err, BuildError::Config { .. }));
    }
}
