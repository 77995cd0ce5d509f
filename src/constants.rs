//! Global constants used throughout the buckforge codebase.
//!
//! Paths are relative to the workspace root unless noted otherwise. Defining them
//! centrally keeps the on-disk layout discoverable in one place.

/// Name of the configuration file looked up in the workspace root.
pub const CONFIG_FILE_NAME: &str = "buckforge.toml";

/// Default cache root.
pub const DEFAULT_CACHE_DIR: &str = ".buckforge/cache";

/// Scratch directory for per-generation intermediate output, cleared on every pass.
pub const GEN_DIR: &str = ".buckforge/gen";

/// State file written after a successful generation pass.
pub const STATE_FILE: &str = ".buckforge/state/STATE";

/// Name of the consolidated rule file emitted into each cache category directory.
pub const RULE_FILE_NAME: &str = "BUCK";

/// Default extension when a resolved file has none.
pub const DEFAULT_EXTENSION: &str = "jar";

/// Default bound on concurrently visited modules.
pub fn default_max_parallel() -> usize {
    std::thread::available_parallelism().map(|n| n.get() * 2).unwrap_or(8).max(4)
}

/// Environment variable overriding the config file location.
pub const ENV_CONFIG: &str = "BUCKFORGE_CONFIG";

/// Environment variable overriding the cache root.
pub const ENV_CACHE_DIR: &str = "BUCKFORGE_CACHE_DIR";
