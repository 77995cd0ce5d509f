//! Command-line interface.
//!
//! # Commands
//!
//! - `generate --model <file>` - run one generation pass over an exported project model
//! - `clean [--all]` - remove generated state, and with `--all` the dependency caches
//! - `cache info` - show per-category cache usage
//!
//! # Global Options
//!
//! - `--verbose` - debug logging
//! - `--quiet` - only warnings and errors
//! - `--config <path>` - configuration file instead of `<workspace>/buckforge.toml`
//! - `--workspace <dir>` - workspace root, defaults to the current directory
//!
//! `RUST_LOG`, when set, takes precedence over `--verbose`/`--quiet`.
//!
//! ```bash
//! buckforge generate --model build/buckforge-model.json
//! buckforge --verbose generate --model model.json --max-parallel 4
//! buckforge cache info
//! buckforge clean --all
//! ```

mod cache;
mod clean;
mod generate;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::config::GenConfig;

/// Translate a host-build project model into Buck rule files.
#[derive(Parser)]
#[command(
    name = "buckforge",
    about = "Generate Buck rules and dependency caches from a host build model",
    version,
    long_about = "buckforge reads an exported host project model, resolves every module's scopes, \
                  materializes the external artifacts they need into a shared cache and writes one \
                  consolidated rule file per cache category."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only print warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to the configuration file.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Workspace root. Defaults to the current directory.
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    workspace: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one generation pass and write rule files.
    Generate(generate::GenerateCommand),

    /// Remove generated state and, optionally, the dependency caches.
    Clean(clean::CleanCommand),

    /// Inspect the dependency caches.
    Cache(cache::CacheCommand),
}

/// Options shared by every command.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub workspace: PathBuf,
    pub config_path: Option<PathBuf>,
    pub quiet: bool,
}

impl CliContext {
    pub async fn load_config(&self) -> Result<GenConfig> {
        GenConfig::load(&self.workspace, self.config_path.as_deref())
            .await
            .context("Failed to load configuration")
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        self.init_logging();

        let workspace = match &self.workspace {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Cannot determine current directory")?,
        };
        let context = CliContext {
            workspace,
            config_path: self.config.clone(),
            quiet: self.quiet,
        };

        match self.command {
            Commands::Generate(cmd) => cmd.execute(&context).await,
            Commands::Clean(cmd) => cmd.execute(&context).await,
            Commands::Cache(cmd) => cmd.execute(&context).await,
        }
    }

    /// Level implied by the verbosity flags.
    #[must_use]
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    fn init_logging(&self) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(self.log_level())
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(self.verbose)
            .try_init();
    }
}
