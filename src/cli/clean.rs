//! `buckforge clean` - remove generated state.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use super::CliContext;
use crate::constants::{GEN_DIR, STATE_FILE};
use crate::utils::fs::remove_dir_all;

#[derive(Args, Debug)]
pub struct CleanCommand {
    /// Also delete the dependency caches and their rule files.
    #[arg(long)]
    all: bool,
}

impl CleanCommand {
    pub async fn execute(self, context: &CliContext) -> Result<()> {
        let workspace = context.workspace();
        let mut targets = vec![workspace.join(GEN_DIR)];
        if let Some(state_dir) = workspace.join(STATE_FILE).parent() {
            targets.push(state_dir.to_path_buf());
        }
        if self.all {
            let config = context.load_config().await?;
            targets.push(config.cache_root(workspace));
        }

        for target in &targets {
            tracing::debug!("Removing {}", target.display());
            remove_dir_all(target).with_context(|| format!("Failed to remove {}", target.display()))?;
        }

        if !context.quiet {
            let what = if self.all { "generated state and caches" } else { "generated state" };
            println!("{} {}", "Removed".green().bold(), what);
        }
        Ok(())
    }
}
