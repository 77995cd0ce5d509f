//! `buckforge generate` - one full generation pass.
//!
//! Loads the project model exported by the host build, visits every module,
//! finalizes every manager and prints a summary. Any unresolved dependency or
//! failed cache write fails the command; no partial rule file is left behind
//! for the affected category.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use super::CliContext;
use crate::coordinator::Coordinator;
use crate::graph::ProjectModel;
use crate::utils::resolve_against;

#[derive(Args, Debug)]
pub struct GenerateCommand {
    /// Project model exported by the host build (JSON).
    #[arg(long, value_name = "FILE")]
    model: PathBuf,

    /// Maximum number of modules visited concurrently.
    #[arg(long, value_name = "NUM")]
    max_parallel: Option<usize>,
}

impl GenerateCommand {
    pub async fn execute(self, context: &CliContext) -> Result<()> {
        let mut config = context.load_config().await?;
        if let Some(max_parallel) = self.max_parallel {
            anyhow::ensure!(max_parallel >= 1, "--max-parallel must be at least 1");
            config.max_parallel = max_parallel;
        }

        let model_path = resolve_against(context.workspace(), &self.model);
        let model = ProjectModel::load(&model_path)?;
        tracing::debug!("Loaded project model {}", model_path.display());

        let coordinator = Coordinator::from_model(context.workspace(), &config, model);
        let report = coordinator
            .run()
            .await
            .with_context(|| format!("Generation failed for {}", context.workspace().display()))?;

        if context.quiet {
            return Ok(());
        }

        let diagnostics: Vec<_> = report.diagnostics().collect();
        for diagnostic in &diagnostics {
            println!("{} {}", "warning:".yellow().bold(), diagnostic);
        }

        println!("{}", "Generation complete!".green().bold());
        println!("  {} modules, {} scopes", report.modules_visited, report.scopes_resolved);
        for finalized in report.reports.iter().filter(|r| r.rule_file.is_some()) {
            let cached = finalized.entries.iter().filter(|e| e.is_materialized()).count();
            println!("  {:<14} {} artifacts", finalized.category.to_string().cyan(), cached);
        }
        if !diagnostics.is_empty() {
            println!("  {} warnings", diagnostics.len());
        }
        Ok(())
    }
}
