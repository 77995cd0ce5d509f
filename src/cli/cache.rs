//! `buckforge cache` - cache inspection.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::Path;

use super::CliContext;
use crate::constants::{RULE_FILE_NAME, STATE_FILE};
use crate::coordinator::StateFile;
use crate::utils::fs::dir_stats;

#[derive(Args, Debug)]
pub struct CacheCommand {
    #[command(subcommand)]
    command: CacheSubcommand,
}

#[derive(Subcommand, Debug)]
enum CacheSubcommand {
    /// Show location, per-category usage and the last generation.
    Info,
}

impl CacheCommand {
    pub async fn execute(self, context: &CliContext) -> Result<()> {
        match self.command {
            CacheSubcommand::Info => info(context).await,
        }
    }
}

/// One row of `cache info`.
#[derive(Debug, PartialEq, Eq)]
struct CategoryUsage {
    name: String,
    files: usize,
    bytes: u64,
    has_rules: bool,
}

async fn info(context: &CliContext) -> Result<()> {
    let config = context.load_config().await?;
    let root = config.cache_root(context.workspace());

    println!("{}: {}", "Cache".bold(), root.display());
    let usage = category_usage(&root)?;
    if usage.is_empty() {
        println!("  (empty)");
    }
    for category in &usage {
        println!(
            "  {:<14} {:>5} files {:>10}{}",
            category.name.cyan(),
            category.files,
            format_size(category.bytes),
            if category.has_rules { "" } else { "  (no rule file)" }
        );
    }

    match StateFile::read(&context.workspace().join(STATE_FILE))? {
        Some(state) => println!(
            "{}: {} ({} modules, buckforge {})",
            "Last generation".bold(),
            state.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            state.modules,
            state.buckforge_version
        ),
        None => println!("{}: never", "Last generation".bold()),
    }
    Ok(())
}

/// Usage of every category directory, `extra/<name>` caches included.
fn category_usage(root: &Path) -> Result<Vec<CategoryUsage>> {
    let mut usage = Vec::new();
    if !root.is_dir() {
        return Ok(usage);
    }

    let mut dirs = vec![(String::new(), root.to_path_buf())];
    while let Some((prefix, dir)) = dirs.pop() {
        let entries = std::fs::read_dir(&dir).with_context(|| format!("Failed to read {}", dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();
            if !path.is_dir() || name.starts_with('.') {
                continue;
            }
            if prefix.is_empty() && name == "extra" {
                dirs.push((format!("{name}/"), path));
                continue;
            }

            let (bytes, files) = dir_stats(&path).with_context(|| format!("Failed to scan {}", path.display()))?;
            usage.push(CategoryUsage {
                name: format!("{prefix}{name}"),
                files,
                bytes,
                has_rules: path.join(RULE_FILE_NAME).is_file(),
            });
        }
    }
    usage.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(usage)
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 { format!("{bytes} B") } else { format!("{size:.1} {}", UNITS[unit]) }
}
