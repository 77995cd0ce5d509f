//! Integration test suite for buckforge
//!
//! End-to-end generation passes over temporary workspaces built with
//! `buckforge::test_utils::TestWorkspace`.
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **scenarios**: full passes (shared processors, re-published artifacts,
//!   missing artifacts, version conflicts, re-runs)
//! - **protocol**: phase ordering and the finalize barrier
//! - **concurrency**: concurrent cache fetches, scope memoization, parallel visits
//! - **cli**: the `buckforge` binary

mod cli;
mod concurrency;
mod protocol;
mod scenarios;

use std::path::Path;

/// Regular files directly inside `dir` with the given extension, sorted.
pub fn files_with_extension(dir: &Path, extension: &str) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == extension))
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    names.sort();
    names
}
