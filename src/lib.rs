//! buckforge - generate Buck rules and dependency caches from a host build.
//!
//! A generation pass reads an exported host project model, resolves each
//! module's scopes, lets a set of feature managers accumulate what those
//! scopes need and, once every module has been visited, finalizes each
//! manager exactly once into a consolidated rule file backed by a shared,
//! content-addressed artifact cache.
//!
//! # Architecture
//!
//! ```text
//!  graph (HostGraph) ──> scope::TargetCache ──> Scope ──register──> manager::*
//!                               │                                     │ finalize
//!                   resolver (ArtifactResolver)                       v
//!                                                     cache::DependencyCache ──> rules (BUCK)
//!                 coordinator: begin_generation / visit_module / end_generation
//! ```
//!
//! # Modules
//!
//! - [`artifact`] - coordinates, resolved files and content hashes
//! - [`cache`] - deduplicating, concurrency-safe artifact store per category
//! - [`resolver`] - coordinate to file lookup supplied by the host
//! - [`graph`] - read-only host module graph and the JSON project model
//! - [`scope`] - classified per-module dependency scopes, memoized
//! - [`version`] - version conflict policies
//! - [`manager`] - feature managers implementing accumulate/finalize
//! - [`rules`] - rule file rendering
//! - [`coordinator`] - generation phases and the finalize barrier
//! - [`config`] - `buckforge.toml`
//! - [`cli`] - command-line interface
//!
//! # Example
//!
//! ```rust,no_run
//! use buckforge::config::GenConfig;
//! use buckforge::coordinator::Coordinator;
//! use buckforge::graph::ProjectModel;
//! use std::path::Path;
//!
//! # async fn example() -> buckforge::core::Result<()> {
//! let workspace = Path::new(".");
//! let config = GenConfig::load(workspace, None).await?;
//! let model = ProjectModel::load(&workspace.join("model.json"))?;
//!
//! let coordinator = Coordinator::from_model(workspace, &config, model);
//! let report = coordinator.run().await?;
//! println!("{} modules visited", report.modules_visited);
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod core;
pub mod graph;
pub mod manager;
pub mod resolver;
pub mod rules;
pub mod scope;
pub mod utils;
pub mod version;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
