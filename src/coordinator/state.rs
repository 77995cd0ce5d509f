//! Generation phases and the persisted state file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::{BuildError, Result};
use crate::utils::fs::atomic_write;

/// Phase of one generation pass. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationState {
    Uninitialized,
    Accumulating,
    Finalizing,
    Finalized,
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Accumulating => "accumulating",
            Self::Finalizing => "finalizing",
            Self::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// Per-manager lifecycle, tracked by the coordinator independently of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManagerLifecycle {
    Accumulating,
    Finalized,
    Failed,
}

/// Contents of `.buckforge/state/STATE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFile {
    pub generated_at: DateTime<Utc>,
    pub buckforge_version: String,
    pub modules: usize,
    pub rule_files: Vec<PathBuf>,
    /// Cache category -> number of cached artifacts.
    pub categories: BTreeMap<String, usize>,
}

impl StateFile {
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| BuildError::io("serializing state file", std::io::Error::other(e)))?;
        atomic_write(path, &json).map_err(|e| BuildError::io(format!("writing {}", path.display()), e))
    }

    pub fn read(path: &Path) -> Result<Option<Self>> {
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| BuildError::io(format!("parsing {}", path.display()), std::io::Error::other(e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BuildError::io(format!("reading {}", path.display()), e)),
        }
    }
}
