//! Version ordering and merge policies for logical dependencies.
//!
//! Managers accumulate requests for the same logical dependency (a coordinate without
//! its version) from many modules. When those requests disagree, the manager's
//! [`ConflictPolicy`] decides the outcome:
//!
//! | Policy | Behavior |
//! |--------|----------|
//! | `highest` | Greatest requested version wins, a warning is logged |
//! | `fail` | Any disagreement is a [`VersionConflict`] |
//! | `highest-compatible` | Greatest version wins when all requests share a major version, otherwise a [`VersionConflict`] |
//!
//! Host ecosystems rarely use strict semver (`1.6`, `19.0`, `28.0-android`), so
//! [`compare_versions`] pads short versions before handing them to [`semver`] and
//! falls back to a numeric-aware segment comparison when that still fails.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::core::{BuildError, Result};

/// How a manager reconciles different requested versions of one dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    #[default]
    Highest,
    Fail,
    HighestCompatible,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Highest => "highest",
            Self::Fail => "fail",
            Self::HighestCompatible => "highest-compatible",
        };
        f.write_str(name)
    }
}

/// One requested version and the modules asking for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictingRequest {
    pub version: String,
    pub requested_by: Vec<String>,
}

/// Requests for one logical dependency that a policy refused to merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConflict {
    pub logical_id: String,
    pub policy: ConflictPolicy,
    pub requests: Vec<ConflictingRequest>,
}

impl fmt::Display for VersionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version conflict for '{}' (policy: {}):", self.logical_id, self.policy)?;
        for request in &self.requests {
            write!(f, "\n  - {} requested by {}", request.version, request.requested_by.join(", "))?;
        }
        Ok(())
    }
}

/// Outcome of applying a policy to a set of requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub version: String,
    /// Versions that were requested but lost to `version`.
    pub overridden: Vec<String>,
}

/// Choose one version out of `requests` (version -> requesters) under `policy`.
///
/// `requests` must not be empty.
pub fn select_version(
    logical_id: &str,
    requests: &BTreeMap<String, BTreeSet<String>>,
    policy: ConflictPolicy,
) -> Result<Selection> {
    let mut versions: Vec<&String> = requests.keys().collect();
    versions.sort_by(|a, b| compare_versions(a, b));

    let Some(highest) = versions.last().map(|v| (*v).clone()) else {
        return Err(BuildError::protocol(
            "version selection",
            format!("no versions requested for '{logical_id}'"),
        ));
    };

    if versions.len() == 1 {
        return Ok(Selection {
            version: highest,
            overridden: Vec::new(),
        });
    }

    let conflict = || {
        BuildError::VersionConflict(Box::new(VersionConflict {
            logical_id: logical_id.to_string(),
            policy,
            requests: versions
                .iter()
                .map(|version| ConflictingRequest {
                    version: (*version).clone(),
                    requested_by: requests[*version].iter().cloned().collect(),
                })
                .collect(),
        }))
    };

    match policy {
        ConflictPolicy::Fail => return Err(conflict()),
        ConflictPolicy::HighestCompatible => {
            let majors: BTreeSet<&str> = versions.iter().map(|v| major_component(v)).collect();
            if majors.len() > 1 {
                return Err(conflict());
            }
        }
        ConflictPolicy::Highest => {}
    }

    let overridden: Vec<String> =
        versions[..versions.len() - 1].iter().map(|v| (*v).clone()).collect();
    tracing::warn!(
        target: "manager",
        "{} requested at {} versions; using {} (policy: {}, overridden: {})",
        logical_id,
        versions.len(),
        highest,
        policy,
        overridden.join(", ")
    );

    Ok(Selection {
        version: highest,
        overridden,
    })
}

/// Total order over version strings, semver-aware where possible.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_lenient(a), parse_lenient(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        _ => compare_segments(a, b),
    }
}

fn parse_lenient(version: &str) -> Option<Version> {
    let trimmed = version.strip_prefix('v').unwrap_or(version);
    if let Ok(parsed) = Version::parse(trimmed) {
        return Some(parsed);
    }

    // Pad "1" / "1.6" (optionally followed by a pre-release) to three components
    let (core, rest) = match trimmed.find('-') {
        Some(idx) => trimmed.split_at(idx),
        None => (trimmed, ""),
    };
    let parts = core.split('.').count();
    if parts >= 3 || core.is_empty() {
        return None;
    }
    let padded = format!("{core}{}{rest}", ".0".repeat(3 - parts));
    Version::parse(&padded).ok()
}

fn compare_segments(a: &str, b: &str) -> Ordering {
    let split = |s: &str| -> Vec<String> {
        s.split(['.', '-', '_']).map(str::to_string).collect()
    };
    let (sa, sb) = (split(a), split(b));

    for (x, y) in sa.iter().zip(sb.iter()) {
        let ordering = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(nx), Ok(ny)) => nx.cmp(&ny),
            (Ok(_), Err(_)) => Ordering::Greater,
            (Err(_), Ok(_)) => Ordering::Less,
            (Err(_), Err(_)) => x.cmp(y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    sa.len().cmp(&sb.len())
}

fn major_component(version: &str) -> &str {
    let trimmed = version.strip_prefix('v').unwrap_or(version);
    trimmed.split(['.', '-']).next().unwrap_or(trimmed)
}
