//! Pending-requirement bookkeeping shared by all managers.
//!
//! A [`Ledger`] accumulates requests keyed by logical dependency, then version, then
//! requester. It is write-once: [`Ledger::close`] hands the accumulated requests to
//! finalize exactly once, and every later `record` or `close` is a
//! [`ProtocolViolation`](crate::core::BuildError::ProtocolViolation).

use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;

use crate::core::{BuildError, Diagnostic, ErrorCategory, Result};
use crate::version::{ConflictPolicy, select_version};

/// Everyone who asked for one version, plus what the first of them supplied.
#[derive(Debug, Clone)]
pub struct Requested<T> {
    pub requesters: BTreeSet<String>,
    pub payload: T,
}

struct LedgerState<T> {
    finalized: bool,
    requests: BTreeMap<String, BTreeMap<String, Requested<T>>>,
}

pub struct Ledger<T> {
    component: String,
    state: Mutex<LedgerState<T>>,
}

impl<T: Clone + Send> Ledger<T> {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            state: Mutex::new(LedgerState {
                finalized: false,
                requests: BTreeMap::new(),
            }),
        }
    }

    /// Record that `requester` needs `logical_id` at `version`.
    pub async fn record(&self, logical_id: &str, version: &str, requester: &str, payload: T) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.finalized {
            return Err(self.late_register(logical_id, requester));
        }

        state
            .requests
            .entry(logical_id.to_string())
            .or_default()
            .entry(version.to_string())
            .or_insert_with(|| Requested {
                requesters: BTreeSet::new(),
                payload,
            })
            .requesters
            .insert(requester.to_string());
        Ok(())
    }

    /// Fail if the ledger was already closed. For registrations that need nothing.
    pub async fn ensure_open(&self, requester: &str) -> Result<()> {
        if self.state.lock().await.finalized {
            return Err(BuildError::protocol(
                &self.component,
                format!("register from {requester} after finalize"),
            ));
        }
        Ok(())
    }

    /// Close the ledger and take everything recorded.
    pub async fn close(&self) -> Result<Requirements<T>> {
        let mut state = self.state.lock().await;
        if state.finalized {
            return Err(BuildError::protocol(&self.component, "finalize called more than once"));
        }
        state.finalized = true;
        Ok(Requirements {
            requests: std::mem::take(&mut state.requests),
        })
    }

    fn late_register(&self, logical_id: &str, requester: &str) -> BuildError {
        BuildError::protocol(
            &self.component,
            format!("'{logical_id}' registered by {requester} after finalize"),
        )
    }
}

/// One logical dependency after the merge policy ran.
#[derive(Debug, Clone)]
pub struct Selected<T> {
    pub logical_id: String,
    pub version: String,
    /// Requesters of every version, not only the winning one.
    pub requesters: BTreeSet<String>,
    pub payload: T,
}

/// Requests taken out of a closed [`Ledger`].
#[derive(Debug)]
pub struct Requirements<T> {
    requests: BTreeMap<String, BTreeMap<String, Requested<T>>>,
}

impl<T: Clone> Requirements<T> {
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Remove one logical dependency, returning its requests.
    pub fn take(&mut self, logical_id: &str) -> Option<BTreeMap<String, Requested<T>>> {
        self.requests.remove(logical_id)
    }

    /// Every recorded `(logical id, version)` request, including losers.
    pub fn all(&self) -> impl Iterator<Item = (&str, &str, &Requested<T>)> {
        self.requests.iter().flat_map(|(id, versions)| {
            versions
                .iter()
                .map(move |(version, requested)| (id.as_str(), version.as_str(), requested))
        })
    }

    /// Pick one version per logical dependency under `policy`.
    ///
    /// Overrides are reported as diagnostics; unmergeable requests fail with
    /// [`BuildError::VersionConflict`].
    pub fn select(&self, policy: ConflictPolicy) -> Result<(Vec<Selected<T>>, Vec<Diagnostic>)> {
        let mut selected = Vec::with_capacity(self.requests.len());
        let mut diagnostics = Vec::new();

        for (logical_id, versions) in &self.requests {
            let by_version: BTreeMap<String, BTreeSet<String>> = versions
                .iter()
                .map(|(version, requested)| (version.clone(), requested.requesters.clone()))
                .collect();

            let selection = select_version(logical_id, &by_version, policy)?;
            if !selection.overridden.is_empty() {
                diagnostics.push(Diagnostic::new(
                    ErrorCategory::VersionConflict,
                    Some(logical_id.clone()),
                    format!(
                        "selected {} over {} (policy: {policy})",
                        selection.version,
                        selection.overridden.join(", ")
                    ),
                ));
            }

            let Some(winner) = versions.get(&selection.version) else {
                continue;
            };
            selected.push(Selected {
                logical_id: logical_id.clone(),
                version: selection.version.clone(),
                requesters: versions.values().flat_map(|r| r.requesters.iter().cloned()).collect(),
                payload: winner.payload.clone(),
            });
        }

        Ok((selected, diagnostics))
    }

    /// Like [`select`](Self::select), but a pinned version wins outright.
    pub fn select_pinned(
        &self,
        policy: ConflictPolicy,
        pinned: Option<&str>,
    ) -> Result<(Option<String>, Vec<Diagnostic>)> {
        let requested: BTreeSet<&str> = self.all().map(|(_, version, _)| version).collect();

        match pinned {
            Some(pin) => {
                let diagnostics = requested
                    .iter()
                    .filter(|v| **v != pin)
                    .map(|v| {
                        Diagnostic::new(
                            ErrorCategory::VersionConflict,
                            None,
                            format!("requested version {v} replaced by pinned {pin}"),
                        )
                    })
                    .collect();
                Ok((Some(pin.to_string()), diagnostics))
            }
            None => {
                let (selected, diagnostics) = self.select(policy)?;
                Ok((selected.into_iter().next().map(|s| s.version), diagnostics))
            }
        }
    }
}
