//! Error taxonomy surfaced by the provisioner and status aggregator

use crate::cluster::ClusterError;
use crate::history::HistoryError;
use crate::models::ResourceKind;
use thiserror::Error;

/// Errors returned to callers of the orchestrator operations.
///
/// Conflicts never show up here: they are resolved by the upsert engine and
/// reported as [`crate::UpsertOutcome::Updated`]. Probe failures never show up
/// here either; the watchdog records them as history.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The request was malformed or incomplete. No cluster call was made.
    #[error("invalid application spec: {0}")]
    Validation(String),

    /// The named object does not exist in the namespace.
    #[error("{kind} '{name}' not found in namespace '{namespace}'")]
    NotFound {
        kind: ResourceKind,
        name: String,
        namespace: String,
    },

    /// A retryable control-plane failure persisted through every attempt.
    #[error("applying {kind} '{name}' failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        kind: ResourceKind,
        name: String,
        attempts: u32,
        #[source]
        source: ClusterError,
    },

    /// A non-retryable control-plane failure.
    #[error("control plane rejected {kind} '{name}': {source}")]
    ControlPlane {
        kind: ResourceKind,
        name: String,
        #[source]
        source: ClusterError,
    },

    /// The health history store failed.
    #[error(transparent)]
    History(#[from] HistoryError),
}

impl OrchestratorError {
    pub fn validation(message: impl Into<String>) -> Self {
        OrchestratorError::Validation(message.into())
    }

    /// True for the fatal control-plane classes (non-retryable or exhausted)
    pub fn is_fatal_control_plane(&self) -> bool {
        matches!(
            self,
            OrchestratorError::RetriesExhausted { .. } | OrchestratorError::ControlPlane { .. }
        )
    }
}
