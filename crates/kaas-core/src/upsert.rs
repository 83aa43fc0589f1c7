//! Idempotent create-or-update of resource definitions

use crate::builder::ResourceDefinition;
use crate::cluster::{ClusterError, ControlPlane};
use crate::error::OrchestratorError;
use crate::models::{AppliedResource, UpsertOutcome};
use crate::observability::OrchestratorMetrics;
use crate::retry::{RetryError, RetryPolicy};
use std::sync::Arc;
use tracing::{debug, info};

/// Applies definitions so that the cluster converges to them.
///
/// A create that conflicts is followed by an update of the same object.
/// Retryable failures of either call are reissued under the retry policy;
/// the budget is shared by the create and the update.
#[derive(Clone)]
pub struct UpsertEngine {
    control_plane: Arc<dyn ControlPlane>,
    retry: RetryPolicy,
    metrics: OrchestratorMetrics,
}

impl UpsertEngine {
    pub fn new(control_plane: Arc<dyn ControlPlane>, retry: RetryPolicy) -> Self {
        Self {
            control_plane,
            retry,
            metrics: OrchestratorMetrics::new(),
        }
    }

    /// Apply one definition and report whether it was created or updated
    pub async fn apply(
        &self,
        definition: &ResourceDefinition,
    ) -> Result<AppliedResource, OrchestratorError> {
        let kind = definition.kind();
        let name = definition.name().to_string();

        let result = self
            .retry
            .run(ClusterError::is_retryable, || self.apply_once(definition))
            .await;

        match result {
            Ok((outcome, attempts)) => {
                self.metrics.add_apply_retries(attempts);
                self.metrics.inc_resource_applied(kind, outcome);
                info!(
                    kind = %kind,
                    name = %name,
                    namespace = definition.namespace(),
                    outcome = ?outcome,
                    attempts,
                    "Applied resource"
                );
                Ok(AppliedResource {
                    kind,
                    name,
                    outcome,
                })
            }
            Err(RetryError { error, attempts }) => {
                self.metrics.add_apply_retries(attempts);
                self.metrics.inc_apply_failure(kind);
                if error.is_retryable() {
                    Err(OrchestratorError::RetriesExhausted {
                        kind,
                        name,
                        attempts,
                        source: error,
                    })
                } else {
                    Err(OrchestratorError::ControlPlane {
                        kind,
                        name,
                        source: error,
                    })
                }
            }
        }
    }

    async fn apply_once(
        &self,
        definition: &ResourceDefinition,
    ) -> Result<UpsertOutcome, ClusterError> {
        match self.control_plane.create(definition).await {
            Ok(()) => Ok(UpsertOutcome::Created),
            Err(ClusterError::Conflict(_)) => {
                debug!(
                    kind = %definition.kind(),
                    name = definition.name(),
                    "Object exists, updating in place"
                );
                self.control_plane.update(definition).await?;
                Ok(UpsertOutcome::Updated)
            }
            Err(err) => Err(err),
        }
    }
}
