//! Cluster control-plane access
//!
//! The orchestrator talks to the cluster through the [`ControlPlane`] trait.
//! [`KubeControlPlane`] is backed by a live API server; [`InMemoryControlPlane`]
//! keeps objects in process and is used by tests and local development.

mod kube_client;
mod memory;

pub use kube_client::KubeControlPlane;
pub use memory::{ControlPlaneCall, InMemoryControlPlane};

use crate::builder::ResourceDefinition;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use thiserror::Error;

pub use async_trait::async_trait;

/// Failure classes reported by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    /// The object already exists
    #[error("already exists: {0}")]
    Conflict(String),

    /// The object does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Transient server-side failure
    #[error("server error {code}: {message}")]
    Server { code: u16, message: String },

    /// Anything else: rejected payloads, auth failures, transport errors
    #[error("{0}")]
    Other(String),
}

impl ClusterError {
    /// Whether the failing call may succeed if issued again
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClusterError::Server { .. })
    }
}

/// Operations the orchestrator needs from the cluster
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Create the object; fails with [`ClusterError::Conflict`] if it exists
    async fn create(&self, definition: &ResourceDefinition) -> Result<(), ClusterError>;

    /// Replace the mutable fields of an existing object
    async fn update(&self, definition: &ResourceDefinition) -> Result<(), ClusterError>;

    async fn read_workload(&self, namespace: &str, name: &str) -> Result<Deployment, ClusterError>;

    async fn list_workloads(&self, namespace: &str) -> Result<Vec<Deployment>, ClusterError>;

    /// List pods, optionally filtered by a `k=v,k=v` label selector
    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<Pod>, ClusterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_server_errors_are_retryable() {
        assert!(ClusterError::Server {
            code: 500,
            message: "boom".into()
        }
        .is_retryable());
        assert!(!ClusterError::Conflict("x".into()).is_retryable());
        assert!(!ClusterError::NotFound("x".into()).is_retryable());
        assert!(!ClusterError::Other("forbidden".into()).is_retryable());
    }
}
