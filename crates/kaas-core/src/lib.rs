//! Core library for the KaaS application orchestrator
//!
//! This crate provides the core functionality for:
//! - Translating application specs into Kubernetes resource definitions
//! - Idempotent create-or-update of those definitions with bounded retry
//! - Provisioning full and predefined applications in dependency order
//! - Aggregating workload and pod status
//! - Probing monitored pods and keeping a rolling health history
//! - Health checks and observability for the service itself

pub mod builder;
pub mod cluster;
pub mod error;
pub mod health;
pub mod history;
pub mod models;
pub mod observability;
pub mod provisioner;
pub mod retry;
pub mod status;
pub mod upsert;
pub mod watchdog;

pub use builder::{ApplicationPlan, DefinitionBuilder, PredefinedTemplate, ResourceDefinition};
pub use cluster::{ClusterError, ControlPlane, InMemoryControlPlane, KubeControlPlane};
pub use error::OrchestratorError;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use history::{HistoryError, HistoryStore, InMemoryHistoryStore, PgHistoryStore};
pub use models::*;
pub use observability::{OrchestratorMetrics, StructuredLogger};
pub use provisioner::{ApplyOrder, Provisioner};
pub use retry::RetryPolicy;
pub use status::StatusAggregator;
pub use upsert::UpsertEngine;
pub use watchdog::{HealthProber, HttpProber, Watchdog, WatchdogConfig};
