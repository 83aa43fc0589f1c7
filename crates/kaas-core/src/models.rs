//! Core data models for the orchestrator
//!
//! Request payloads keep the PascalCase field names the deployment API has
//! always accepted; persisted history rows use snake_case column names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_IMAGE_TAG: &str = "latest";
pub const DEFAULT_NAMESPACE: &str = "default";

fn default_replicas() -> i32 {
    1
}

fn default_image_tag() -> String {
    DEFAULT_IMAGE_TAG.to_string()
}

/// Declarative description of an application to provision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApplicationSpec {
    pub app_name: String,
    #[serde(default = "default_replicas")]
    pub replicas: i32,
    #[serde(default)]
    pub image_address: String,
    #[serde(default = "default_image_tag")]
    pub image_tag: String,
    #[serde(default)]
    pub resources: ResourceRequests,
    #[serde(default)]
    pub envs: Vec<EnvironmentBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_port: Option<i32>,
    /// Target namespace, falls back to the server default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Opt the pods into health watchdog probing
    #[serde(default)]
    pub monitor: bool,
}

impl ApplicationSpec {
    /// Minimal spec with the required fields set
    pub fn new(app_name: impl Into<String>, image_address: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            replicas: default_replicas(),
            image_address: image_address.into(),
            image_tag: default_image_tag(),
            resources: ResourceRequests::default(),
            envs: Vec::new(),
            domain_address: None,
            service_port: None,
            namespace: None,
            monitor: false,
        }
    }

    /// Full image reference, `address:tag`
    pub fn image(&self) -> String {
        format!("{}:{}", self.image_address, self.image_tag)
    }
}

/// CPU and memory quantities, e.g. `250m` and `256Mi`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceRequests {
    #[serde(rename = "CPU", default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(rename = "RAM", default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl ResourceRequests {
    pub fn new(cpu: impl Into<String>, memory: impl Into<String>) -> Self {
        Self {
            cpu: Some(cpu.into()),
            memory: Some(memory.into()),
        }
    }
}

/// One environment entry for the application container
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvironmentBinding {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub is_secret: bool,
}

impl EnvironmentBinding {
    pub fn plain(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            is_secret: false,
        }
    }

    pub fn secret(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            is_secret: true,
        }
    }
}

/// Request for the templated (predefined) application flow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PredefinedAppSpec {
    pub app_name: String,
    /// Expose through a LoadBalancer instead of a ClusterIP service
    #[serde(default)]
    pub external: bool,
    #[serde(default)]
    pub resources: ResourceRequests,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Kinds of cluster objects the orchestrator manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Secret,
    ConfigMap,
    Service,
    Workload,
    Ingress,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Secret => "Secret",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Service => "Service",
            ResourceKind::Workload => "Workload",
            ResourceKind::Ingress => "Ingress",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an upsert converged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    /// The object did not exist and was created
    Created,
    /// The object already existed and was updated in place
    Updated,
}

/// Result of applying one resource definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedResource {
    pub kind: ResourceKind,
    pub name: String,
    pub outcome: UpsertOutcome,
}

/// Result of a provisioning flow, in application order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedResult {
    pub application: String,
    pub namespace: String,
    pub resources: Vec<AppliedResource>,
}

impl AppliedResult {
    /// Name of the workload created by the flow, if any
    pub fn workload_name(&self) -> Option<&str> {
        self.resources
            .iter()
            .find(|r| r.kind == ResourceKind::Workload)
            .map(|r| r.name.as_str())
    }
}

/// Aggregated runtime status of one workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationStatus {
    #[serde(rename = "DeploymentName")]
    pub name: String,
    #[serde(rename = "Replicas")]
    pub declared_replicas: i32,
    #[serde(rename = "ReadyReplicas")]
    pub ready_replicas: i32,
    #[serde(rename = "PodStatuses")]
    pub pods: Vec<PodStatus>,
}

/// Status of one pod owned by a workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatus {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Phase")]
    pub phase: String,
    #[serde(rename = "HostIP")]
    pub host_address: String,
    #[serde(rename = "PodIP")]
    pub pod_address: String,
    #[serde(rename = "StartTime")]
    pub start_time: String,
}

/// Result of a single health probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success,
    Failure { reason: String },
}

impl ProbeOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        ProbeOutcome::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success)
    }
}

/// Rolling probe counters for one monitored target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HealthRecord {
    pub app_name: String,
    pub failure_count: i32,
    pub success_count: i32,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl HealthRecord {
    /// Row seeded from the first probe result for `app_name`
    pub fn first(app_name: impl Into<String>, outcome: &ProbeOutcome, at: DateTime<Utc>) -> Self {
        let mut record = Self {
            app_name: app_name.into(),
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            last_success: None,
            created_at: at,
        };
        record.apply(outcome, at);
        record
    }

    /// Count one more probe result
    pub fn apply(&mut self, outcome: &ProbeOutcome, at: DateTime<Utc>) {
        if outcome.is_success() {
            self.success_count += 1;
            self.last_success = Some(at);
        } else {
            self.failure_count += 1;
            self.last_failure = Some(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_spec_defaults_from_json() {
        let spec: ApplicationSpec = serde_json::from_str(
            r#"{"AppName": "Shop", "ImageAddress": "registry/shop", "Resources": {"CPU": "100m", "RAM": "128Mi"}}"#,
        )
        .unwrap();

        assert_eq!(spec.replicas, 1);
        assert_eq!(spec.image(), "registry/shop:latest");
        assert_eq!(spec.resources.cpu.as_deref(), Some("100m"));
        assert!(spec.envs.is_empty());
        assert!(!spec.monitor);
    }

    #[test]
    fn test_missing_resources_deserialize_as_none() {
        let spec: ApplicationSpec =
            serde_json::from_str(r#"{"AppName": "Shop", "ImageAddress": "registry/shop"}"#)
                .unwrap();

        assert!(spec.resources.cpu.is_none());
        assert!(spec.resources.memory.is_none());
    }

    #[test]
    fn test_status_serializes_with_api_field_names() {
        let status = ApplicationStatus {
            name: "shop-deployment".to_string(),
            declared_replicas: 2,
            ready_replicas: 1,
            pods: vec![PodStatus {
                name: "shop-1".to_string(),
                phase: "Running".to_string(),
                host_address: "10.0.0.1".to_string(),
                pod_address: "10.1.0.7".to_string(),
                start_time: "2024-01-01T00:00:00Z".to_string(),
            }],
        };

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["DeploymentName"], "shop-deployment");
        assert_eq!(json["ReadyReplicas"], 1);
        assert_eq!(json["PodStatuses"][0]["PodIP"], "10.1.0.7");
    }

    #[test]
    fn test_health_record_counts_one_side_per_result() {
        let t0 = Utc::now();
        let mut record = HealthRecord::first("shop-1", &ProbeOutcome::failure("refused"), t0);
        assert_eq!((record.failure_count, record.success_count), (1, 0));
        assert_eq!(record.last_failure, Some(t0));
        assert!(record.last_success.is_none());

        let t1 = t0 + chrono::Duration::seconds(30);
        record.apply(&ProbeOutcome::Success, t1);
        assert_eq!((record.failure_count, record.success_count), (1, 1));
        assert_eq!(record.last_failure, Some(t0));
        assert_eq!(record.last_success, Some(t1));
        assert_eq!(record.created_at, t0);
    }
}
