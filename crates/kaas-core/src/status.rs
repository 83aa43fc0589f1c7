//! Workload and pod status aggregation

use crate::cluster::{ClusterError, ControlPlane};
use crate::error::OrchestratorError;
use crate::models::{ApplicationStatus, PodStatus, ResourceKind};
use futures::{stream, StreamExt, TryStreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Format used for pod start times
pub const START_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Pod listings in flight at once while aggregating a namespace
pub const MAX_CONCURRENT_POD_LISTS: usize = 8;

/// Joins workloads with the pods their selector matches
#[derive(Clone)]
pub struct StatusAggregator {
    control_plane: Arc<dyn ControlPlane>,
}

impl StatusAggregator {
    pub fn new(control_plane: Arc<dyn ControlPlane>) -> Self {
        Self { control_plane }
    }

    /// Status of one workload
    pub async fn status(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<ApplicationStatus, OrchestratorError> {
        let workload = self
            .control_plane
            .read_workload(namespace, name)
            .await
            .map_err(|err| match err {
                ClusterError::NotFound(_) => OrchestratorError::NotFound {
                    kind: ResourceKind::Workload,
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                },
                other => OrchestratorError::ControlPlane {
                    kind: ResourceKind::Workload,
                    name: name.to_string(),
                    source: other,
                },
            })?;

        self.join(workload, namespace).await
    }

    /// Status of every workload in the namespace, in listing order.
    ///
    /// Workloads and pods are read with separate calls, so the view is not a
    /// consistent snapshot of the namespace.
    pub async fn all_applications(
        &self,
        namespace: &str,
    ) -> Result<Vec<ApplicationStatus>, OrchestratorError> {
        let workloads = self
            .control_plane
            .list_workloads(namespace)
            .await
            .map_err(|source| OrchestratorError::ControlPlane {
                kind: ResourceKind::Workload,
                name: "*".to_string(),
                source,
            })?;

        debug!(namespace = %namespace, workloads = workloads.len(), "Aggregating status");
        stream::iter(workloads)
            .map(|workload| self.join(workload, namespace))
            .buffered(MAX_CONCURRENT_POD_LISTS)
            .try_collect()
            .await
    }

    async fn join(
        &self,
        workload: Deployment,
        namespace: &str,
    ) -> Result<ApplicationStatus, OrchestratorError> {
        let name = workload.metadata.name.clone().unwrap_or_default();
        let declared_replicas = workload
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(1);
        let ready_replicas = workload
            .status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0);

        let pods = match selector_for(&workload) {
            Some(selector) => self
                .control_plane
                .list_pods(namespace, Some(&selector))
                .await
                .map_err(|source| OrchestratorError::ControlPlane {
                    kind: ResourceKind::Workload,
                    name: name.clone(),
                    source,
                })?,
            None => Vec::new(),
        };

        Ok(ApplicationStatus {
            name,
            declared_replicas,
            ready_replicas,
            pods: pods.iter().map(pod_status).collect(),
        })
    }
}

/// Equality selector built from the workload's matchLabels, if it has any
pub fn selector_for(workload: &Deployment) -> Option<String> {
    let labels: &BTreeMap<String, String> = workload
        .spec
        .as_ref()?
        .selector
        .match_labels
        .as_ref()?;

    if labels.is_empty() {
        return None;
    }

    Some(
        labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(","),
    )
}

fn pod_status(pod: &Pod) -> PodStatus {
    let status = pod.status.as_ref();
    PodStatus {
        name: pod.metadata.name.clone().unwrap_or_default(),
        phase: status.and_then(|s| s.phase.clone()).unwrap_or_default(),
        host_address: status.and_then(|s| s.host_ip.clone()).unwrap_or_default(),
        pod_address: status.and_then(|s| s.pod_ip.clone()).unwrap_or_default(),
        start_time: status
            .and_then(|s| s.start_time.as_ref())
            .map(|t| t.0.format(START_TIME_FORMAT).to_string())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ResourceDefinition;
    use crate::cluster::{async_trait, InMemoryControlPlane};
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};
    use k8s_openapi::api::core::v1::PodStatus as K8sPodStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, Time};

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn workload(name: &str, replicas: i32, ready: Option<i32>, selector: &[(&str, &str)]) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                selector: LabelSelector {
                    match_labels: Some(labels(selector)),
                    ..LabelSelector::default()
                },
                ..DeploymentSpec::default()
            }),
            status: Some(DeploymentStatus {
                ready_replicas: ready,
                ..DeploymentStatus::default()
            }),
        }
    }

    fn pod(name: &str, app: &str, ip: Option<&str>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                labels: Some(labels(&[("app", app)])),
                ..ObjectMeta::default()
            },
            status: Some(K8sPodStatus {
                phase: Some("Running".to_string()),
                host_ip: Some("10.0.0.1".to_string()),
                pod_ip: ip.map(str::to_string),
                start_time: Some(Time(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())),
                ..K8sPodStatus::default()
            }),
            ..Pod::default()
        }
    }

    #[tokio::test]
    async fn test_status_joins_pods() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.insert_workload(workload("shop-deployment", 3, Some(2), &[("app", "shop")]));
        plane.insert_pod(pod("shop-1", "shop", Some("10.1.0.7")));
        plane.insert_pod(pod("shop-2", "shop", None));
        plane.insert_pod(pod("cart-1", "cart", Some("10.1.0.9")));

        let status = StatusAggregator::new(plane)
            .status("shop-deployment", "default")
            .await
            .unwrap();

        assert_eq!(status.declared_replicas, 3);
        assert_eq!(status.ready_replicas, 2);
        assert_eq!(status.pods.len(), 2);
        assert_eq!(status.pods[0].start_time, "2024-01-01T00:00:00Z");
        assert_eq!(status.pods[0].pod_address, "10.1.0.7");
        assert_eq!(status.pods[1].pod_address, "");
    }

    #[tokio::test]
    async fn test_missing_ready_replicas_is_zero() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.insert_workload(workload("shop-deployment", 2, None, &[("app", "shop")]));

        let status = StatusAggregator::new(plane)
            .status("shop-deployment", "default")
            .await
            .unwrap();
        assert_eq!(status.ready_replicas, 0);
        assert!(status.pods.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_workload_is_not_found() {
        let plane = Arc::new(InMemoryControlPlane::new());
        let err = StatusAggregator::new(plane)
            .status("ghost", "default")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_selector_matches_no_pods() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.insert_workload(workload("bare", 1, Some(1), &[]));
        plane.insert_pod(pod("shop-1", "shop", Some("10.1.0.7")));

        let status = StatusAggregator::new(plane)
            .status("bare", "default")
            .await
            .unwrap();
        assert!(status.pods.is_empty());
    }

    #[tokio::test]
    async fn test_all_applications_keeps_listing_order() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.insert_workload(workload("a-deployment", 1, Some(1), &[("app", "a")]));
        plane.insert_workload(workload("b-deployment", 2, Some(0), &[("app", "b")]));
        plane.insert_pod(pod("b-1", "b", None));

        let statuses = StatusAggregator::new(plane)
            .all_applications("default")
            .await
            .unwrap();

        let names: Vec<&str> = statuses.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a-deployment", "b-deployment"]);
        assert_eq!(statuses[1].pods.len(), 1);
    }

    /// Counts how many pod listings overlap
    struct SlowPods {
        inner: InMemoryControlPlane,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ControlPlane for SlowPods {
        async fn create(&self, definition: &ResourceDefinition) -> Result<(), ClusterError> {
            self.inner.create(definition).await
        }

        async fn update(&self, definition: &ResourceDefinition) -> Result<(), ClusterError> {
            self.inner.update(definition).await
        }

        async fn read_workload(&self, namespace: &str, name: &str) -> Result<Deployment, ClusterError> {
            self.inner.read_workload(namespace, name).await
        }

        async fn list_workloads(&self, namespace: &str) -> Result<Vec<Deployment>, ClusterError> {
            self.inner.list_workloads(namespace).await
        }

        async fn list_pods(
            &self,
            namespace: &str,
            label_selector: Option<&str>,
        ) -> Result<Vec<Pod>, ClusterError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.list_pods(namespace, label_selector).await
        }
    }

    #[tokio::test]
    async fn test_all_applications_bounds_pod_listings() {
        let inner = InMemoryControlPlane::new();
        let apps: Vec<String> = (0..20).map(|i| format!("app{:02}", i)).collect();
        for app in &apps {
            inner.insert_workload(workload(
                &format!("{}-deployment", app),
                1,
                Some(1),
                &[("app", app.as_str())],
            ));
        }
        let plane = Arc::new(SlowPods {
            inner,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });

        let statuses = StatusAggregator::new(plane.clone())
            .all_applications("default")
            .await
            .unwrap();

        assert_eq!(statuses.len(), 20);
        assert_eq!(statuses[0].name, "app00-deployment");
        assert_eq!(statuses[19].name, "app19-deployment");
        let peak = plane.peak.load(Ordering::SeqCst);
        assert!(peak > 1, "listings should overlap, peak was {}", peak);
        assert!(peak <= MAX_CONCURRENT_POD_LISTS, "peak was {}", peak);
    }

    #[tokio::test]
    async fn test_list_failure_is_control_plane_error() {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.script_list_failures(vec![ClusterError::Other("forbidden".to_string())]);

        let err = StatusAggregator::new(plane)
            .all_applications("default")
            .await
            .unwrap_err();
        assert!(err.is_fatal_control_plane());
    }
}
