//! In-process control plane
//!
//! Behaves like the API server for the calls the orchestrator makes: creating
//! an existing object conflicts, updating a missing one is not found. Failures
//! can be queued per kind to exercise retry and error paths.

use super::{async_trait, ClusterError, ControlPlane};
use crate::builder::ResourceDefinition;
use crate::models::ResourceKind;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// A call observed by [`InMemoryControlPlane`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPlaneCall {
    Create { kind: ResourceKind, name: String },
    Update { kind: ResourceKind, name: String },
    ReadWorkload { name: String },
    ListWorkloads,
    ListPods,
}

type ObjectKey = (ResourceKind, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, ResourceDefinition>,
    pods: BTreeMap<(String, String), Pod>,
    create_failures: HashMap<ResourceKind, VecDeque<ClusterError>>,
    update_failures: HashMap<ResourceKind, VecDeque<ClusterError>>,
    list_failures: VecDeque<ClusterError>,
    calls: Vec<ControlPlaneCall>,
}

#[derive(Default)]
pub struct InMemoryControlPlane {
    state: Mutex<State>,
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue errors returned by the next `create` calls for `kind`
    pub fn script_create_failures(&self, kind: ResourceKind, errors: Vec<ClusterError>) {
        self.state()
            .create_failures
            .entry(kind)
            .or_default()
            .extend(errors);
    }

    /// Queue errors returned by the next `update` calls for `kind`
    pub fn script_update_failures(&self, kind: ResourceKind, errors: Vec<ClusterError>) {
        self.state()
            .update_failures
            .entry(kind)
            .or_default()
            .extend(errors);
    }

    /// Queue errors returned by the next list or read calls
    pub fn script_list_failures(&self, errors: Vec<ClusterError>) {
        self.state().list_failures.extend(errors);
    }

    /// Store a workload directly, status included
    pub fn insert_workload(&self, workload: Deployment) {
        let definition = ResourceDefinition::Workload(workload);
        let key = key_of(&definition);
        self.state().objects.insert(key, definition);
    }

    pub fn insert_pod(&self, pod: Pod) {
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        let name = pod.metadata.name.clone().unwrap_or_default();
        self.state().pods.insert((namespace, name), pod);
    }

    pub fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<ResourceDefinition> {
        self.state()
            .objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn count(&self, kind: ResourceKind) -> usize {
        self.state().objects.keys().filter(|(k, _, _)| *k == kind).count()
    }

    pub fn calls(&self) -> Vec<ControlPlaneCall> {
        self.state().calls.clone()
    }

    /// Kinds of the create calls, in call order
    pub fn created_kinds(&self) -> Vec<ResourceKind> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                ControlPlaneCall::Create { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect()
    }

    fn take_list_failure(state: &mut State) -> Result<(), ClusterError> {
        match state.list_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn key_of(definition: &ResourceDefinition) -> ObjectKey {
    (
        definition.kind(),
        definition.namespace().to_string(),
        definition.name().to_string(),
    )
}

fn describe(key: &ObjectKey) -> String {
    format!("{} {}/{}", key.0, key.1, key.2)
}

/// Parse a `k=v,k=v` selector; malformed terms are ignored
fn parse_selector(selector: &str) -> Vec<(&str, &str)> {
    selector
        .split(',')
        .filter_map(|term| term.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

fn matches_selector(pod: &Pod, terms: &[(&str, &str)]) -> bool {
    let labels = pod.metadata.labels.as_ref();
    terms.iter().all(|(key, value)| {
        labels
            .and_then(|l| l.get(*key))
            .map(|v| v == value)
            .unwrap_or(false)
    })
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn create(&self, definition: &ResourceDefinition) -> Result<(), ClusterError> {
        let mut state = self.state();
        let kind = definition.kind();
        state.calls.push(ControlPlaneCall::Create {
            kind,
            name: definition.name().to_string(),
        });

        if let Some(err) = state.create_failures.get_mut(&kind).and_then(VecDeque::pop_front) {
            return Err(err);
        }

        let key = key_of(definition);
        if state.objects.contains_key(&key) {
            return Err(ClusterError::Conflict(describe(&key)));
        }
        state.objects.insert(key, definition.clone());
        Ok(())
    }

    async fn update(&self, definition: &ResourceDefinition) -> Result<(), ClusterError> {
        let mut state = self.state();
        let kind = definition.kind();
        state.calls.push(ControlPlaneCall::Update {
            kind,
            name: definition.name().to_string(),
        });

        if let Some(err) = state.update_failures.get_mut(&kind).and_then(VecDeque::pop_front) {
            return Err(err);
        }

        let key = key_of(definition);
        let existing = state
            .objects
            .get(&key)
            .ok_or_else(|| ClusterError::NotFound(describe(&key)))?;

        let mut updated = definition.clone();
        // status is owned by the server and survives a patch
        if let (ResourceDefinition::Workload(old), ResourceDefinition::Workload(new)) =
            (existing, &mut updated)
        {
            new.status = old.status.clone();
        }
        state.objects.insert(key, updated);
        Ok(())
    }

    async fn read_workload(&self, namespace: &str, name: &str) -> Result<Deployment, ClusterError> {
        let mut state = self.state();
        state.calls.push(ControlPlaneCall::ReadWorkload {
            name: name.to_string(),
        });
        Self::take_list_failure(&mut state)?;

        let key = (ResourceKind::Workload, namespace.to_string(), name.to_string());
        match state.objects.get(&key) {
            Some(ResourceDefinition::Workload(workload)) => Ok(workload.clone()),
            _ => Err(ClusterError::NotFound(describe(&key))),
        }
    }

    async fn list_workloads(&self, namespace: &str) -> Result<Vec<Deployment>, ClusterError> {
        let mut state = self.state();
        state.calls.push(ControlPlaneCall::ListWorkloads);
        Self::take_list_failure(&mut state)?;

        Ok(state
            .objects
            .iter()
            .filter(|((_, ns, _), _)| ns == namespace)
            .filter_map(|(_, definition)| match definition {
                ResourceDefinition::Workload(workload) => Some(workload.clone()),
                _ => None,
            })
            .collect())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<Pod>, ClusterError> {
        let mut state = self.state();
        state.calls.push(ControlPlaneCall::ListPods);
        Self::take_list_failure(&mut state)?;

        let terms = label_selector.map(parse_selector).unwrap_or_default();
        Ok(state
            .pods
            .iter()
            .filter(|((ns, _), pod)| ns == namespace && matches_selector(pod, &terms))
            .map(|(_, pod)| pod.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn config_map(name: &str) -> ResourceDefinition {
        ResourceDefinition::ConfigMap(ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        })
    }

    fn pod(name: &str, labels: &[(&str, &str)]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..ObjectMeta::default()
            },
            ..Pod::default()
        }
    }

    #[tokio::test]
    async fn test_create_twice_conflicts() {
        let plane = InMemoryControlPlane::new();
        plane.create(&config_map("cfg")).await.unwrap();

        let err = plane.create(&config_map("cfg")).await.unwrap_err();
        assert!(matches!(err, ClusterError::Conflict(_)));
        assert_eq!(plane.count(ResourceKind::ConfigMap), 1);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let plane = InMemoryControlPlane::new();
        let err = plane.update(&config_map("cfg")).await.unwrap_err();
        assert!(matches!(err, ClusterError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed_in_order() {
        let plane = InMemoryControlPlane::new();
        plane.script_create_failures(
            ResourceKind::ConfigMap,
            vec![ClusterError::Server {
                code: 500,
                message: "etcd".into(),
            }],
        );

        assert!(plane.create(&config_map("cfg")).await.is_err());
        assert!(plane.create(&config_map("cfg")).await.is_ok());
        assert_eq!(plane.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_pod_selector() {
        let plane = InMemoryControlPlane::new();
        plane.insert_pod(pod("a", &[("app", "shop"), ("monitor", "true")]));
        plane.insert_pod(pod("b", &[("app", "shop")]));
        plane.insert_pod(pod("c", &[("app", "cart")]));

        let shop = plane.list_pods("default", Some("app=shop")).await.unwrap();
        assert_eq!(shop.len(), 2);

        let monitored = plane
            .list_pods("default", Some("app=shop,monitor=true"))
            .await
            .unwrap();
        assert_eq!(monitored.len(), 1);

        let all = plane.list_pods("default", None).await.unwrap();
        assert_eq!(all.len(), 3);

        let other_ns = plane.list_pods("kube-system", None).await.unwrap();
        assert!(other_ns.is_empty());
    }
}
