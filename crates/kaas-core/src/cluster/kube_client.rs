//! Control plane backed by a Kubernetes API server

use super::{async_trait, ClusterError, ControlPlane};
use crate::builder::ResourceDefinition;
use crate::models::DEFAULT_NAMESPACE;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::debug;

/// [`ControlPlane`] implementation using a `kube` client
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
}

impl KubeControlPlane {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using in-cluster config or the local kubeconfig
    pub async fn try_default() -> Result<Self, ClusterError> {
        let client = Client::try_default().await.map_err(classify)?;
        Ok(Self::new(client))
    }

    fn api_for<K>(&self, object: &K) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        let namespace = object.meta().namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn create_object<K>(&self, object: &K) -> Result<(), ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        <K as Resource>::DynamicType: Default,
    {
        self.api_for(object)
            .create(&PostParams::default(), object)
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn update_object<K>(&self, object: &K) -> Result<(), ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let name = object.meta().name.clone().unwrap_or_default();
        self.api_for(object)
            .patch(&name, &PatchParams::default(), &Patch::Merge(object))
            .await
            .map(|_| ())
            .map_err(classify)
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn create(&self, definition: &ResourceDefinition) -> Result<(), ClusterError> {
        debug!(kind = %definition.kind(), name = definition.name(), "Creating object");
        match definition {
            ResourceDefinition::Secret(o) => self.create_object(o).await,
            ResourceDefinition::ConfigMap(o) => self.create_object(o).await,
            ResourceDefinition::Service(o) => self.create_object(o).await,
            ResourceDefinition::Workload(o) => self.create_object(o).await,
            ResourceDefinition::Ingress(o) => self.create_object(o).await,
        }
    }

    async fn update(&self, definition: &ResourceDefinition) -> Result<(), ClusterError> {
        debug!(kind = %definition.kind(), name = definition.name(), "Patching object");
        match definition {
            ResourceDefinition::Secret(o) => self.update_object(o).await,
            ResourceDefinition::ConfigMap(o) => self.update_object(o).await,
            ResourceDefinition::Service(o) => self.update_object(o).await,
            ResourceDefinition::Workload(o) => self.update_object(o).await,
            ResourceDefinition::Ingress(o) => self.update_object(o).await,
        }
    }

    async fn read_workload(&self, namespace: &str, name: &str) -> Result<Deployment, ClusterError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.get(name).await.map_err(classify)
    }

    async fn list_workloads(&self, namespace: &str) -> Result<Vec<Deployment>, ClusterError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default()).await.map_err(classify)?;
        Ok(list.items)
    }

    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<Pod>, ClusterError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let list = api.list(&params).await.map_err(classify)?;
        Ok(list.items)
    }
}

/// Map a `kube` error onto the control-plane failure classes
fn classify(err: kube::Error) -> ClusterError {
    match err {
        kube::Error::Api(response) => match response.code {
            409 => ClusterError::Conflict(response.message),
            404 => ClusterError::NotFound(response.message),
            code if code >= 500 => ClusterError::Server {
                code,
                message: response.message,
            },
            code => ClusterError::Other(format!("{} ({})", response.message, code)),
        },
        other => ClusterError::Other(other.to_string()),
    }
}
