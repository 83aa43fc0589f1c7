//! Resource definition builder
//!
//! Maps an [`ApplicationSpec`] or a [`PredefinedAppSpec`] to the typed
//! Kubernetes objects that make up the application. No I/O happens here; the
//! only source of nondeterminism is the secret name suffix, which comes from an
//! injectable generator.

use crate::error::OrchestratorError;
use crate::models::{
    ApplicationSpec, Credentials, EnvironmentBinding, PredefinedAppSpec, ResourceKind,
};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EnvVar, EnvVarSource, PodSpec,
    PodTemplateSpec, ResourceRequirements, Secret, SecretKeySelector, Service, ServicePort,
    ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressServiceBackend,
    IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use rand::distributions::{Alphanumeric, Uniform};
use rand::Rng;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Label used as the workload selector
pub const APP_LABEL: &str = "app";
/// Label that opts pods into watchdog probing
pub const MONITOR_LABEL: &str = "monitor";
/// Length of the random suffix appended to generated secret names
pub const SECRET_SUFFIX_LEN: usize = 10;
/// Longest application name accepted, leaves room for derived suffixes
pub const MAX_APP_NAME_LEN: usize = 40;

pub const SECRET_USERNAME_KEY: &str = "username";
pub const SECRET_PASSWORD_KEY: &str = "password";
pub const CONFIG_VOLUME_NAME: &str = "postgres-config-volume";

const GENERATED_PASSWORD_LEN: usize = 16;

/// One cluster object to apply, produced once and never mutated
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceDefinition {
    Secret(Secret),
    ConfigMap(ConfigMap),
    Service(Service),
    Workload(Deployment),
    Ingress(Ingress),
}

impl ResourceDefinition {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceDefinition::Secret(_) => ResourceKind::Secret,
            ResourceDefinition::ConfigMap(_) => ResourceKind::ConfigMap,
            ResourceDefinition::Service(_) => ResourceKind::Service,
            ResourceDefinition::Workload(_) => ResourceKind::Workload,
            ResourceDefinition::Ingress(_) => ResourceKind::Ingress,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ResourceDefinition::Secret(o) => &o.metadata,
            ResourceDefinition::ConfigMap(o) => &o.metadata,
            ResourceDefinition::Service(o) => &o.metadata,
            ResourceDefinition::Workload(o) => &o.metadata,
            ResourceDefinition::Ingress(o) => &o.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }

    /// Serialized payload as it would be sent to the API server
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            ResourceDefinition::Secret(o) => serde_json::to_value(o),
            ResourceDefinition::ConfigMap(o) => serde_json::to_value(o),
            ResourceDefinition::Service(o) => serde_json::to_value(o),
            ResourceDefinition::Workload(o) => serde_json::to_value(o),
            ResourceDefinition::Ingress(o) => serde_json::to_value(o),
        }
    }
}

/// Definitions produced for one application
#[derive(Debug, Clone)]
pub struct ApplicationPlan {
    pub name: String,
    pub namespace: String,
    pub definitions: Vec<ResourceDefinition>,
}

impl ApplicationPlan {
    pub fn kinds(&self) -> Vec<ResourceKind> {
        self.definitions.iter().map(ResourceDefinition::kind).collect()
    }
}

/// Settings for the predefined (templated) application
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredefinedTemplate {
    pub image: String,
    pub port: i32,
    pub config_mount_path: String,
    pub config_data: BTreeMap<String, String>,
    pub default_cpu: String,
    pub default_memory: String,
    pub user_env: String,
    pub password_env: String,
}

impl Default for PredefinedTemplate {
    fn default() -> Self {
        let mut config_data = BTreeMap::new();
        config_data.insert("shared_buffers".to_string(), "128MB".to_string());
        config_data.insert("max_connections".to_string(), "100".to_string());

        Self {
            image: "postgres:latest".to_string(),
            port: 5432,
            config_mount_path: "/etc/postgresql".to_string(),
            config_data,
            default_cpu: "100m".to_string(),
            default_memory: "512Mi".to_string(),
            user_env: "POSTGRES_USER".to_string(),
            password_env: "POSTGRES_PASSWORD".to_string(),
        }
    }
}

type NameGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Builds resource definitions from application specs
#[derive(Clone)]
pub struct DefinitionBuilder {
    suffix: NameGenerator,
    password: NameGenerator,
    template: PredefinedTemplate,
}

impl fmt::Debug for DefinitionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefinitionBuilder")
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

impl Default for DefinitionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DefinitionBuilder {
    pub fn new() -> Self {
        Self {
            suffix: Arc::new(random_suffix),
            password: Arc::new(random_password),
            template: PredefinedTemplate::default(),
        }
    }

    /// Replace the secret name suffix generator
    pub fn with_suffix_generator(
        mut self,
        generator: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.suffix = Arc::new(generator);
        self
    }

    /// Replace the generator used for predefined-app passwords
    pub fn with_password_generator(
        mut self,
        generator: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.password = Arc::new(generator);
        self
    }

    pub fn with_template(mut self, template: PredefinedTemplate) -> Self {
        self.template = template;
        self
    }

    /// Build the definitions for a full application.
    ///
    /// Emits one Secret per secret binding, one Deployment, a Service when a
    /// service port is given and an Ingress when a domain is given as well.
    pub fn application(
        &self,
        spec: &ApplicationSpec,
        namespace: &str,
    ) -> Result<ApplicationPlan, OrchestratorError> {
        let name = normalize_app_name(&spec.app_name)?;
        let (cpu, memory) = required_quantities(spec)?;
        validate_application(spec)?;

        let mut definitions = Vec::new();
        let mut env = Vec::with_capacity(spec.envs.len());

        for binding in &spec.envs {
            if binding.is_secret {
                let secret_name = format!("{}-secret-{}", name, (self.suffix)());
                definitions.push(ResourceDefinition::Secret(secret_for_binding(
                    &secret_name,
                    namespace,
                    binding,
                )));
                env.push(secret_env(&binding.key, &secret_name, &binding.key));
            } else {
                env.push(EnvVar {
                    name: binding.key.clone(),
                    value: Some(binding.value.clone()),
                    ..EnvVar::default()
                });
            }
        }

        let mut selector = BTreeMap::new();
        selector.insert(APP_LABEL.to_string(), name.clone());
        let mut pod_labels = selector.clone();
        if spec.monitor {
            pod_labels.insert(MONITOR_LABEL.to_string(), "true".to_string());
        }

        let requests = quantities(cpu, memory);
        let container = Container {
            name: name.clone(),
            image: Some(spec.image()),
            env: Some(env),
            ports: spec.service_port.map(|port| {
                vec![ContainerPort {
                    container_port: port,
                    ..ContainerPort::default()
                }]
            }),
            resources: Some(ResourceRequirements {
                requests: Some(requests),
                ..ResourceRequirements::default()
            }),
            ..Container::default()
        };

        definitions.push(ResourceDefinition::Workload(workload(
            &workload_name(&name),
            namespace,
            spec.replicas,
            selector.clone(),
            pod_labels,
            PodSpec {
                containers: vec![container],
                ..PodSpec::default()
            },
        )));

        if let Some(port) = spec.service_port {
            definitions.push(ResourceDefinition::Service(service(
                &name, namespace, "ClusterIP", port, selector,
            )));

            if let Some(domain) = spec.domain_address.as_deref().filter(|d| !d.is_empty()) {
                definitions.push(ResourceDefinition::Ingress(ingress(
                    &format!("{}-ingress", name),
                    namespace,
                    domain,
                    &name,
                    port,
                )));
            }
        }

        Ok(ApplicationPlan {
            name,
            namespace: namespace.to_string(),
            definitions,
        })
    }

    /// Build the definitions for the predefined database application
    pub fn predefined(
        &self,
        spec: &PredefinedAppSpec,
        namespace: &str,
    ) -> Result<ApplicationPlan, OrchestratorError> {
        let name = normalize_app_name(&spec.app_name)?;
        let template = &self.template;

        let credentials = match &spec.credentials {
            Some(c) if c.username.is_empty() || c.password.is_empty() => {
                return Err(OrchestratorError::validation(
                    "credentials must carry a non-empty username and password",
                ));
            }
            Some(c) => c.clone(),
            None => Credentials {
                username: name.clone(),
                password: (self.password)(),
            },
        };

        let secret_name = format!("{}-secret", name);
        let config_map_name = format!("{}-postgres-config", name);

        let mut secret_data = BTreeMap::new();
        secret_data.insert(
            SECRET_USERNAME_KEY.to_string(),
            ByteString(credentials.username.into_bytes()),
        );
        secret_data.insert(
            SECRET_PASSWORD_KEY.to_string(),
            ByteString(credentials.password.into_bytes()),
        );
        let secret = Secret {
            metadata: object_meta(&secret_name, namespace),
            data: Some(secret_data),
            ..Secret::default()
        };

        let config_map = ConfigMap {
            metadata: object_meta(&config_map_name, namespace),
            data: Some(template.config_data.clone()),
            ..ConfigMap::default()
        };

        let mut selector = BTreeMap::new();
        selector.insert(APP_LABEL.to_string(), name.clone());

        let service_type = if spec.external {
            "LoadBalancer"
        } else {
            "ClusterIP"
        };

        let cpu = non_empty(spec.resources.cpu.as_deref()).unwrap_or(&template.default_cpu);
        let memory =
            non_empty(spec.resources.memory.as_deref()).unwrap_or(&template.default_memory);
        let limits = quantities(cpu, memory);

        let container = Container {
            name: format!("{}-postgres", name),
            image: Some(template.image.clone()),
            ports: Some(vec![ContainerPort {
                container_port: template.port,
                ..ContainerPort::default()
            }]),
            env: Some(vec![
                secret_env(&template.user_env, &secret_name, SECRET_USERNAME_KEY),
                secret_env(&template.password_env, &secret_name, SECRET_PASSWORD_KEY),
            ]),
            volume_mounts: Some(vec![VolumeMount {
                name: CONFIG_VOLUME_NAME.to_string(),
                mount_path: template.config_mount_path.clone(),
                ..VolumeMount::default()
            }]),
            resources: Some(ResourceRequirements {
                requests: Some(limits.clone()),
                limits: Some(limits),
                ..ResourceRequirements::default()
            }),
            ..Container::default()
        };

        let pod_spec = PodSpec {
            containers: vec![container],
            volumes: Some(vec![Volume {
                name: CONFIG_VOLUME_NAME.to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: Some(config_map_name),
                    ..ConfigMapVolumeSource::default()
                }),
                ..Volume::default()
            }]),
            ..PodSpec::default()
        };

        let definitions = vec![
            ResourceDefinition::Secret(secret),
            ResourceDefinition::ConfigMap(config_map),
            ResourceDefinition::Service(service(
                &format!("{}-service", name),
                namespace,
                service_type,
                template.port,
                selector.clone(),
            )),
            ResourceDefinition::Workload(workload(
                &workload_name(&name),
                namespace,
                1,
                selector.clone(),
                selector,
                pod_spec,
            )),
        ];

        Ok(ApplicationPlan {
            name,
            namespace: namespace.to_string(),
            definitions,
        })
    }
}

/// Name of the workload provisioned for a normalized application name
pub fn workload_name(app_name: &str) -> String {
    format!("{}-deployment", app_name)
}

/// Lowercase and validate an application name.
///
/// The result must work as a DNS-1035 label once suffixes like `-deployment`
/// or `-secret-xxxxxxxxxx` are appended.
pub fn normalize_app_name(raw: &str) -> Result<String, OrchestratorError> {
    let name = raw.trim().to_lowercase();

    if name.is_empty() {
        return Err(OrchestratorError::validation("AppName must not be empty"));
    }
    if name.len() > MAX_APP_NAME_LEN {
        return Err(OrchestratorError::validation(format!(
            "AppName '{}' is longer than {} characters",
            name, MAX_APP_NAME_LEN
        )));
    }

    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let starts_with_letter = name.starts_with(|c: char| c.is_ascii_lowercase());

    if !valid_chars || !starts_with_letter || name.ends_with('-') {
        return Err(OrchestratorError::validation(format!(
            "AppName '{}' must start with a letter, contain only letters, digits or '-', and not end with '-'",
            raw
        )));
    }

    Ok(name)
}

fn required_quantities(spec: &ApplicationSpec) -> Result<(&str, &str), OrchestratorError> {
    let cpu = non_empty(spec.resources.cpu.as_deref())
        .ok_or_else(|| OrchestratorError::validation("Resources.CPU is required"))?;
    let memory = non_empty(spec.resources.memory.as_deref())
        .ok_or_else(|| OrchestratorError::validation("Resources.RAM is required"))?;
    Ok((cpu, memory))
}

fn validate_application(spec: &ApplicationSpec) -> Result<(), OrchestratorError> {
    if spec.replicas < 1 {
        return Err(OrchestratorError::validation(format!(
            "Replicas must be positive, got {}",
            spec.replicas
        )));
    }
    if spec.image_address.trim().is_empty() {
        return Err(OrchestratorError::validation("ImageAddress is required"));
    }
    if spec.image_tag.trim().is_empty() {
        return Err(OrchestratorError::validation("ImageTag must not be empty"));
    }
    if let Some(port) = spec.service_port {
        if !(1..=65535).contains(&port) {
            return Err(OrchestratorError::validation(format!(
                "ServicePort {} is out of range",
                port
            )));
        }
    }

    let mut seen = HashSet::new();
    for binding in &spec.envs {
        if binding.key.is_empty() {
            return Err(OrchestratorError::validation("environment keys must not be empty"));
        }
        if !seen.insert(binding.key.as_str()) {
            return Err(OrchestratorError::validation(format!(
                "duplicate environment key '{}'",
                binding.key
            )));
        }
        let valid_key = binding
            .key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if binding.is_secret && !valid_key {
            return Err(OrchestratorError::validation(format!(
                "secret environment key '{}' is not a valid secret data key",
                binding.key
            )));
        }
    }

    Ok(())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn object_meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..ObjectMeta::default()
    }
}

fn quantities(cpu: &str, memory: &str) -> BTreeMap<String, Quantity> {
    let mut map = BTreeMap::new();
    map.insert("cpu".to_string(), Quantity(cpu.to_string()));
    map.insert("memory".to_string(), Quantity(memory.to_string()));
    map
}

fn secret_for_binding(name: &str, namespace: &str, binding: &EnvironmentBinding) -> Secret {
    // ByteString is base64 encoded on the wire
    let mut data = BTreeMap::new();
    data.insert(
        binding.key.clone(),
        ByteString(binding.value.as_bytes().to_vec()),
    );

    Secret {
        metadata: object_meta(name, namespace),
        data: Some(data),
        ..Secret::default()
    }
}

fn secret_env(env_name: &str, secret_name: &str, key: &str) -> EnvVar {
    EnvVar {
        name: env_name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: Some(secret_name.to_string()),
                key: key.to_string(),
                ..SecretKeySelector::default()
            }),
            ..EnvVarSource::default()
        }),
        ..EnvVar::default()
    }
}

fn workload(
    name: &str,
    namespace: &str,
    replicas: i32,
    selector: BTreeMap<String, String>,
    pod_labels: BTreeMap<String, String>,
    pod_spec: PodSpec,
) -> Deployment {
    Deployment {
        metadata: object_meta(name, namespace),
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(pod_spec),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

fn service(
    name: &str,
    namespace: &str,
    service_type: &str,
    port: i32,
    selector: BTreeMap<String, String>,
) -> Service {
    Service {
        metadata: object_meta(name, namespace),
        spec: Some(ServiceSpec {
            type_: Some(service_type.to_string()),
            selector: Some(selector),
            ports: Some(vec![ServicePort {
                port,
                target_port: Some(IntOrString::Int(port)),
                ..ServicePort::default()
            }]),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

fn ingress(name: &str, namespace: &str, host: &str, service_name: &str, port: i32) -> Ingress {
    Ingress {
        metadata: object_meta(name, namespace),
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some(host.to_string()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "ImplementationSpecific".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: service_name.to_string(),
                                port: Some(ServiceBackendPort {
                                    number: Some(port),
                                    ..ServiceBackendPort::default()
                                }),
                            }),
                            ..IngressBackend::default()
                        },
                    }],
                }),
            }]),
            ..IngressSpec::default()
        }),
        ..Ingress::default()
    }
}

/// Ten random lowercase ASCII letters
pub fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(Uniform::new_inclusive(b'a', b'z'))
        .take(SECRET_SUFFIX_LEN)
        .map(char::from)
        .collect()
}

fn random_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceRequests;
    use base64::Engine;

    fn fixed_builder() -> DefinitionBuilder {
        DefinitionBuilder::new().with_suffix_generator(|| "abcdefghij".to_string())
    }

    fn billing_spec() -> ApplicationSpec {
        ApplicationSpec {
            replicas: 2,
            image_tag: "v3".to_string(),
            resources: ResourceRequests::new("250m", "256Mi"),
            envs: vec![
                EnvironmentBinding::plain("MODE", "prod"),
                EnvironmentBinding::secret("DB_PASS", "s3cr3t"),
            ],
            domain_address: Some("billing.example.com".to_string()),
            service_port: Some(8080),
            ..ApplicationSpec::new("Billing", "registry/billing")
        }
    }

    fn workload_of(plan: &ApplicationPlan) -> &Deployment {
        plan.definitions
            .iter()
            .find_map(|d| match d {
                ResourceDefinition::Workload(w) => Some(w),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_billing_plan_shape() {
        let plan = fixed_builder().application(&billing_spec(), "default").unwrap();

        assert_eq!(plan.name, "billing");
        assert_eq!(
            plan.kinds(),
            vec![
                ResourceKind::Secret,
                ResourceKind::Workload,
                ResourceKind::Service,
                ResourceKind::Ingress
            ]
        );

        let deployment = workload_of(&plan);
        let spec = deployment.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(2));
        let container = &spec.template.spec.as_ref().unwrap().containers[0];
        assert_eq!(container.image.as_deref(), Some("registry/billing:v3"));

        let env = container.env.as_ref().unwrap();
        assert_eq!(env.len(), 2);
        assert_eq!(env[0].name, "MODE");
        assert_eq!(env[0].value.as_deref(), Some("prod"));
        let secret_ref = env[1]
            .value_from
            .as_ref()
            .and_then(|v| v.secret_key_ref.as_ref())
            .unwrap();
        assert_eq!(secret_ref.name.as_deref(), Some("billing-secret-abcdefghij"));
        assert_eq!(secret_ref.key, "DB_PASS");
        assert!(env[1].value.is_none());
    }

    #[test]
    fn test_ingress_targets_service_not_workload() {
        let plan = fixed_builder().application(&billing_spec(), "default").unwrap();

        let ingress = plan
            .definitions
            .iter()
            .find_map(|d| match d {
                ResourceDefinition::Ingress(i) => Some(i),
                _ => None,
            })
            .unwrap();
        let rule = &ingress.spec.as_ref().unwrap().rules.as_ref().unwrap()[0];
        assert_eq!(rule.host.as_deref(), Some("billing.example.com"));

        let backend = rule.http.as_ref().unwrap().paths[0]
            .backend
            .service
            .as_ref()
            .unwrap();
        assert_eq!(backend.name, "billing");
        assert_ne!(backend.name, workload_of(&plan).metadata.name.clone().unwrap());
        assert_eq!(backend.port.as_ref().unwrap().number, Some(8080));
    }

    #[test]
    fn test_secret_value_never_in_workload() {
        let plan = fixed_builder().application(&billing_spec(), "default").unwrap();

        let payload = serde_json::to_string(workload_of(&plan)).unwrap();
        let encoded = base64::engine::general_purpose::STANDARD.encode("s3cr3t");
        assert!(!payload.contains("s3cr3t"));
        assert!(!payload.contains(&encoded));
    }

    #[test]
    fn test_secret_holds_base64_value() {
        let plan = fixed_builder().application(&billing_spec(), "default").unwrap();

        let secret = plan.definitions[0].to_json().unwrap();
        assert_eq!(secret["metadata"]["name"], "billing-secret-abcdefghij");
        assert_eq!(
            secret["data"]["DB_PASS"],
            base64::engine::general_purpose::STANDARD.encode("s3cr3t")
        );
        assert_eq!(secret["data"].as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_each_secret_binding_gets_its_own_secret() {
        let mut spec = billing_spec();
        spec.envs.push(EnvironmentBinding::secret("API_KEY", "k"));

        let plan = DefinitionBuilder::new().application(&spec, "default").unwrap();
        let names: Vec<&str> = plan
            .definitions
            .iter()
            .filter(|d| d.kind() == ResourceKind::Secret)
            .map(ResourceDefinition::name)
            .collect();

        assert_eq!(names.len(), 2);
        assert_ne!(names[0], names[1]);
        for name in names {
            let suffix = name.strip_prefix("billing-secret-").unwrap();
            assert_eq!(suffix.len(), SECRET_SUFFIX_LEN);
            assert!(suffix.chars().all(|c| c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn test_no_service_or_ingress_without_port() {
        let mut spec = billing_spec();
        spec.service_port = None;

        let plan = fixed_builder().application(&spec, "default").unwrap();
        assert_eq!(plan.kinds(), vec![ResourceKind::Secret, ResourceKind::Workload]);
    }

    #[test]
    fn test_service_without_domain_has_no_ingress() {
        let mut spec = billing_spec();
        spec.domain_address = None;

        let plan = fixed_builder().application(&spec, "default").unwrap();
        assert_eq!(
            plan.kinds(),
            vec![ResourceKind::Secret, ResourceKind::Workload, ResourceKind::Service]
        );
    }

    #[test]
    fn test_missing_quantities_rejected() {
        let mut spec = billing_spec();
        spec.resources.memory = None;
        let err = fixed_builder().application(&spec, "default").unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));

        let mut spec = billing_spec();
        spec.resources.cpu = Some("  ".to_string());
        let err = fixed_builder().application(&spec, "default").unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));
    }

    #[test]
    fn test_name_normalization() {
        assert_eq!(normalize_app_name(" Billing ").unwrap(), "billing");
        assert_eq!(normalize_app_name("web-2").unwrap(), "web-2");
        assert!(normalize_app_name("").is_err());
        assert!(normalize_app_name("2web").is_err());
        assert!(normalize_app_name("web_app").is_err());
        assert!(normalize_app_name("web-").is_err());
        assert!(normalize_app_name(&"a".repeat(MAX_APP_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_duplicate_env_keys_rejected() {
        let mut spec = billing_spec();
        spec.envs.push(EnvironmentBinding::plain("MODE", "dev"));
        assert!(fixed_builder().application(&spec, "default").is_err());
    }

    #[test]
    fn test_monitor_label_only_on_pods() {
        let mut spec = billing_spec();
        spec.monitor = true;

        let plan = fixed_builder().application(&spec, "apps").unwrap();
        let deployment = workload_of(&plan);
        let spec = deployment.spec.as_ref().unwrap();

        let selector = spec.selector.match_labels.as_ref().unwrap();
        assert_eq!(selector.len(), 1);
        assert_eq!(selector[APP_LABEL], "billing");

        let labels = spec.template.metadata.as_ref().unwrap().labels.as_ref().unwrap();
        assert_eq!(labels[MONITOR_LABEL], "true");
        assert_eq!(deployment.metadata.namespace.as_deref(), Some("apps"));
    }

    #[test]
    fn test_predefined_plan() {
        let spec = PredefinedAppSpec {
            app_name: "orders".to_string(),
            external: true,
            resources: ResourceRequests {
                cpu: Some("200m".to_string()),
                memory: None,
            },
            credentials: Some(Credentials {
                username: "admin".to_string(),
                password: "pw".to_string(),
            }),
            namespace: None,
        };

        let plan = fixed_builder().predefined(&spec, "default").unwrap();
        assert_eq!(
            plan.kinds(),
            vec![
                ResourceKind::Secret,
                ResourceKind::ConfigMap,
                ResourceKind::Service,
                ResourceKind::Workload
            ]
        );

        let service = plan.definitions[2].to_json().unwrap();
        assert_eq!(service["metadata"]["name"], "orders-service");
        assert_eq!(service["spec"]["type"], "LoadBalancer");

        let deployment = plan.definitions[3].to_json().unwrap();
        let container = &deployment["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(container["name"], "orders-postgres");
        assert_eq!(container["volumeMounts"][0]["mountPath"], "/etc/postgresql");
        assert_eq!(container["resources"]["requests"]["cpu"], "200m");
        assert_eq!(container["resources"]["limits"]["memory"], "512Mi");
        assert_eq!(container["env"][1]["valueFrom"]["secretKeyRef"]["key"], "password");
        assert_eq!(
            deployment["spec"]["template"]["spec"]["volumes"][0]["configMap"]["name"],
            "orders-postgres-config"
        );
    }

    #[test]
    fn test_predefined_generates_credentials() {
        let spec = PredefinedAppSpec {
            app_name: "Orders".to_string(),
            external: false,
            resources: ResourceRequests::default(),
            credentials: None,
            namespace: None,
        };

        let plan = DefinitionBuilder::new()
            .with_password_generator(|| "generated".to_string())
            .predefined(&spec, "default")
            .unwrap();

        let secret = plan.definitions[0].to_json().unwrap();
        let engine = base64::engine::general_purpose::STANDARD;
        assert_eq!(secret["data"]["username"], engine.encode("orders"));
        assert_eq!(secret["data"]["password"], engine.encode("generated"));

        let service = plan.definitions[2].to_json().unwrap();
        assert_eq!(service["spec"]["type"], "ClusterIP");
    }
}
