//! Application provisioning flows
//!
//! Each flow builds its definitions, orders them by the flow's dependency
//! order and applies them one at a time. The first failure stops the flow;
//! objects already applied stay in the cluster and are converged again by the
//! next run.

use crate::builder::{ApplicationPlan, DefinitionBuilder, ResourceDefinition};
use crate::error::OrchestratorError;
use crate::models::{AppliedResult, ApplicationSpec, PredefinedAppSpec, ResourceKind};
use crate::observability::StructuredLogger;
use crate::upsert::UpsertEngine;
use tracing::info;

/// Dependency order of resource kinds within a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOrder(&'static [ResourceKind]);

impl ApplyOrder {
    /// Secrets before the workload that references them, the service before
    /// the ingress that routes to it.
    ///
    /// Secret names carry a fresh random suffix, so a rerun creates new
    /// Secrets, repoints the workload at them and leaves the previous ones in
    /// the cluster.
    pub const FULL_APPLICATION: ApplyOrder = ApplyOrder(&[
        ResourceKind::Secret,
        ResourceKind::Workload,
        ResourceKind::Service,
        ResourceKind::Ingress,
    ]);

    /// Credentials and configuration before the database workload mounts them
    pub const PREDEFINED: ApplyOrder = ApplyOrder(&[
        ResourceKind::Secret,
        ResourceKind::ConfigMap,
        ResourceKind::Service,
        ResourceKind::Workload,
    ]);

    pub fn kinds(&self) -> &'static [ResourceKind] {
        self.0
    }

    fn rank(&self, kind: ResourceKind) -> usize {
        self.0
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(self.0.len())
    }

    /// Stable sort: definitions of the same kind keep their relative order
    pub fn sort(&self, definitions: &mut [ResourceDefinition]) {
        definitions.sort_by_key(|d| self.rank(d.kind()));
    }
}

/// Drives the full and predefined provisioning flows
#[derive(Clone)]
pub struct Provisioner {
    builder: DefinitionBuilder,
    engine: UpsertEngine,
    default_namespace: String,
    logger: StructuredLogger,
}

impl Provisioner {
    pub fn new(
        builder: DefinitionBuilder,
        engine: UpsertEngine,
        default_namespace: impl Into<String>,
    ) -> Self {
        Self {
            builder,
            engine,
            default_namespace: default_namespace.into(),
            logger: StructuredLogger::new("provisioner"),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    fn namespace_for<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .unwrap_or(&self.default_namespace)
    }

    /// Provision an application from a full spec
    pub async fn create_application(
        &self,
        spec: &ApplicationSpec,
    ) -> Result<AppliedResult, OrchestratorError> {
        let namespace = self.namespace_for(spec.namespace.as_deref());
        let plan = self.builder.application(spec, namespace)?;
        self.apply_plan("application", plan, ApplyOrder::FULL_APPLICATION)
            .await
    }

    /// Provision the predefined database application
    pub async fn deploy_predefined_app(
        &self,
        spec: &PredefinedAppSpec,
    ) -> Result<AppliedResult, OrchestratorError> {
        let namespace = self.namespace_for(spec.namespace.as_deref());
        let plan = self.builder.predefined(spec, namespace)?;
        self.apply_plan("predefined", plan, ApplyOrder::PREDEFINED)
            .await
    }

    async fn apply_plan(
        &self,
        flow: &str,
        mut plan: ApplicationPlan,
        order: ApplyOrder,
    ) -> Result<AppliedResult, OrchestratorError> {
        order.sort(&mut plan.definitions);
        info!(
            flow = %flow,
            application = %plan.name,
            namespace = %plan.namespace,
            resources = plan.definitions.len(),
            "Provisioning application"
        );

        let mut resources = Vec::with_capacity(plan.definitions.len());
        for definition in &plan.definitions {
            match self.engine.apply(definition).await {
                Ok(applied) => resources.push(applied),
                Err(err) => {
                    self.logger
                        .log_provisioning_failed(flow, &plan.name, &err.to_string());
                    return Err(err);
                }
            }
        }

        let result = AppliedResult {
            application: plan.name,
            namespace: plan.namespace,
            resources,
        };
        self.logger.log_application_provisioned(flow, &result);
        Ok(result)
    }
}
