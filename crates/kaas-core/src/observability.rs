//! Observability infrastructure for the orchestrator
//!
//! Provides:
//! - Prometheus metrics (applied resources, retries, probe results, tick latency)
//! - Structured JSON logging with tracing

use crate::models::{AppliedResult, ProbeOutcome, ResourceKind, UpsertOutcome};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for watchdog ticks (in seconds)
const TICK_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<OrchestratorMetricsInner> = OnceLock::new();

struct OrchestratorMetricsInner {
    resources_applied: IntCounterVec,
    apply_retries: IntCounter,
    apply_failures: IntCounterVec,
    probes: IntCounterVec,
    history_errors: IntCounter,
    monitored_pods: IntGauge,
    tick_latency_seconds: Histogram,
}

impl OrchestratorMetricsInner {
    fn new() -> Self {
        Self {
            resources_applied: register_int_counter_vec!(
                "kaas_resources_applied_total",
                "Resource definitions applied, by kind and outcome",
                &["kind", "outcome"]
            )
            .expect("Failed to register resources_applied"),

            apply_retries: register_int_counter!(
                "kaas_apply_retries_total",
                "Control-plane calls reissued after a retryable failure"
            )
            .expect("Failed to register apply_retries"),

            apply_failures: register_int_counter_vec!(
                "kaas_apply_failures_total",
                "Resource definitions that could not be applied",
                &["kind"]
            )
            .expect("Failed to register apply_failures"),

            probes: register_int_counter_vec!(
                "kaas_probes_total",
                "Health probes performed by the watchdog",
                &["outcome"]
            )
            .expect("Failed to register probes"),

            history_errors: register_int_counter!(
                "kaas_history_errors_total",
                "Probe results that could not be persisted"
            )
            .expect("Failed to register history_errors"),

            monitored_pods: register_int_gauge!(
                "kaas_monitored_pods",
                "Pods probed in the last watchdog tick"
            )
            .expect("Failed to register monitored_pods"),

            tick_latency_seconds: register_histogram!(
                "kaas_watchdog_tick_seconds",
                "Time spent in one watchdog tick",
                TICK_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_latency_seconds"),
        }
    }
}

/// Lightweight handle to the global orchestrator metrics.
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct OrchestratorMetrics {
    _private: (),
}

impl Default for OrchestratorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(OrchestratorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &OrchestratorMetricsInner {
        GLOBAL_METRICS.get_or_init(OrchestratorMetricsInner::new)
    }

    pub fn inc_resource_applied(&self, kind: ResourceKind, outcome: UpsertOutcome) {
        let outcome = match outcome {
            UpsertOutcome::Created => "created",
            UpsertOutcome::Updated => "updated",
        };
        self.inner()
            .resources_applied
            .with_label_values(&[kind.as_str(), outcome])
            .inc();
    }

    /// Count the extra calls a retried apply needed
    pub fn add_apply_retries(&self, attempts: u32) {
        if attempts > 1 {
            self.inner().apply_retries.inc_by(u64::from(attempts - 1));
        }
    }

    pub fn inc_apply_failure(&self, kind: ResourceKind) {
        self.inner()
            .apply_failures
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    pub fn inc_probe(&self, outcome: &ProbeOutcome) {
        let label = if outcome.is_success() { "success" } else { "failure" };
        self.inner().probes.with_label_values(&[label]).inc();
    }

    pub fn inc_history_errors(&self) {
        self.inner().history_errors.inc();
    }

    pub fn set_monitored_pods(&self, count: i64) {
        self.inner().monitored_pods.set(count);
    }

    pub fn observe_tick_latency(&self, duration_secs: f64) {
        self.inner().tick_latency_seconds.observe(duration_secs);
    }
}

/// Structured logger for orchestrator events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log a completed provisioning flow
    pub fn log_application_provisioned(&self, flow: &str, result: &AppliedResult) {
        let created = result
            .resources
            .iter()
            .filter(|r| r.outcome == UpsertOutcome::Created)
            .count();

        info!(
            event = "application_provisioned",
            instance = %self.instance,
            flow = %flow,
            application = %result.application,
            namespace = %result.namespace,
            resources = result.resources.len(),
            created = created,
            updated = result.resources.len() - created,
            "Application provisioned"
        );
    }

    /// Log a provisioning flow that stopped on an error
    pub fn log_provisioning_failed(&self, flow: &str, application: &str, error: &str) {
        warn!(
            event = "provisioning_failed",
            instance = %self.instance,
            flow = %flow,
            application = %application,
            error = %error,
            "Application provisioning failed"
        );
    }

    /// Log a recorded probe result
    pub fn log_probe_recorded(&self, target: &str, outcome: &ProbeOutcome) {
        match outcome {
            ProbeOutcome::Success => {
                info!(
                    event = "probe_recorded",
                    instance = %self.instance,
                    target = %target,
                    success = true,
                    "Health probe succeeded"
                );
            }
            ProbeOutcome::Failure { reason } => {
                warn!(
                    event = "probe_recorded",
                    instance = %self.instance,
                    target = %target,
                    success = false,
                    reason = %reason,
                    "Health probe failed"
                );
            }
        }
    }

    pub fn log_startup(&self, version: &str, namespace: &str) {
        info!(
            event = "orchestrator_started",
            instance = %self.instance,
            version = %version,
            namespace = %namespace,
            "Orchestrator started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "orchestrator_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Orchestrator shutting down"
        );
    }
}
