//! Watchdog tick loop

use super::{targets_from_pods, HealthProber, ProbeTarget, WatchdogConfig};
use crate::cluster::{ClusterError, ControlPlane};
use crate::health::{components, HealthRegistry};
use crate::history::HistoryStore;
use crate::models::ProbeOutcome;
use crate::observability::{OrchestratorMetrics, StructuredLogger};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Counts from one tick
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub probed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Pods without an IP yet
    pub skipped: usize,
    /// Probe results the history store rejected
    pub record_errors: usize,
}

/// Discovers, probes and records monitored pods on a fixed interval
pub struct Watchdog {
    control_plane: Arc<dyn ControlPlane>,
    prober: Arc<dyn HealthProber>,
    history: Arc<dyn HistoryStore>,
    health: HealthRegistry,
    config: WatchdogConfig,
    metrics: OrchestratorMetrics,
    logger: StructuredLogger,
}

impl Watchdog {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        prober: Arc<dyn HealthProber>,
        history: Arc<dyn HistoryStore>,
        health: HealthRegistry,
        config: WatchdogConfig,
    ) -> Self {
        Self {
            control_plane,
            prober,
            history,
            health,
            config,
            metrics: OrchestratorMetrics::new(),
            logger: StructuredLogger::new("watchdog"),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Run until a shutdown signal arrives
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval().as_secs(),
            namespace = %self.config.namespace,
            selector = %self.config.label_selector,
            "Starting health watchdog"
        );

        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // discovery failures are already reported to the health registry
                    let _ = self.tick().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down health watchdog");
                    break;
                }
            }
        }
    }

    /// One discover, probe and record pass.
    ///
    /// A discovery failure skips the pass and marks the watchdog degraded.
    /// Probe failures are results, not errors.
    pub async fn tick(&self) -> Result<TickSummary, ClusterError> {
        let start = Instant::now();

        let pods = match self
            .control_plane
            .list_pods(&self.config.namespace, Some(&self.config.label_selector))
            .await
        {
            Ok(pods) => pods,
            Err(err) => {
                warn!(error = %err, "Pod discovery failed, skipping tick");
                self.health
                    .set_degraded(components::WATCHDOG, format!("pod discovery failed: {}", err))
                    .await;
                return Err(err);
            }
        };
        self.health.set_healthy(components::WATCHDOG).await;

        let (targets, skipped) = targets_from_pods(&pods, self.config.default_port);
        if skipped > 0 {
            debug!(skipped, "Skipping pods without an IP");
        }
        self.metrics.set_monitored_pods(targets.len() as i64);

        let results: Vec<(ProbeOutcome, bool)> = stream::iter(targets)
            .map(|target| self.probe_and_record(target))
            .buffer_unordered(self.config.max_concurrent_probes.max(1))
            .collect()
            .await;

        let mut summary = TickSummary {
            skipped,
            ..TickSummary::default()
        };
        for (outcome, recorded) in &results {
            summary.probed += 1;
            if outcome.is_success() {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            if !recorded {
                summary.record_errors += 1;
            }
        }

        if summary.record_errors == 0 && summary.probed > 0 {
            self.health.set_healthy(components::HISTORY_STORE).await;
        }

        let elapsed = start.elapsed();
        self.metrics.observe_tick_latency(elapsed.as_secs_f64());
        debug!(
            probed = summary.probed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed_ms = elapsed.as_millis() as u64,
            "Watchdog tick complete"
        );

        Ok(summary)
    }

    async fn probe_and_record(&self, target: ProbeTarget) -> (ProbeOutcome, bool) {
        let outcome = self.prober.probe(&target).await;
        self.metrics.inc_probe(&outcome);

        let recorded = match self
            .history
            .record(&target.pod_name, &outcome, Utc::now())
            .await
        {
            Ok(_) => {
                self.logger.log_probe_recorded(&target.pod_name, &outcome);
                true
            }
            Err(err) => {
                warn!(pod = %target.pod_name, error = %err, "Failed to record probe result");
                self.metrics.inc_history_errors();
                self.health
                    .set_degraded(components::HISTORY_STORE, err.to_string())
                    .await;
                false
            }
        };

        (outcome, recorded)
    }
}
