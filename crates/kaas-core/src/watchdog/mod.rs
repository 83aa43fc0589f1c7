//! Health watchdog
//!
//! Periodically discovers pods that opted into monitoring, probes their
//! health endpoint and counts the results in the history store.

mod r#loop;
mod probe;

pub use probe::{targets_from_pods, HealthProber, HttpProber, ProbeTarget};
pub use r#loop::{TickSummary, Watchdog};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the watchdog loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub enabled: bool,
    /// Seconds between ticks
    pub interval_secs: u64,
    pub namespace: String,
    /// Selector for pods to probe
    pub label_selector: String,
    pub health_path: String,
    pub probe_timeout_ms: u64,
    pub max_concurrent_probes: usize,
    /// Port probed when a pod declares none
    pub default_port: i32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            namespace: crate::models::DEFAULT_NAMESPACE.to_string(),
            label_selector: "monitor=true".to_string(),
            health_path: "/healthz".to_string(),
            probe_timeout_ms: 5_000,
            max_concurrent_probes: 16,
            default_port: 8080,
        }
    }
}

impl WatchdogConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}
