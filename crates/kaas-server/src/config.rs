//! Orchestrator configuration

use anyhow::{Context, Result};
use kaas_core::{PredefinedTemplate, RetryPolicy, WatchdogConfig};
use serde::Deserialize;

/// Orchestrator configuration.
///
/// Read from an optional `kaas.{toml,yaml,json}` file and `KAAS__*`
/// environment variables, e.g. `KAAS__API_PORT=4040` or
/// `KAAS__WATCHDOG__INTERVAL_SECS=10`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Instance name used in structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Namespace used when a request names none
    #[serde(default = "default_namespace")]
    pub default_namespace: String,

    /// Postgres URL for the probe history; in-memory history when unset
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub watchdog: WatchdogConfig,

    #[serde(default)]
    pub predefined: PredefinedTemplate,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "kaas".to_string())
}

fn default_api_port() -> u16 {
    4040
}

fn default_namespace() -> String {
    kaas_core::DEFAULT_NAMESPACE.to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            default_namespace: default_namespace(),
            database_url: None,
            database_max_connections: default_max_connections(),
            retry: RetryPolicy::default(),
            watchdog: WatchdogConfig::default(),
            predefined: PredefinedTemplate::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        Self::load_from("kaas")
    }

    pub fn load_from(file_stem: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(file_stem).required(false))
            .add_source(
                config::Environment::with_prefix("KAAS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid orchestrator configuration")
    }
}
