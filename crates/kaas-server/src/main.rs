//! KaaS orchestrator daemon
//!
//! Serves the deployment API and runs the health watchdog against the
//! cluster it is deployed in.

use anyhow::{Context, Result};
use kaas_core::{
    health::{components, HealthRegistry},
    ControlPlane, DefinitionBuilder, HistoryStore, HttpProber, InMemoryHistoryStore,
    KubeControlPlane, OrchestratorMetrics, PgHistoryStore, Provisioner, StatusAggregator,
    StructuredLogger, UpsertEngine, Watchdog,
};
use kaas_server::{api, config::OrchestratorConfig};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ORCHESTRATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting kaas-server");

    let config = OrchestratorConfig::load()?;
    info!(
        instance = %config.instance_name,
        namespace = %config.default_namespace,
        api_port = config.api_port,
        "Orchestrator configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::CONTROL_PLANE).await;
    health_registry.register(components::HISTORY_STORE).await;

    // register collectors before the first scrape
    let _metrics = OrchestratorMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);

    let control_plane: Arc<dyn ControlPlane> = Arc::new(
        KubeControlPlane::try_default()
            .await
            .context("Failed to create Kubernetes client")?,
    );

    let history: Arc<dyn HistoryStore> = match &config.database_url {
        Some(url) => Arc::new(
            PgHistoryStore::connect(url, config.database_max_connections)
                .await
                .context("Failed to connect to the history database")?,
        ),
        None => {
            warn!("No database_url configured, keeping probe history in memory");
            Arc::new(InMemoryHistoryStore::new())
        }
    };

    let builder = DefinitionBuilder::new().with_template(config.predefined.clone());
    let engine = UpsertEngine::new(control_plane.clone(), config.retry.clone());
    let provisioner = Provisioner::new(builder, engine, config.default_namespace.clone())
        .with_logger(logger.clone());
    let status = StatusAggregator::new(control_plane.clone());

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let watchdog_handle = if config.watchdog.enabled {
        health_registry.register(components::WATCHDOG).await;
        let prober = HttpProber::from_config(&config.watchdog)
            .context("Failed to build the probe HTTP client")?;
        let watchdog = Watchdog::new(
            control_plane.clone(),
            Arc::new(prober),
            history.clone(),
            health_registry.clone(),
            config.watchdog.clone(),
        )
        .with_logger(logger.clone());
        Some(tokio::spawn(watchdog.run(shutdown_tx.subscribe())))
    } else {
        info!("Health watchdog disabled");
        None
    };

    let app_state = Arc::new(api::AppState::new(
        provisioner,
        status,
        history,
        health_registry.clone(),
    ));

    health_registry.set_ready(true).await;
    logger.log_startup(ORCHESTRATOR_VERSION, &config.default_namespace);

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let outcome = tokio::select! {
        result = api::wait_for_exit(api_handle) => {
            if let Err(err) = &result {
                error!(error = %format!("{:#}", err), "API server stopped");
            }
            logger.log_shutdown("API server stopped");
            result
        }
        signal = tokio::signal::ctrl_c() => {
            signal
                .context("Failed to listen for shutdown signal")
                .map(|()| logger.log_shutdown("SIGINT received"))
        }
    };

    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());
    if let Some(handle) = watchdog_handle {
        if let Err(err) = handle.await {
            error!(error = %err, "Watchdog task failed");
        }
    }

    info!("Shutdown complete");
    outcome
}
