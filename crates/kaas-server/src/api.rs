//! HTTP API: provisioning, status, probe history, health and metrics

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use kaas_core::{
    builder::{normalize_app_name, workload_name},
    health::{components, ComponentStatus, HealthRegistry},
    ApplicationSpec, ApplicationStatus, AppliedResult, HealthRecord, HistoryError, HistoryStore,
    OrchestratorError, PredefinedAppSpec, Provisioner, StatusAggregator,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub provisioner: Provisioner,
    pub status: StatusAggregator,
    pub history: Arc<dyn HistoryStore>,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(
        provisioner: Provisioner,
        status: StatusAggregator,
        history: Arc<dyn HistoryStore>,
        health_registry: HealthRegistry,
    ) -> Self {
        Self {
            provisioner,
            status,
            history,
            health_registry,
        }
    }

    fn namespace_or_default(&self, namespace: Option<String>) -> String {
        namespace
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| self.provisioner.default_namespace().to_string())
    }

    /// Reflect the outcome of a control-plane backed call in the health registry
    async fn track<T>(&self, result: &Result<T, OrchestratorError>) {
        match result {
            Ok(_) => self.health_registry.set_healthy(components::CONTROL_PLANE).await,
            Err(err) if err.is_fatal_control_plane() => {
                self.health_registry
                    .set_degraded(components::CONTROL_PLANE, err.to_string())
                    .await
            }
            Err(_) => {}
        }
    }
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Maps the orchestrator error taxonomy onto HTTP statuses
#[derive(Debug)]
pub struct ApiError(OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        ApiError(err)
    }
}

impl From<HistoryError> for ApiError {
    fn from(err: HistoryError) -> Self {
        ApiError(OrchestratorError::History(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OrchestratorError::Validation(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::NotFound { .. } => StatusCode::NOT_FOUND,
            OrchestratorError::RetriesExhausted { .. } | OrchestratorError::ControlPlane { .. } => {
                StatusCode::BAD_GATEWAY
            }
            OrchestratorError::History(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self.0, "Request failed");
        }

        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Body of the provisioning endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct Provisioned {
    pub message: String,
    pub data: AppliedResult,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub app_name: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NamespaceQuery {
    pub namespace: Option<String>,
}

/// Body of `GET /health/{app_name}`
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub app_name: String,
    pub result: Vec<HealthRecord>,
}

async fn create_application(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<ApplicationSpec>,
) -> Result<(StatusCode, Json<Provisioned>), ApiError> {
    let result = state.provisioner.create_application(&spec).await;
    state.track(&result).await;
    let data = result?;

    info!(application = %data.application, "Application created");
    Ok((
        StatusCode::CREATED,
        Json(Provisioned {
            message: "Application created successfully".to_string(),
            data,
        }),
    ))
}

async fn deploy_predefined_app(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<PredefinedAppSpec>,
) -> Result<(StatusCode, Json<Provisioned>), ApiError> {
    let result = state.provisioner.deploy_predefined_app(&spec).await;
    state.track(&result).await;
    let data = result?;

    Ok((
        StatusCode::CREATED,
        Json(Provisioned {
            message: "Predefined application deployed successfully".to_string(),
            data,
        }),
    ))
}

async fn deployment_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<ApplicationStatus>, ApiError> {
    let app_name = query
        .app_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| OrchestratorError::validation("app_name query parameter is required"))?;
    let name = normalize_app_name(&app_name)?;
    let namespace = state.namespace_or_default(query.namespace);

    let result = state.status.status(&workload_name(&name), &namespace).await;
    state.track(&result).await;
    Ok(Json(result?))
}

async fn all_applications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NamespaceQuery>,
) -> Result<Json<Vec<ApplicationStatus>>, ApiError> {
    let namespace = state.namespace_or_default(query.namespace);

    let result = state.status.all_applications(&namespace).await;
    state.track(&result).await;
    Ok(Json(result?))
}

async fn history_by_name(
    State(state): State<Arc<AppState>>,
    Path(app_name): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let result = state.history.by_name(&app_name).await?;
    Ok(Json(HistoryResponse {
        app_name,
        result,
    }))
}

async fn history_all(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<HealthRecord>>, ApiError> {
    Ok(Json(state.history.all().await?))
}

/// Returns 200 while operational, 503 once a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.history.ping().await {
        Ok(()) => state.health_registry.set_healthy(components::HISTORY_STORE).await,
        Err(err) => {
            warn!(error = %err, "History store unreachable");
            state
                .health_registry
                .set_unhealthy(components::HISTORY_STORE, err.to_string())
                .await
        }
    }

    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/create_application", post(create_application))
        .route("/deploy-predefined-app", post(deploy_predefined_app))
        .route("/deployment_status", get(deployment_status))
        .route("/all_applications", get(all_applications))
        .route("/health", get(history_all))
        .route("/health/:app_name", get(history_by_name))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Wait for a spawned [`serve`] task. The server never stops on its own, so
/// every way it can finish is reported as an error.
pub async fn wait_for_exit(handle: JoinHandle<anyhow::Result<()>>) -> anyhow::Result<()> {
    match handle.await {
        Ok(Ok(())) => anyhow::bail!("API server exited unexpectedly"),
        Ok(Err(err)) => Err(err.context("API server failed")),
        Err(err) => Err(anyhow::Error::new(err).context("API server task panicked")),
    }
}
