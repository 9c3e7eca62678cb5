use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use strata_maintenance::{JobStatusReport, MaintenanceJobController};
use strata_store::ObjectStore;
use strata_types::ObjectId;
use tracing::info;

use crate::error::{ServerError, ServerResult};

pub const JOB_STARTED: &str = "Maintenance job started successfully.";
pub const JOB_ALREADY_RUNNING: &str =
    "Maintenance job is already running. Please wait until it completes.";
pub const JOB_TERMINATED: &str = "Maintenance job terminated successfully.";
pub const JOB_NOT_RUNNING: &str = "No Maintenance job is currently running.";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub jobs: Arc<MaintenanceJobController>,
}

impl AppState {
    pub fn new(store: Arc<dyn ObjectStore>, jobs: Arc<MaintenanceJobController>) -> Self {
        Self { store, jobs }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Run filesystem work on the blocking pool.
async fn blocking<T, F>(work: F) -> ServerResult<T>
where
    F: FnOnce() -> ServerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?
}

/// Health check handler.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Info handler.
pub async fn info_handler() -> Json<serde_json::Value> {
    Json(json!({
        "name": "strata-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `POST {base}/file`
pub async fn create_file(
    State(state): State<AppState>,
    body: Bytes,
) -> ServerResult<(StatusCode, Json<String>)> {
    let store = state.store.clone();
    let id = blocking(move || Ok(store.create(&body)?)).await?;
    info!(%id, "file created");
    Ok((StatusCode::CREATED, Json(id.to_string())))
}

/// `GET {base}/file/{id}`
pub async fn read_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<impl IntoResponse> {
    let id = ObjectId::parse(&id)?;
    let store = state.store.clone();
    let data = blocking(move || Ok(store.read(&id)?)).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data))
}

/// `PUT {base}/file/{id}`
pub async fn update_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ServerResult<StatusCode> {
    let id = ObjectId::parse(&id)?;
    let store = state.store.clone();
    blocking(move || Ok(store.update(&id, &body)?)).await?;
    Ok(StatusCode::OK)
}

/// `DELETE {base}/file/{id}`
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<StatusCode> {
    let id = ObjectId::parse(&id)?;
    let store = state.store.clone();
    blocking(move || Ok(store.delete(&id)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST {base}/maintenance-job/start`
///
/// Runs the counting walk before answering.
pub async fn start_job(State(state): State<AppState>) -> ServerResult<&'static str> {
    let jobs = state.jobs.clone();
    if blocking(move || Ok(jobs.start()?)).await? {
        Ok(JOB_STARTED)
    } else {
        Err(ServerError::Conflict(JOB_ALREADY_RUNNING.into()))
    }
}

/// `POST {base}/maintenance-job/stop`
pub async fn stop_job(State(state): State<AppState>) -> ServerResult<&'static str> {
    if state.jobs.stop().await {
        Ok(JOB_TERMINATED)
    } else {
        Err(ServerError::Conflict(JOB_NOT_RUNNING.into()))
    }
}

/// `GET {base}/maintenance-job/status`
pub async fn job_status(State(state): State<AppState>) -> Json<JobStatusReport> {
    Json(state.jobs.status().report())
}
