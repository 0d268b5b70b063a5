//! HTTP route handlers for the router API.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::Serialize;
use serde_json::{Value, json};
use taskrouter::core::tracker::StatusSnapshot;
use taskrouter::core::types::{RouteError, TrackerError};
use taskrouter::plan::{
    self, Initialized, ServiceHealth, StepOutcome, get_workflow_status, initialize_workflow,
    process_step_completion,
};
use taskrouter::route::{self, AbortAck, Health, RouteRequest, RouteResponse};
use tracing::{error, warn};

use crate::state::AppState;

/// Build the API router.
pub fn app_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/route", post(route_task))
        .route("/abort/{workflow_id}", post(abort_workflow))
        .route("/workflows", post(create_workflow))
        .route("/workflows/completions", post(complete_step))
        .route("/workflows/health", get(workflows_health))
        .route(
            "/workflows/{workflow_id}",
            get(workflow_status).delete(remove_workflow),
        )
}

/// Error body `{"error": "..."}` with a status code chosen by kind.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<RouteError> for ApiError {
    fn from(err: RouteError) -> Self {
        let status = match &err {
            RouteError::InputFormat { .. } => StatusCode::BAD_REQUEST,
            RouteError::Collaborator { .. } => StatusCode::BAD_GATEWAY,
            RouteError::Audit(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(err = %err, "route failed");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        let status = match &err {
            TrackerError::UnknownWorkflow(_) | TrackerError::UnknownStep(_) => {
                StatusCode::NOT_FOUND
            }
            TrackerError::DuplicateWorkflow(_) | TrackerError::DuplicateCompletion(_) => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::BAD_REQUEST,
        };
        warn!(err = %err, "tracker rejected request");
        Self {
            status,
            message: err.to_string(),
        }
    }
}

/// Run blocking router work off the async runtime.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RouteError> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(err) => Err(ApiError::internal(format!("router task failed: {err}"))),
    }
}

async fn health() -> Json<Health> {
    Json(route::health())
}

/// POST /route - route one task, looping through the oracle when requested.
async fn route_task(
    State(state): State<AppState>,
    Json(request): Json<RouteRequest>,
) -> Result<Json<RouteResponse>, ApiError> {
    let router = state.router.clone();
    let response = blocking(move || router.route(request)).await?;
    Ok(Json(response))
}

/// POST /abort/{workflow_id} - stop an auto-loop at its next iteration.
async fn abort_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Json<AbortAck>, ApiError> {
    let router = state.router.clone();
    let ack = blocking(move || router.abort(&workflow_id)).await?;
    Ok(Json(ack))
}

/// POST /workflows - store a full plan and return its first step.
async fn create_workflow(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<Initialized>, ApiError> {
    Ok(Json(initialize_workflow(&state.store, payload)?))
}

/// POST /workflows/completions - record a completed step.
async fn complete_step(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<StepOutcome>, ApiError> {
    Ok(Json(process_step_completion(&state.store, payload)?))
}

/// GET /workflows/{workflow_id} - progress snapshot.
async fn workflow_status(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    Ok(Json(get_workflow_status(&state.store, &workflow_id)?))
}

#[derive(Debug, Serialize)]
struct Removed {
    ok: bool,
    workflow_id: String,
}

/// DELETE /workflows/{workflow_id} - forget a workflow.
async fn remove_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Json<Removed>, ApiError> {
    if state.store.remove(&workflow_id).is_none() {
        return Err(TrackerError::UnknownWorkflow(workflow_id).into());
    }
    Ok(Json(Removed {
        ok: true,
        workflow_id,
    }))
}

async fn workflows_health(State(state): State<AppState>) -> Json<ServiceHealth> {
    Json(plan::health_check(&state.store))
}
