use crate::application::api_store::{
    ApiStore, CycleRecord, IncomingTask, NewCycleInput, NewTaskInput, Stats, TaskPatch,
};
use crate::domain::models::Task;
use crate::infrastructure::error::InfraError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub const HEALTH_MESSAGE: &str = "PomoTask API is running!";

#[derive(Clone, Default)]
pub struct ApiState {
    store: Arc<Mutex<ApiStore>>,
}

impl ApiState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler that panicked while holding the lock leaves the store usable.
    fn lock_store(&self) -> MutexGuard<'_, ApiStore> {
        self.store.lock().unwrap_or_else(|poisoned| {
            warn!("api store lock poisoned by a panicked request; continuing");
            poisoned.into_inner()
        })
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/sync", post(sync_tasks))
        .route("/api/tasks/{id}", put(update_task).delete(delete_task))
        .route("/api/cycles", get(list_cycles).post(create_cycle))
        .route("/api/stats", get(stats))
        .fallback(endpoint_not_found)
        .method_not_allowed_fallback(endpoint_not_found)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve<F>(listener: TcpListener, state: ApiState, shutdown: F) -> Result<(), InfraError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let address = listener.local_addr()?;
    info!(listen = %address, "api listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
    message: &'static str,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct TasksResponse {
    ok: bool,
    tasks: Vec<Task>,
}

#[derive(Debug, Serialize)]
struct TaskResponse {
    ok: bool,
    task: Task,
}

#[derive(Debug, Serialize)]
struct SyncResponse {
    ok: bool,
    tasks: Vec<Task>,
    synced: usize,
}

#[derive(Debug, Serialize)]
struct CyclesResponse {
    ok: bool,
    cycles: Vec<CycleRecord>,
    total: usize,
}

#[derive(Debug, Serialize)]
struct CycleResponse {
    ok: bool,
    cycle: CycleRecord,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    ok: bool,
    stats: Stats,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        message: HEALTH_MESSAGE,
        timestamp: Utc::now(),
    })
}

async fn list_tasks(State(state): State<ApiState>) -> Result<Json<TasksResponse>, ApiError> {
    let tasks = state.lock_store().tasks().to_vec();
    Ok(Json(TasksResponse { ok: true, tasks }))
}

async fn create_task(
    State(state): State<ApiState>,
    payload: Result<Json<NewTaskInput>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskResponse>), ApiError> {
    let Json(input) = payload?;
    let task = state.lock_store().create_task(input, Utc::now())?;
    info!(task_id = task.id, "task created");
    Ok((StatusCode::CREATED, Json(TaskResponse { ok: true, task })))
}

async fn update_task(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    payload: Result<Json<TaskPatch>, JsonRejection>,
) -> Result<Json<TaskResponse>, ApiError> {
    let id = parse_task_id(&id)?;
    let Json(patch) = payload?;
    let task = state.lock_store().update_task(id, patch, Utc::now())?;
    info!(task_id = task.id, "task updated");
    Ok(Json(TaskResponse { ok: true, task }))
}

async fn delete_task(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, ApiError> {
    let id = parse_task_id(&id)?;
    let task = state.lock_store().delete_task(id)?;
    info!(task_id = task.id, "task deleted");
    Ok(Json(TaskResponse { ok: true, task }))
}

async fn sync_tasks(
    State(state): State<ApiState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<SyncResponse>, ApiError> {
    let Json(mut body) = payload?;
    let raw = match body.get_mut("tasks") {
        Some(tasks) if tasks.is_array() => tasks.take(),
        _ => return Err(InfraError::Validation("tasks must be an array".to_string()).into()),
    };
    let incoming: Vec<IncomingTask> = serde_json::from_value(raw).map_err(|error| {
        InfraError::Validation(format!("tasks must be an array of task objects: {error}"))
    })?;

    let tasks = state.lock_store().sync_tasks(incoming, Utc::now())?;
    info!(synced = tasks.len(), "tasks replaced by sync");
    Ok(Json(SyncResponse {
        ok: true,
        synced: tasks.len(),
        tasks,
    }))
}

async fn list_cycles(State(state): State<ApiState>) -> Result<Json<CyclesResponse>, ApiError> {
    let cycles = state.lock_store().cycles().to_vec();
    Ok(Json(CyclesResponse {
        ok: true,
        total: cycles.len(),
        cycles,
    }))
}

async fn create_cycle(
    State(state): State<ApiState>,
    payload: Result<Json<NewCycleInput>, JsonRejection>,
) -> Result<(StatusCode, Json<CycleResponse>), ApiError> {
    let Json(input) = payload?;
    let cycle = state.lock_store().record_cycle(input, Utc::now())?;
    info!(cycle_id = cycle.id, rounds = cycle.rounds, "cycle recorded");
    Ok((StatusCode::CREATED, Json(CycleResponse { ok: true, cycle })))
}

async fn stats(State(state): State<ApiState>) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state.lock_store().stats();
    Ok(Json(StatsResponse { ok: true, stats }))
}

async fn endpoint_not_found() -> Response {
    envelope_error(StatusCode::NOT_FOUND, "Endpoint not found")
}

fn parse_task_id(raw: &str) -> Result<u64, InfraError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| InfraError::NotFound("Task not found".to_string()))
}

fn envelope_error(status: StatusCode, message: &str) -> Response {
    let body = Json(serde_json::json!({
        "ok": false,
        "error": message
    }));
    (status, body).into_response()
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = detail, "request handler panicked");
    envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

#[derive(Debug)]
pub struct ApiError(InfraError);

impl From<InfraError> for ApiError {
    fn from(value: InfraError) -> Self {
        Self(value)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(InfraError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            InfraError::Validation(message) => envelope_error(StatusCode::BAD_REQUEST, &message),
            InfraError::NotFound(message) => envelope_error(StatusCode::NOT_FOUND, &message),
            other => {
                error!(error = %other, "request failed");
                envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

/// Serves a fresh API on an ephemeral local port and returns its `/api` base URL.
#[cfg(test)]
pub(crate) async fn spawn_test_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let address = listener.local_addr().expect("test listener address");
    tokio::spawn(async move {
        serve(listener, ApiState::new(), std::future::pending())
            .await
            .expect("serve test api");
    });
    format!("http://{address}/api")
}
