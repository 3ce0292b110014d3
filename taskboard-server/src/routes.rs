//! HTTP surface of the task store.
//!
//! | Method | Path          | Success               |
//! |--------|---------------|-----------------------|
//! | GET    | `/tasks`      | 200, task array       |
//! | POST   | `/tasks`      | 201, created task     |
//! | PUT    | `/tasks/{id}` | 200, updated task     |
//! | DELETE | `/tasks/{id}` | 204                   |
//! | GET    | `/health`     | 200                   |
//!
//! Every failure is a JSON [`ErrorBody`].

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use taskboard_proto::codec::ErrorBody;
use taskboard_proto::task::{
    IDEMPOTENCY_KEY_HEADER, IdempotencyKey, NewTask, Task, TaskId, TaskPatch, ValidationError,
};

use crate::store::{Created, StoreError, TaskRepository};

/// Errors mapped onto HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request: bad JSON, bad path, bad header.
    #[error("{0}")]
    BadRequest(String),

    /// Well-formed payload that fails validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Unknown task id.
    #[error("task {0} not found")]
    NotFound(TaskId),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(e) => Self::Validation(e),
            StoreError::NotFound(id) => Self::NotFound(id),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_client_error() {
            tracing::debug!(%status, error = %self, "request rejected");
        }
        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

type AppState = Arc<TaskRepository>;

/// Builds the router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{id}", put(update_task).delete(delete_task))
        .with_state(state)
}

/// Binds `addr` and serves the router on a background task.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: std::net::SocketAddr,
    state: AppState,
) -> Result<(std::net::SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;
    let app = router(state);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn list_tasks(State(repo): State<AppState>) -> Json<Vec<Task>> {
    Json(repo.list().await)
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<IdempotencyKey>, ApiError> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Some)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid {IDEMPOTENCY_KEY_HEADER} header")))
}

async fn create_task(
    State(repo): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<NewTask>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let key = idempotency_key(&headers)?;
    let Json(new_task) = payload?;

    match repo.create(key, new_task).await? {
        Created::New(task) => {
            tracing::info!(task_id = %task.id, "task created");
            Ok((StatusCode::CREATED, Json(task)))
        }
        Created::Replayed(task) => {
            tracing::debug!(task_id = %task.id, "create replayed");
            Ok((StatusCode::OK, Json(task)))
        }
    }
}

async fn update_task(
    State(repo): State<AppState>,
    id: Result<Path<TaskId>, PathRejection>,
    payload: Result<Json<TaskPatch>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let Path(id) = id?;
    let Json(patch) = payload?;
    let task = repo.update(id, &patch).await?;
    tracing::info!(task_id = %id, status = %task.status, "task updated");
    Ok(Json(task))
}

async fn delete_task(
    State(repo): State<AppState>,
    id: Result<Path<TaskId>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    repo.delete(id).await?;
    tracing::info!(task_id = %id, "task deleted");
    Ok(StatusCode::NO_CONTENT)
}
