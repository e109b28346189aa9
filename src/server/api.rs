//! HTTP routes for starting runs and observing their progress.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tracing::debug;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::engine::{RunRequest, WorkflowEngine, planner, spawn};
use crate::errors::TemplateError;
use crate::models::RunRecord;
use crate::store::{DeliverableStore, RunStore};
use crate::templates::TemplateCatalog;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
    pub runs: Arc<dyn RunStore>,
    pub deliverables: Arc<dyn DeliverableStore>,
    pub catalog: Arc<TemplateCatalog>,
    pub server: ServerConfig,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/templates", get(list_templates))
        .route("/api/templates/{id}", get(get_template))
        .route("/api/workspaces/{workspace_id}/runs", post(start_run))
        .route("/api/runs/{id}", get(get_run))
        .route("/api/runs/{id}/stream", get(stream_run))
        .route("/api/deliverables/{id}", get(get_deliverable))
        .with_state(state)
}

// ── Error mapping ─────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    InvalidTemplate(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::InvalidTemplate(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<TemplateError> for ApiError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::NotFound { .. } => Self::NotFound(err.to_string()),
            other => Self::InvalidTemplate(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_templates(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "templates": state.catalog.list() }))
}

async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let template = state.catalog.get(&id)?;
    Ok(Json(template.clone()).into_response())
}

#[derive(Debug, Deserialize)]
struct StartRunBody {
    template_id: String,
    #[serde(default)]
    input: BTreeMap<String, Value>,
    #[serde(default)]
    file_ids: Vec<String>,
}

/// Create a pending run record and kick off execution in the background.
/// Returns `202 Accepted` with the record; clients follow up via the
/// status or stream endpoints.
async fn start_run(
    State(state): State<AppState>,
    Path(workspace_id): Path<String>,
    Json(body): Json<StartRunBody>,
) -> Result<Response, ApiError> {
    let template = state.catalog.get(&body.template_id)?;
    planner::validate(&template.config.steps)?;

    let run_id = Uuid::new_v4().to_string();
    let record = RunRecord::new(
        &run_id,
        &workspace_id,
        &body.template_id,
        body.input.clone(),
        body.file_ids.clone(),
    );
    state.runs.create(record.clone()).await?;

    spawn(
        Arc::clone(&state.engine),
        RunRequest {
            run_id: run_id.clone(),
            workspace_id,
            template_id: body.template_id,
            input: body.input,
            file_ids: body.file_ids,
        },
    );
    debug!(run_id = %run_id, "run accepted");
    Ok((StatusCode::ACCEPTED, Json(record)).into_response())
}

async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    match state.runs.get(&id).await? {
        Some(record) => Ok(Json(record).into_response()),
        None => Err(ApiError::NotFound(format!("Run {id} not found"))),
    }
}

async fn get_deliverable(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    match state.deliverables.get(&id).await? {
        Some(deliverable) => Ok(Json(deliverable).into_response()),
        None => Err(ApiError::NotFound(format!("Deliverable {id} not found"))),
    }
}

/// Live progress as server-sent events. Polls the run record and forwards
/// only entries the client has not seen, closes after a terminal status
/// event, and hard-caps the connection lifetime so abandoned runs cannot
/// hold sockets open indefinitely.
async fn stream_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Event>(32);
    tokio::spawn(poll_progress(
        state.runs.clone(),
        id,
        state.server.stream_poll_interval,
        state.server.stream_max_lifetime,
        tx,
    ));

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(event), rx))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn poll_progress(
    runs: Arc<dyn RunStore>,
    run_id: String,
    poll_interval: Duration,
    max_lifetime: Duration,
    tx: mpsc::Sender<Event>,
) {
    let deadline = Instant::now() + max_lifetime;
    let mut sent = 0usize;

    loop {
        let record = match runs.get(&run_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                let _ = try_send_json(&tx, "error", &json!({ "error": "run not found" })).await;
                return;
            }
            Err(err) => {
                let _ = try_send_json(&tx, "error", &json!({ "error": err.to_string() })).await;
                return;
            }
        };

        for entry in &record.progress[sent..] {
            if try_send_json(&tx, "progress", entry).await.is_err() {
                return;
            }
        }
        sent = record.progress.len();

        if record.status.is_terminal() {
            let _ = try_send_json(
                &tx,
                "status",
                &json!({
                    "status": record.status,
                    "result": record.result,
                    "error": record.error,
                }),
            )
            .await;
            return;
        }

        if Instant::now() >= deadline {
            let _ = try_send_json(&tx, "timeout", &json!({ "status": record.status })).await;
            return;
        }
        sleep(poll_interval).await;
    }
}

async fn try_send_json<T: serde::Serialize>(
    tx: &mpsc::Sender<Event>,
    kind: &str,
    payload: &T,
) -> Result<(), ()> {
    let event = Event::default()
        .event(kind)
        .json_data(payload)
        .map_err(|_| ())?;
    tx.send(event).await.map_err(|_| ())
}
