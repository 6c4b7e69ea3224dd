//! HTTP API: run benchmarks, browse stored runs and follow progress over SSE.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use llmbench_common::config::BenchConfig;
use llmbench_common::model::{BenchmarkRequest, BenchmarkRun, ProgressEvent, ProgressUpdate, ProviderModels, RunSummary, SystemInfo};
use llmbench_common::{BenchError, Result};
use llmbench_core::BenchmarkRunner;
use llmbench_store::{JsonlStore, RunStore, DEFAULT_HISTORY_LIMIT};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;

const PROGRESS_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct AppState {
    runner: Arc<BenchmarkRunner>,
    store: Arc<dyn RunStore>,
    updates: broadcast::Sender<ProgressUpdate>,
}

impl AppState {
    /// Wires the runner's progress events into the `/stream` channel.
    pub fn new(runner: BenchmarkRunner, store: Arc<dyn RunStore>) -> Self {
        let (updates, _) = broadcast::channel(PROGRESS_CAPACITY);
        let runner = runner.with_progress(updates.clone());
        Self { runner: Arc::new(runner), store, updates }
    }

    pub fn runner(&self) -> &BenchmarkRunner { &self.runner }
    pub fn store(&self) -> &Arc<dyn RunStore> { &self.store }
}

/// Builds the full service from configuration: HTTP backends, the JSONL
/// store, metrics and the GPU poller.
pub async fn app(cfg: &BenchConfig) -> Result<Router> {
    llmbench_obs::metrics::init();
    llmbench_obs::spawn_gpu_polling();
    let backends = llmbench_backend_http::registry_from_config(cfg)?;
    let runner = BenchmarkRunner::from_config(backends, cfg);
    let store = JsonlStore::open(&cfg.store_path).await?;
    Ok(router(AppState::new(runner, Arc::new(store))))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(metrics))
        .route("/run", post(run_benchmark))
        .route("/history", get(history))
        .route("/history/:id", get(history_entry))
        .route("/stream", get(stream_progress))
        .route("/models", get(models))
        .route("/system", get(system))
        .with_state(state)
}

/// Errors leave the API as `{"detail": "..."}`.
pub struct ApiError(BenchError);

impl From<BenchError> for ApiError {
    fn from(e: BenchError) -> Self { Self(e) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BenchError::NotFound(_) => StatusCode::NOT_FOUND,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(target: "api", error = %self.0, "request failed");
        }
        (status, Json(serde_json::json!({ "detail": self.0.to_string() }))).into_response()
    }
}

async fn metrics() -> impl IntoResponse {
    let (content_type, body) = llmbench_obs::metrics::render();
    ([("content-type", content_type)], body)
}

async fn run_benchmark(
    State(state): State<AppState>,
    payload: std::result::Result<Json<BenchmarkRequest>, JsonRejection>,
) -> std::result::Result<Json<BenchmarkRun>, ApiError> {
    let Json(request) = payload.map_err(|e| BenchError::InvalidRequest(e.body_text()))?;
    tracing::info!(target: "api", models = request.models.len(), "run request");
    let run = state.runner.run(&request).await?;
    // the run is still returned when persisting it fails
    if let Err(e) = state.store.save(&run).await {
        tracing::warn!(target: "api", run_id = %run.id, error = %e, "failed to save run");
    }
    let _ = state.updates.send(ProgressUpdate { run_id: run.id.clone(), event: ProgressEvent::RunFinished });
    Ok(Json(run))
}

#[derive(serde::Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn history(
    State(state): State<AppState>,
    query: std::result::Result<Query<HistoryQuery>, QueryRejection>,
) -> std::result::Result<Json<Vec<RunSummary>>, ApiError> {
    let Query(q) = query.map_err(|e| BenchError::InvalidRequest(e.body_text()))?;
    let limit = q.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(state.store.list(limit).await?))
}

async fn history_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Json<BenchmarkRun>, ApiError> {
    match state.store.get(&id).await? {
        Some(run) => Ok(Json(run)),
        None => Err(BenchError::NotFound(format!("run {id}")).into()),
    }
}

/// Forwards progress updates until a run finishes or the client goes away.
async fn stream_progress(State(state): State<AppState>) -> Sse<ReceiverStream<std::result::Result<Event, Infallible>>> {
    let mut updates = state.updates.subscribe();
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        loop {
            let update = match updates.recv().await {
                Ok(u) => u,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(target: "api", skipped, "progress subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let last = matches!(update.event, ProgressEvent::RunFinished);
            let event = match Event::default().json_data(&update) {
                Ok(ev) => ev,
                Err(e) => {
                    tracing::warn!(target: "api", error = %e, "dropping unserializable progress update");
                    continue;
                }
            };
            if tx.send(Ok(event)).await.is_err() || last {
                break;
            }
        }
    });
    Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default())
}

async fn models(State(state): State<AppState>) -> Json<Vec<ProviderModels>> {
    Json(state.runner.available_models().await)
}

async fn system() -> std::result::Result<Json<SystemInfo>, ApiError> {
    let info = tokio::task::spawn_blocking(llmbench_obs::system_info)
        .await
        .map_err(|e| BenchError::Message(format!("system probe failed: {e}")))?;
    Ok(Json(info))
}
