//! HTTP Request Handlers
//!
//! Axum route handlers that expose the `Distributor` over HTTP. Producers
//! post records to `/submit`; consumers poll `/get_work` and report back on
//! `/status`; `/stats`, `/metrics` and `/health` are read-only.
//!
//! Malformed bodies are rejected by the `Json` extractor with a 4xx before
//! a handler runs; every handler below is infallible by construction, so a
//! bad submit never disturbs any other task.

use super::protocol::*;
use super::queue::Distributor;
use super::types::LogRecord;

use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use std::sync::Arc;

/// Assemble the coordinator router. Shared between the binary and the
/// end-to-end tests so both serve the exact same surface.
pub fn router(distributor: Arc<Distributor>) -> Router {
    Router::new()
        .route(ENDPOINT_SUBMIT, post(handle_submit))
        .route(ENDPOINT_GET_WORK, post(handle_get_work))
        .route(ENDPOINT_STATUS, post(handle_status))
        .route(ENDPOINT_STATS, get(handle_stats))
        .route(ENDPOINT_METRICS, get(handle_metrics))
        .route(ENDPOINT_HEALTH, get(handle_health))
        .layer(Extension(distributor))
}

/// Producer API: submit a log record for processing.
pub async fn handle_submit(
    Extension(distributor): Extension<Arc<Distributor>>,
    Json(record): Json<LogRecord>,
) -> Json<SubmitResponse> {
    let task_id = distributor.submit(record);
    Json(SubmitResponse { task_id })
}

/// Consumer API: pull one task from the head of the backlog.
pub async fn handle_get_work(
    Extension(distributor): Extension<Arc<Distributor>>,
    Json(request): Json<WorkRequest>,
) -> Json<WorkResponse> {
    Json(distributor.get_work(&request))
}

/// Consumer API: heartbeat or terminal report. Stale updates are
/// acknowledged no-ops, so the response is always `ok`.
pub async fn handle_status(
    Extension(distributor): Extension<Arc<Distributor>>,
    Json(update): Json<StatusUpdate>,
) -> Json<AckResponse> {
    distributor.update_status(&update);
    Json(AckResponse { ok: true })
}

pub async fn handle_stats(
    Extension(distributor): Extension<Arc<Distributor>>,
) -> Json<StatsResponse> {
    Json(distributor.stats())
}

pub async fn handle_metrics(
    Extension(distributor): Extension<Arc<Distributor>>,
) -> Json<MetricsResponse> {
    Json(distributor.metrics())
}

pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}
