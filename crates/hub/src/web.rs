use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post, put};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::advisor::{advise_or_fallback, AdvisoryRequest, Advisor, FALLBACK};
use crate::block::BlockId;
use crate::config::{ClimateConfigEntry, IrrigationConfigEntry};
use crate::error::ConfigError;
use crate::state::SharedState;

#[derive(Clone)]
pub struct AppState {
    pub shared: SharedState,
    pub advisor: Arc<dyn Advisor>,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(api_status))
        .route("/api/blocks", post(add_block))
        .route("/api/blocks/{id}", delete(remove_block))
        .route("/api/blocks/{id}/name", put(rename_block))
        .route("/api/blocks/{id}/climate", put(update_climate))
        .route("/api/blocks/{id}/irrigation", get(irrigation_view).put(update_irrigation))
        .route("/api/blocks/{id}/advice", get(advice))
        .route("/api/blocks/{id}/stop", post(stop))
        .route("/api/queue", post(enqueue))
        .route("/api/queue/all", post(enqueue_all))
        .route("/api/queue/{id}", delete(dequeue))
        .with_state(state)
}

#[derive(Deserialize)]
struct NameBody {
    name: String,
}

#[derive(Deserialize)]
struct QueueBody {
    ids: Vec<String>,
}

fn not_found(id: &BlockId) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("unknown block '{id}'") })),
    )
        .into_response()
}

fn unprocessable(e: ConfigError) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": e.to_string(), "violations": e.violations() })),
    )
        .into_response()
}

/// Map an "applied to a block?" result onto 204 / 404 / 422.
fn applied(id: &BlockId, result: Result<bool, ConfigError>) -> Response {
    match result {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(id),
        Err(e) => unprocessable(e),
    }
}

// ── Read-only ───────────────────────────────────────────────────────

async fn api_status(State(app): State<AppState>) -> impl IntoResponse {
    let st = app.shared.read().await;
    Json(st.to_status())
}

async fn irrigation_view(State(app): State<AppState>, Path(id): Path<String>) -> Response {
    let id = BlockId::from(id);
    let st = app.shared.read().await;
    match st.greenhouse.irrigation_view(&id) {
        Some(view) => Json(view).into_response(),
        None => not_found(&id),
    }
}

async fn advice(State(app): State<AppState>, Path(id): Path<String>) -> Response {
    let id = BlockId::from(id);
    let req = {
        let st = app.shared.read().await;
        match st.greenhouse.block(&id) {
            Some(block) => AdvisoryRequest::for_block(block),
            None => return not_found(&id),
        }
    };

    // The advisor may be slow; it runs off the runtime with no lock held.
    let advisor = Arc::clone(&app.advisor);
    let text = tokio::task::spawn_blocking(move || advise_or_fallback(advisor.as_ref(), &req))
        .await
        .unwrap_or_else(|e| {
            warn!(block = %id, "advisor task failed: {e}");
            FALLBACK.to_string()
        });
    Json(json!({ "block": id, "advice": text })).into_response()
}

// ── Fleet ───────────────────────────────────────────────────────────

async fn add_block(State(app): State<AppState>, Json(body): Json<NameBody>) -> Response {
    let mut st = app.shared.write().await;
    match st.add_block(&body.name) {
        Ok(id) => (StatusCode::CREATED, Json(json!({ "id": id }))).into_response(),
        Err(e) => unprocessable(e),
    }
}

async fn remove_block(State(app): State<AppState>, Path(id): Path<String>) -> Response {
    let id = BlockId::from(id);
    let mut st = app.shared.write().await;
    applied(&id, Ok(st.remove_block(&id)))
}

async fn rename_block(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NameBody>,
) -> Response {
    let id = BlockId::from(id);
    let mut st = app.shared.write().await;
    let result = st.rename_block(&id, &body.name);
    applied(&id, result)
}

async fn update_climate(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(entry): Json<ClimateConfigEntry>,
) -> Response {
    let id = BlockId::from(id);
    let mut st = app.shared.write().await;
    let result = st.update_climate(&id, entry);
    applied(&id, result)
}

async fn update_irrigation(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(entry): Json<IrrigationConfigEntry>,
) -> Response {
    let id = BlockId::from(id);
    let mut st = app.shared.write().await;
    let result = st.update_irrigation(&id, entry);
    applied(&id, result)
}

// ── Dispatch ────────────────────────────────────────────────────────

async fn enqueue(State(app): State<AppState>, Json(body): Json<QueueBody>) -> impl IntoResponse {
    let ids = body.ids.into_iter().map(BlockId::from).collect();
    let mut st = app.shared.write().await;
    Json(json!({ "added": st.enqueue(ids, "http") }))
}

async fn enqueue_all(State(app): State<AppState>) -> impl IntoResponse {
    let mut st = app.shared.write().await;
    Json(json!({ "added": st.enqueue_all("http") }))
}

async fn dequeue(State(app): State<AppState>, Path(id): Path<String>) -> Response {
    let id = BlockId::from(id);
    let mut st = app.shared.write().await;
    applied(&id, Ok(st.dequeue(&id, "http")))
}

async fn stop(State(app): State<AppState>, Path(id): Path<String>) -> Response {
    let id = BlockId::from(id);
    let mut st = app.shared.write().await;
    applied(&id, Ok(st.stop(&id, "http")))
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(state: AppState) -> Result<()> {
    let port: u16 = env::var("WEB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {port}"))?;

    info!(%addr, "http api listening");

    axum::serve(listener, router(state))
        .await
        .context("web server error")
}

// ===========================================================================
// Tests
// ===========================================================================
