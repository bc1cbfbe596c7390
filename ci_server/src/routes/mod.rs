//! CI server HTTP routes — webhook, build history pages, JSON API.

pub mod api;
pub mod views;
pub mod webhook;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, Json};
use axum::routing::get;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;

use crate::services::history::HistoryStore;
use crate::services::pipeline::Pipeline;

/// Shared state for route handlers.
#[derive(Clone)]
pub struct CiRouterState {
    pub pipeline: Arc<Pipeline>,
    /// Builds started by webhooks. Shutdown waits on it.
    pub builds: TaskTracker,
}

impl CiRouterState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            builds: TaskTracker::new(),
        }
    }

    fn history(&self) -> &HistoryStore {
        self.pipeline.history()
    }
}

/// Build the server's Axum router.
pub fn ci_router(state: CiRouterState) -> Router {
    Router::new()
        // Webhook (GitHub may be pointed at either path)
        .route("/", get(index_page).post(webhook_handler))
        .route("/webhook", axum::routing::post(webhook_handler))
        // History pages
        .route("/builds/{sha}", get(build_page))
        // JSON API
        .route("/api/builds", get(list_builds_handler))
        .route("/api/builds/{sha}", get(get_build_handler))
        .route("/health", get(|| async { "ok" }))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Webhook ──

async fn webhook_handler(
    State(state): State<CiRouterState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    webhook::handle_webhook(&state.pipeline, &state.builds, &headers, body)
}

// ── History pages ──

async fn index_page(State(state): State<CiRouterState>) -> Html<String> {
    Html(views::render_index(&state.history().list()))
}

async fn build_page(
    State(state): State<CiRouterState>,
    Path(sha): Path<String>,
) -> Result<Html<String>, (StatusCode, Html<String>)> {
    match state.history().get(&sha) {
        Some(record) => Ok(Html(views::render_build(&record))),
        None => Err((StatusCode::NOT_FOUND, Html(views::render_not_found(&sha)))),
    }
}

// ── JSON API ──

async fn list_builds_handler(
    State(state): State<CiRouterState>,
) -> Json<Vec<api::BuildJson>> {
    Json(api::list_builds(state.history()))
}

async fn get_build_handler(
    State(state): State<CiRouterState>,
    Path(sha): Path<String>,
) -> Result<Json<api::BuildJson>, StatusCode> {
    api::get_build(state.history(), &sha)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
