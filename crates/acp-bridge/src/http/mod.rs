//! Axum router over the engine services.

mod events_ws;
mod sessions;
mod sync;
mod webhook;
mod workflows;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::ApiState;

/// Build the full API router: REST routes, the status webhook, and the
/// WebSocket event stream.
pub fn api_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route(
            "/api/projects/{project}/bugfix-workflows",
            post(workflows::create_workflow).get(workflows::list_workflows),
        )
        .route(
            "/api/projects/{project}/bugfix-workflows/{id}",
            get(workflows::get_workflow).delete(workflows::delete_workflow),
        )
        .route(
            "/api/projects/{project}/bugfix-workflows/{id}/sessions",
            post(sessions::create_session).get(sessions::list_sessions),
        )
        .route(
            "/api/projects/{project}/bugfix-workflows/{id}/sessions/{name}",
            get(sessions::get_session),
        )
        .route(
            "/api/projects/{project}/bugfix-workflows/{id}/sync-tracker",
            post(sync::sync_tracker),
        )
        .route("/api/projects/{project}/events", get(events_ws::events_ws))
        .route("/webhooks/session-status", post(webhook::session_status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "acp-daemon",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn ready() -> Json<Value> {
    Json(json!({ "status": "ready" }))
}
