use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::warn;

use acp_engine::completion::SessionEvent;

use crate::api_error::ApiError;
use crate::state::ApiState;

/// Deadline for webhook-initiated completion processing; the watcher
/// re-delivers on the next reconcile, so there is nothing to wait for.
const WEBHOOK_DEADLINE: Duration = Duration::from_secs(30);

/// POST /webhooks/session-status
///
/// Always 200 once the payload parses: the gist filename is the idempotency
/// key, so upstream retries of best-effort sub-step failures would do more
/// harm than good.
pub(crate) async fn session_status(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let event: SessionEvent = serde_json::from_value(payload)
        .map_err(|e| ApiError::BadRequest(format!("malformed session event: {e}")))?;

    match tokio::time::timeout(WEBHOOK_DEADLINE, state.completion.handle_event(&event)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "completion handling failed"),
        Err(_) => warn!("completion handling timed out"),
    }

    Ok(Json(json!({ "status": "ok" })))
}
