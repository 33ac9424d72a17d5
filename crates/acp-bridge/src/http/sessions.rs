use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use acp_api_types::CreateSessionRequest;
use acp_core::session::AgenticSession;

use crate::api_error::ApiError;
use crate::state::{ApiState, UserIdentity};

/// POST /api/projects/{project}/bugfix-workflows/{id}/sessions
pub(crate) async fn create_session(
    State(state): State<Arc<ApiState>>,
    Path((project, id)): Path<(String, String)>,
    user: UserIdentity,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<AgenticSession>), ApiError> {
    let session = state.sessions.create(&project, &user.0, &id, req).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/projects/{project}/bugfix-workflows/{id}/sessions
pub(crate) async fn list_sessions(
    State(state): State<Arc<ApiState>>,
    Path((project, id)): Path<(String, String)>,
    _user: UserIdentity,
) -> Result<Json<Value>, ApiError> {
    let sessions = state.sessions.list(&project, &id).await?;
    Ok(Json(json!({ "sessions": sessions })))
}

/// GET /api/projects/{project}/bugfix-workflows/{id}/sessions/{name}
pub(crate) async fn get_session(
    State(state): State<Arc<ApiState>>,
    Path((project, id, name)): Path<(String, String, String)>,
    _user: UserIdentity,
) -> Result<Json<AgenticSession>, ApiError> {
    Ok(Json(state.sessions.get(&project, &id, &name).await?))
}
