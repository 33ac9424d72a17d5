use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use acp_api_types::SyncTrackerResponse;

use crate::api_error::ApiError;
use crate::state::{ApiState, UserIdentity};

/// POST /api/projects/{project}/bugfix-workflows/{id}/sync-tracker
pub(crate) async fn sync_tracker(
    State(state): State<Arc<ApiState>>,
    Path((project, id)): Path<(String, String)>,
    _user: UserIdentity,
) -> Result<Json<SyncTrackerResponse>, ApiError> {
    let outcome = state.sync.sync_workflow(&project, &id).await?;
    Ok(Json(SyncTrackerResponse {
        tracker_key: outcome.tracker_key,
        tracker_url: outcome.tracker_url,
        created: outcome.created,
        synced_at: outcome.synced_at,
    }))
}
