use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use acp_api_types::{CreateWorkflowRequest, DeleteWorkflowResponse, WorkflowListResponse, WorkflowSummary};
use acp_core::workflow::BugFixWorkflow;

use crate::api_error::ApiError;
use crate::state::{ApiState, UserIdentity};

/// POST /api/projects/{project}/bugfix-workflows
pub(crate) async fn create_workflow(
    State(state): State<Arc<ApiState>>,
    Path(project): Path<String>,
    user: UserIdentity,
    Json(req): Json<CreateWorkflowRequest>,
) -> Result<(StatusCode, Json<BugFixWorkflow>), ApiError> {
    let workflow = state.workflows.create(&project, &user.0, req).await?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

/// GET /api/projects/{project}/bugfix-workflows
pub(crate) async fn list_workflows(
    State(state): State<Arc<ApiState>>,
    Path(project): Path<String>,
    _user: UserIdentity,
) -> Result<Json<WorkflowListResponse>, ApiError> {
    let workflows = state.workflows.list(&project).await?;
    Ok(Json(WorkflowListResponse {
        workflows: workflows.iter().map(summarize).collect(),
    }))
}

/// GET /api/projects/{project}/bugfix-workflows/{id}
pub(crate) async fn get_workflow(
    State(state): State<Arc<ApiState>>,
    Path((project, id)): Path<(String, String)>,
    _user: UserIdentity,
) -> Result<Json<BugFixWorkflow>, ApiError> {
    Ok(Json(state.workflows.get(&project, &id).await?))
}

/// DELETE /api/projects/{project}/bugfix-workflows/{id}
pub(crate) async fn delete_workflow(
    State(state): State<Arc<ApiState>>,
    Path((project, id)): Path<(String, String)>,
    _user: UserIdentity,
) -> Result<Json<DeleteWorkflowResponse>, ApiError> {
    let outcome = state.workflows.delete(&project, &id).await?;
    Ok(Json(DeleteWorkflowResponse {
        deleted: outcome.workflow_id,
        note: "the workflow resource and its sessions were deleted; the feature branch and the origin issue were left in place".to_string(),
    }))
}

fn summarize(workflow: &BugFixWorkflow) -> WorkflowSummary {
    let status = workflow.status_or_default();
    WorkflowSummary {
        id: workflow.spec.id.clone(),
        title: workflow.spec.title.clone(),
        issue_url: workflow.spec.issue_url.clone(),
        phase: status.phase.to_string(),
        assessment_status: status.assessment_status.to_string(),
        implementation_completed: status.implementation_completed,
        created_at: workflow.spec.created_at,
    }
}
