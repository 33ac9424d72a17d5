use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use acp_api_types::{CreateWorkflowRequest, TextDescriptionInput};
use acp_core::branch::{default_branch_name, validate_branch_name};
use acp_core::types::{self, AssessmentStatus, WorkflowPhase};
use acp_core::workflow::{BugFixWorkflow, BugFixWorkflowSpec, BugFixWorkflowStatus, ImplementationRepo};
use acp_integrations::github::ScmFactory;
use acp_integrations::scm::SourceControl;
use acp_integrations::types::{IssueRef, RepoCoords};
use acp_store::{CredentialBroker, CredentialError, ResourceStore};

use crate::error::EngineError;

/// User-facing workflow CRUD. Constructed with the user-scoped store handle;
/// the completion router holds the service-account one.
pub struct WorkflowService {
    store: Arc<dyn ResourceStore>,
    broker: Arc<dyn CredentialBroker>,
    scm: Arc<dyn ScmFactory>,
}

/// What a delete actually removed. The branch and origin issue are never
/// touched.
#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    pub workflow_id: String,
    pub deleted_sessions: usize,
}

impl WorkflowService {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        broker: Arc<dyn CredentialBroker>,
        scm: Arc<dyn ScmFactory>,
    ) -> Self {
        Self { store, broker, scm }
    }

    /// Create a workflow from either an existing issue URL or a structured
    /// text description (which files the issue first).
    pub async fn create(
        &self,
        project: &str,
        user_id: &str,
        req: CreateWorkflowRequest,
    ) -> Result<BugFixWorkflow, EngineError> {
        if req.issue_url.is_some() == req.text_description.is_some() {
            return Err(EngineError::Invalid(
                "exactly one of issueUrl or textDescription must be provided".into(),
            ));
        }

        let token = match self.broker.user_token(project, user_id).await {
            Ok(t) => Some(t),
            Err(CredentialError::NoCredential { .. }) => None,
            Err(e) => return Err(EngineError::Internal(e.to_string())),
        };

        // Resolve the origin issue. The text path is the only one that
        // writes to source control before the workflow CR exists.
        let (issue_number, issue_url, title, description) = match (&req.issue_url, &req.text_description)
        {
            (Some(url), None) => self.resolve_issue_from_url(url, token.as_deref()).await?,
            (None, Some(text)) => {
                text.validate().map_err(EngineError::Invalid)?;
                if token.is_none() {
                    return Err(EngineError::Invalid(
                        "a source-control token is required to file an issue from a text description"
                            .into(),
                    ));
                }
                self.create_issue_from_text(&req, text, token.as_deref()).await?
            }
            _ => unreachable!("guarded above"),
        };

        let branch_name = match &req.branch_name {
            Some(name) => {
                validate_branch_name(name).map_err(|e| EngineError::Invalid(e.to_string()))?;
                name.clone()
            }
            None => default_branch_name(issue_number),
        };

        // Best-effort branch creation; an existing branch counts as success.
        match RepoCoords::from_repo_url(&req.implementation_repo.url) {
            Some(coords) => {
                let scm = self
                    .scm
                    .client_for(token.as_deref())
                    .map_err(|e| EngineError::Internal(e.to_string()))?;
                if let Err(e) = scm
                    .ensure_branch(&coords, &branch_name, req.implementation_repo.branch.as_deref())
                    .await
                {
                    warn!(error = %e, branch = %branch_name, "branch creation failed, continuing");
                }
            }
            None => {
                return Err(EngineError::Invalid(format!(
                    "implementation repo URL is not parseable: {}",
                    req.implementation_repo.url
                )))
            }
        }

        let id = issue_number.to_string();
        let workflow = BugFixWorkflow::new(
            &id,
            BugFixWorkflowSpec {
                id: id.clone(),
                issue_number,
                issue_url,
                title,
                description,
                branch_name,
                implementation_repo: ImplementationRepo {
                    url: req.implementation_repo.url.clone(),
                    branch: req.implementation_repo.branch.clone(),
                },
                project: project.to_string(),
                created_by: user_id.to_string(),
                created_at: Utc::now(),
            },
        );

        // Two-phase write: the spec upsert, then the status. When the second
        // write fails the workflow stays discoverable with an empty status
        // block; the next completion event reconciles it. No compensating
        // delete.
        let mut created = self.store.upsert_workflow(project, workflow).await?;
        let status = BugFixWorkflowStatus {
            phase: WorkflowPhase::Ready,
            assessment_status: AssessmentStatus::Unknown,
            ..Default::default()
        };
        self.store
            .update_workflow_status(project, &id, status.clone())
            .await
            .map_err(|e| EngineError::Internal(format!("workflow created but status write failed: {e}")))?;
        created.status = Some(status);

        info!(project, workflow = %id, "workflow created");
        Ok(created)
    }

    pub async fn get(&self, project: &str, id: &str) -> Result<BugFixWorkflow, EngineError> {
        Ok(self.store.get_workflow(project, id).await?)
    }

    pub async fn list(&self, project: &str) -> Result<Vec<BugFixWorkflow>, EngineError> {
        Ok(self.store.list_workflows(project).await?)
    }

    /// Delete the workflow CR and its sessions (service-level cascade via
    /// the label join). The feature branch and the origin issue survive.
    pub async fn delete(&self, project: &str, id: &str) -> Result<DeleteOutcome, EngineError> {
        self.store.get_workflow(project, id).await?;

        let selector = types::workflow_session_selector(project, id);
        let mut deleted_sessions = 0;
        match self.store.list_sessions_by_label(project, &selector).await {
            Ok(sessions) => {
                for session in sessions {
                    let name = session.metadata.name.clone().unwrap_or_default();
                    match self.store.delete_session(project, &name).await {
                        Ok(()) => deleted_sessions += 1,
                        Err(e) => warn!(session = %name, error = %e, "session cascade delete failed"),
                    }
                }
            }
            Err(e) => warn!(workflow = id, error = %e, "session listing failed during delete"),
        }

        self.store.delete_workflow(project, id).await?;
        info!(project, workflow = id, deleted_sessions, "workflow deleted");
        Ok(DeleteOutcome { workflow_id: id.to_string(), deleted_sessions })
    }

    // ---- origin-issue resolution ------------------------------------------

    async fn resolve_issue_from_url(
        &self,
        url: &str,
        token: Option<&str>,
    ) -> Result<(u64, String, String, Option<String>), EngineError> {
        let issue_ref = IssueRef::parse(url)
            .ok_or_else(|| EngineError::Invalid(format!("not a recognizable issue URL: {url}")))?;
        let scm = self
            .scm
            .client_for(token)
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        let issue = scm
            .get_issue(&issue_ref.repo, issue_ref.number)
            .await
            .map_err(|e| EngineError::BadGateway(format!("failed to fetch issue: {e}")))?;
        Ok((issue.number, issue.html_url, issue.title, issue.body))
    }

    async fn create_issue_from_text(
        &self,
        req: &CreateWorkflowRequest,
        text: &TextDescriptionInput,
        token: Option<&str>,
    ) -> Result<(u64, String, String, Option<String>), EngineError> {
        let target_url = text
            .target_repository
            .as_deref()
            .unwrap_or(&req.implementation_repo.url);
        let coords = RepoCoords::from_repo_url(target_url).ok_or_else(|| {
            EngineError::Invalid(format!("target repository URL is not parseable: {target_url}"))
        })?;

        let body = compose_issue_body(text);
        let scm = self
            .scm
            .client_for(token)
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        let issue = scm
            .create_issue(&coords, &text.title, &body)
            .await
            .map_err(|e| EngineError::BadGateway(format!("failed to create issue: {e}")))?;

        Ok((issue.number, issue.html_url, issue.title, issue.body))
    }
}

/// Render the issue body filed on the text-description path.
fn compose_issue_body(text: &TextDescriptionInput) -> String {
    let mut body = String::new();
    body.push_str("## Symptoms\n\n");
    body.push_str(&text.symptoms);
    body.push('\n');

    let mut section = |heading: &str, content: &Option<String>| {
        if let Some(content) = content.as_deref().filter(|c| !c.is_empty()) {
            body.push_str(&format!("\n## {heading}\n\n{content}\n"));
        }
    };
    section("Reproduction Steps", &text.reproduction_steps);
    section("Expected Behavior", &text.expected_behavior);
    section("Actual Behavior", &text.actual_behavior);
    section("Additional Context", &text.additional_context);

    body.push_str("\n---\n_Filed by the agentic control plane._\n");
    body
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
