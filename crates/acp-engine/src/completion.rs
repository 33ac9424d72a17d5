use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use acp_core::session::AgenticSession;
use acp_core::types::{
    self, AssessmentStatus, SessionPhase, SessionType, ANN_BUG_REVIEW_COMMENT_ID,
    ANN_BUG_REVIEW_COMMENT_URL, ANN_BUG_REVIEW_GIST_URL, ANN_GITHUB_PR_NUMBER, ANN_GITHUB_PR_STATE,
    ANN_GITHUB_PR_URL, ANN_IMPLEMENTATION_COMMENT_ID, ANN_IMPLEMENTATION_COMMENT_URL,
    ANN_IMPLEMENTATION_GIST_URL, ANN_PR_CREATED_BY, PR_CREATED_BY_EXTERNAL, PR_CREATED_BY_VTEAM,
};
use acp_core::workflow::BugFixWorkflow;
use acp_integrations::github::ScmFactory;
use acp_integrations::scm::SourceControl;
use acp_integrations::tracker::format::{
    implementation_attachment_filename, review_attachment_filename,
};
use acp_integrations::types::{Gist, IssueRef, RepoCoords};
use acp_store::{CredentialBroker, ResourceStore};

use crate::error::EngineError;
use crate::events::{ControlPlaneEvent, EventBus, EventKind};

/// Key inside the runner secret holding the control plane's own SCM token.
const BOT_TOKEN_KEY: &str = "GITHUB_TOKEN";
/// Label stamped on origin issues once an assessment exists.
const CLAUDE_LABEL: &str = "claude";

// ---------------------------------------------------------------------------
// Event envelope
// ---------------------------------------------------------------------------

/// Watch-style event type as delivered by the webhook or the pull watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchEventType {
    #[serde(rename = "ADDED")]
    Added,
    #[serde(rename = "MODIFIED")]
    Modified,
    #[serde(rename = "DELETED")]
    Deleted,
}

/// `{type, object}` envelope shared by both delivery transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    #[serde(rename = "type")]
    pub event_type: WatchEventType,
    pub object: AgenticSession,
}

/// The pull request resolved in step 2 of the implementation handler.
#[derive(Debug, Clone)]
struct ResolvedPr {
    number: String,
    url: String,
    state: String,
    created_by: &'static str,
}

// ---------------------------------------------------------------------------
// CompletionRouter
// ---------------------------------------------------------------------------

/// Reacts to session status transitions to `Completed` with per-type
/// external publication.
///
/// Runs under the service account: watch and webhook events carry no user
/// identity, so the store handle here is the elevated one and the SCM
/// authority is the project's bot token. Every external step is best-effort;
/// only the initial workflow fetch and the final persist are authoritative.
pub struct CompletionRouter {
    store: Arc<dyn ResourceStore>,
    broker: Arc<dyn CredentialBroker>,
    scm: Arc<dyn ScmFactory>,
    bus: EventBus,
}

impl CompletionRouter {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        broker: Arc<dyn CredentialBroker>,
        scm: Arc<dyn ScmFactory>,
        bus: EventBus,
    ) -> Self {
        Self { store, broker, scm, bus }
    }

    /// Process one observed event. Events that fail the gate are dropped
    /// silently; a missing workflow is logged and dropped.
    pub async fn handle_event(&self, event: &SessionEvent) -> Result<(), EngineError> {
        let session = &event.object;
        if event.event_type != WatchEventType::Modified
            || session.phase() != SessionPhase::Completed
        {
            return Ok(());
        }

        let project = session.spec.project.clone();
        let Some(workflow_id) = session.label(types::LABEL_WORKFLOW).map(String::from) else {
            warn!(session = ?session.metadata.name, "completed session without workflow label, dropping");
            return Ok(());
        };

        let workflow = match self.store.get_workflow(&project, &workflow_id).await {
            Ok(w) => w,
            Err(e) => {
                warn!(workflow = %workflow_id, error = %e, "workflow lookup failed, dropping event");
                return Ok(());
            }
        };

        match session.spec.session_type {
            SessionType::BugReview => self.handle_bug_review(&project, workflow, session).await?,
            SessionType::BugImplementFix => {
                self.handle_implement_fix(&project, workflow, session).await?
            }
        }

        self.bus.publish(
            ControlPlaneEvent::new(EventKind::SessionCompleted, &project, &workflow_id)
                .with_session(&session.metadata.name.clone().unwrap_or_default()),
        );
        Ok(())
    }

    // ---- bug-review -------------------------------------------------------

    async fn handle_bug_review(
        &self,
        project: &str,
        workflow: BugFixWorkflow,
        session: &AgenticSession,
    ) -> Result<(), EngineError> {
        let workflow_id = workflow.spec.id.clone();
        let issue_number = workflow.spec.issue_number;
        let session_name = session.metadata.name.clone().unwrap_or_default();

        // An empty result is a valid terminal state: the existing assessment
        // was confirmed and there is nothing to publish.
        let result = session.result_text().unwrap_or_default();
        if result.is_empty() {
            self.latch_assessment_complete(project, &workflow_id).await?;
            info!(workflow = %workflow_id, "empty review result, assessment confirmed");
            return Ok(());
        }

        let scm = self.bot_scm(project).await;
        let issue_ref = IssueRef::parse(&workflow.spec.issue_url);

        // Step: publish the assessment as a gist.
        let gist = self
            .create_gist_step(
                &*scm,
                &review_attachment_filename(issue_number),
                &format!("Bug Review & Assessment for Issue #{issue_number}"),
                result,
            )
            .await;

        // Step: summary comment on the origin issue, inline fallback when
        // the gist did not materialize.
        let comment = match &issue_ref {
            Some(r) => {
                let body = match &gist {
                    Some(g) => format!(
                        "Bug review & assessment completed.\n\nFull assessment: {}\n\nSession: `{session_name}`",
                        g.html_url
                    ),
                    None => format!(
                        "Bug review & assessment completed.\n\n{result}\n\nSession: `{session_name}`"
                    ),
                };
                match scm.add_comment(&r.repo, r.number, &body).await {
                    Ok(c) => Some(c),
                    Err(e) => {
                        warn!(error = %e, "review summary comment failed");
                        None
                    }
                }
            }
            None => {
                warn!(issue_url = %workflow.spec.issue_url, "unparseable issue URL, skipping comment");
                None
            }
        };

        // Step: make sure the origin issue carries the claude label.
        if let Some(r) = &issue_ref {
            if let Err(e) = scm.add_issue_label(&r.repo, r.number, CLAUDE_LABEL).await {
                warn!(error = %e, "claude label addition failed");
            }
        }

        // Authoritative persist: annotations, then status.
        let gist_url = gist.as_ref().map(|g| g.html_url.clone());
        let comment_id = comment.as_ref().map(|c| c.id.clone());
        let comment_url = comment.as_ref().map(|c| c.html_url.clone());
        self.store
            .update_workflow_with(project, &workflow_id, &move |w| {
                if let Some(url) = &gist_url {
                    w.record_annotation(ANN_BUG_REVIEW_GIST_URL, url);
                }
                if let Some(id) = &comment_id {
                    w.record_annotation(ANN_BUG_REVIEW_COMMENT_ID, id);
                }
                if let Some(url) = &comment_url {
                    w.record_annotation(ANN_BUG_REVIEW_COMMENT_URL, url);
                }
            })
            .await?;
        self.latch_assessment_complete(project, &workflow_id).await?;

        info!(workflow = %workflow_id, session = %session_name, "bug-review completion processed");
        Ok(())
    }

    // ---- bug-implement-fix ------------------------------------------------

    async fn handle_implement_fix(
        &self,
        project: &str,
        workflow: BugFixWorkflow,
        session: &AgenticSession,
    ) -> Result<(), EngineError> {
        let workflow_id = workflow.spec.id.clone();
        let issue_number = workflow.spec.issue_number;
        let session_name = session.metadata.name.clone().unwrap_or_default();
        let result = session.result_text().unwrap_or_default();

        let scm = self.bot_scm(project).await;
        let issue_ref = IssueRef::parse(&workflow.spec.issue_url);
        let impl_coords = RepoCoords::from_repo_url(&workflow.spec.implementation_repo.url);

        let resolved_pr = self.preresolve_pr(&*scm, &workflow).await;

        let gist = if result.is_empty() {
            None
        } else {
            self.create_gist_step(
                &*scm,
                &implementation_attachment_filename(issue_number),
                &format!("Implementation Summary for Issue #{issue_number}"),
                result,
            )
            .await
        };

        let comment = match &issue_ref {
            Some(r) => {
                let body = implement_comment_body(
                    &workflow,
                    gist.as_ref(),
                    resolved_pr.as_ref(),
                    impl_coords.as_ref(),
                    result,
                    &session_name,
                );
                match scm.add_comment(&r.repo, r.number, &body).await {
                    Ok(c) => Some(c),
                    Err(e) => {
                        warn!(error = %e, "implementation summary comment failed");
                        None
                    }
                }
            }
            None => None,
        };

        // Authoritative persist. Implementation annotations are write-once:
        // a later duplicate delivery must not clobber the journal.
        let gist_url = gist.as_ref().map(|g| g.html_url.clone());
        let comment_id = comment.as_ref().map(|c| c.id.clone());
        let comment_url = comment.as_ref().map(|c| c.html_url.clone());
        let pr = resolved_pr.clone();
        self.store
            .update_workflow_with(project, &workflow_id, &move |w| {
                if let Some(url) = &gist_url {
                    w.record_annotation_if_absent(ANN_IMPLEMENTATION_GIST_URL, url);
                }
                if let Some(id) = &comment_id {
                    w.record_annotation_if_absent(ANN_IMPLEMENTATION_COMMENT_ID, id);
                }
                if let Some(url) = &comment_url {
                    w.record_annotation_if_absent(ANN_IMPLEMENTATION_COMMENT_URL, url);
                }
                if let Some(pr) = &pr {
                    w.record_annotation_if_absent(ANN_GITHUB_PR_NUMBER, &pr.number);
                    w.record_annotation_if_absent(ANN_GITHUB_PR_URL, &pr.url);
                    w.record_annotation_if_absent(ANN_GITHUB_PR_STATE, &pr.state);
                    w.record_annotation_if_absent(ANN_PR_CREATED_BY, pr.created_by);
                }
            })
            .await?;

        // Latch implementationCompleted; the latch implies a complete
        // assessment, so both are written together.
        let current = self.store.get_workflow(project, &workflow_id).await?;
        let mut status = current.status_or_default();
        status.implementation_completed = true;
        status.assessment_status = AssessmentStatus::Complete;
        self.store.update_workflow_status(project, &workflow_id, status).await?;

        info!(workflow = %workflow_id, session = %session_name, "bug-implement-fix completion processed");
        Ok(())
    }

    // ---- shared steps -----------------------------------------------------

    /// SCM handle under the project's bot token; degrades to anonymous when
    /// the runner secret is unavailable.
    async fn bot_scm(&self, project: &str) -> Arc<dyn SourceControl> {
        let secret_name = match self.store.get_project_settings(project).await {
            Ok(Some(settings)) => settings.runner_secrets_name().to_string(),
            _ => acp_core::project_settings::DEFAULT_RUNNER_SECRETS_NAME.to_string(),
        };
        let token = match self.broker.runner_secrets(project, &secret_name).await {
            Ok(map) => map.get(BOT_TOKEN_KEY).cloned(),
            Err(e) => {
                warn!(project, error = %e, "runner secret unavailable, using anonymous SCM client");
                None
            }
        };
        match self.scm.client_for(token.as_deref()) {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "SCM client construction failed, falling back to anonymous");
                self.scm.client_for(None).expect("anonymous SCM client")
            }
        }
    }

    async fn create_gist_step(
        &self,
        scm: &dyn SourceControl,
        filename: &str,
        description: &str,
        content: &str,
    ) -> Option<Gist> {
        match scm.create_gist(filename, description, content, true).await {
            Ok(g) => Some(g),
            Err(e) => {
                warn!(filename, error = %e, "gist creation failed, falling back to inline comment");
                None
            }
        }
    }

    /// Step 2 of the implementation handler: prefer the PR already recorded
    /// in the annotation journal; otherwise look for an open PR on the
    /// feature branch.
    async fn preresolve_pr(
        &self,
        scm: &dyn SourceControl,
        workflow: &BugFixWorkflow,
    ) -> Option<ResolvedPr> {
        if let Some(url) = workflow.annotation(ANN_GITHUB_PR_URL) {
            let number = workflow
                .annotation(ANN_GITHUB_PR_NUMBER)
                .map(String::from)
                .or_else(|| url.rsplit('/').next().map(String::from))?;
            return Some(ResolvedPr {
                number,
                url: url.to_string(),
                state: workflow.annotation(ANN_GITHUB_PR_STATE).unwrap_or("open").to_string(),
                created_by: PR_CREATED_BY_VTEAM,
            });
        }

        let coords = RepoCoords::from_repo_url(&workflow.spec.implementation_repo.url)?;
        let prs = match scm.list_open_pull_requests(&coords).await {
            Ok(prs) => prs,
            Err(e) => {
                warn!(error = %e, "PR listing failed during completion, proceeding without PR");
                return None;
            }
        };
        let pr = prs.into_iter().find(|pr| pr.head_branch == workflow.spec.branch_name)?;
        let created_by = if workflow.annotation(ANN_GITHUB_PR_NUMBER) == Some(pr.number.to_string().as_str())
        {
            PR_CREATED_BY_VTEAM
        } else {
            PR_CREATED_BY_EXTERNAL
        };
        Some(ResolvedPr {
            number: pr.number.to_string(),
            url: pr.html_url,
            state: pr.state,
            created_by,
        })
    }

    /// Set `assessmentStatus=complete`, preserving the rest of the status
    /// block.
    async fn latch_assessment_complete(&self, project: &str, workflow_id: &str) -> Result<(), EngineError> {
        let current = self.store.get_workflow(project, workflow_id).await?;
        let mut status = current.status_or_default();
        if status.assessment_status == AssessmentStatus::Complete {
            return Ok(());
        }
        status.assessment_status = AssessmentStatus::Complete;
        Ok(self.store.update_workflow_status(project, workflow_id, status).await?)
    }
}

/// Compose the implementation summary comment: artifact link (or inline
/// text), PR guidance, and the local-review block.
fn implement_comment_body(
    workflow: &BugFixWorkflow,
    gist: Option<&Gist>,
    resolved_pr: Option<&ResolvedPr>,
    impl_coords: Option<&RepoCoords>,
    result: &str,
    session_name: &str,
) -> String {
    let branch = &workflow.spec.branch_name;
    let mut body = String::from("Implementation session completed.\n\n");

    match gist {
        Some(g) => body.push_str(&format!("Implementation summary: {}\n\n", g.html_url)),
        None if !result.is_empty() => body.push_str(&format!("{result}\n\n")),
        None => {}
    }

    match resolved_pr {
        Some(pr) => body.push_str(&format!("View the existing pull request: {}\n\n", pr.url)),
        None => match impl_coords {
            Some(c) => body.push_str(&format!(
                "Open a pull request from the feature branch: https://github.com/{}/{}/tree/{branch}\n\n",
                c.owner, c.repo
            )),
            None => body.push_str(&format!("Open a pull request from the feature branch `{branch}`.\n\n")),
        },
    }

    body.push_str(&format!(
        "To review locally:\n```\ngit fetch origin {branch}\ngit checkout {branch}\n```\n\nSession: `{session_name}`"
    ));
    body
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
