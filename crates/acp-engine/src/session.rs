use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use acp_api_types::CreateSessionRequest;
use acp_core::repo_url::repo_name_from_url;
use acp_core::session::{
    session_name, AgenticSession, AgenticSessionSpec, LlmSettings, RepoRef, ResourceOverrides,
    SessionRepo, UserContext,
};
use acp_core::types::{self, SessionType, WorkflowPhase};
use acp_core::workflow::BugFixWorkflow;
use acp_integrations::github::ScmFactory;
use acp_integrations::scm::SourceControl;
use acp_integrations::types::{gist_id_from_url, IssueRef, RepoCoords};
use acp_store::{CredentialBroker, CredentialError, ResourceStore, StoreError};

use crate::error::{EngineError, OpenPrConflict};
use crate::events::{ControlPlaneEvent, EventBus, EventKind};
use crate::prompt;

// Reserved environment keys injected into every session. User-supplied
// variables never override these.
pub const ENV_ISSUE_NUMBER: &str = "GITHUB_ISSUE_NUMBER";
pub const ENV_ISSUE_URL: &str = "GITHUB_ISSUE_URL";
pub const ENV_WORKFLOW_ID: &str = "BUGFIX_WORKFLOW_ID";
pub const ENV_SESSION_TYPE: &str = "SESSION_TYPE";
pub const ENV_PROJECT_NAME: &str = "PROJECT_NAME";
pub const ENV_AGENT_PERSONAS: &str = "AGENT_PERSONAS";

/// The `claude` label marking issues that already carry an assessment.
const CLAUDE_LABEL: &str = "claude";

/// Creates sessions under a workflow: preflight gate, prompt composition,
/// repo mapping, environment injection, and best-effort runner-token
/// provisioning.
pub struct SessionService {
    store: Arc<dyn ResourceStore>,
    broker: Arc<dyn CredentialBroker>,
    scm: Arc<dyn ScmFactory>,
    bus: EventBus,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        broker: Arc<dyn CredentialBroker>,
        scm: Arc<dyn ScmFactory>,
        bus: EventBus,
    ) -> Self {
        Self { store, broker, scm, bus }
    }

    pub async fn create(
        &self,
        project: &str,
        user_id: &str,
        workflow_id: &str,
        req: CreateSessionRequest,
    ) -> Result<AgenticSession, EngineError> {
        let session_type = SessionType::parse(&req.session_type)
            .ok_or_else(|| EngineError::Invalid(format!("invalid session type: {}", req.session_type)))?;

        let workflow = self.store.get_workflow(project, workflow_id).await?;
        if workflow.status_or_default().phase != WorkflowPhase::Ready {
            return Err(EngineError::Invalid(format!(
                "workflow {workflow_id} is not Ready (phase: {})",
                workflow.status_or_default().phase
            )));
        }

        let token = match self.broker.user_token(project, user_id).await {
            Ok(t) => Some(t),
            Err(CredentialError::NoCredential { .. }) => {
                warn!(project, user = user_id, "no source-control credential; preflight gate bypassed");
                None
            }
            Err(e) => return Err(EngineError::Internal(e.to_string())),
        };
        let scm = self
            .scm
            .client_for(token.as_deref())
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        let issue_ref = IssueRef::parse(&workflow.spec.issue_url);

        if session_type == SessionType::BugImplementFix && token.is_some() {
            self.preflight_open_pr_gate(&*scm, &workflow, issue_ref.as_ref()).await?;
        }

        let base_prompt = match session_type {
            SessionType::BugReview => {
                let existing = match &issue_ref {
                    Some(r) => self.harvest_claude_assessment(&*scm, r).await,
                    None => None,
                };
                prompt::compose_bug_review_prompt(&workflow.spec.issue_url, existing.as_deref())
            }
            SessionType::BugImplementFix => {
                let plan = self.resolve_plan(&*scm, &workflow, issue_ref.as_ref()).await;
                prompt::compose_implement_prompt(&workflow.spec.issue_url, plan.as_deref())
            }
        };
        let full_prompt = prompt::append_user_description(base_prompt, req.description.as_deref());

        let session = self
            .persist_session(project, user_id, &workflow, session_type, &req, full_prompt)
            .await?;
        let name = session.metadata.name.clone().unwrap_or_default();

        // Provisioning failure is logged but not fatal: the session exists,
        // the runner just cannot update its status and that is surfaced
        // later.
        if let Err(e) = self.broker.provision_runner_token(project, &name).await {
            warn!(session = %name, error = %e, "runner token provisioning failed");
        }

        self.bus.publish(
            ControlPlaneEvent::new(EventKind::SessionStarted, project, workflow_id)
                .with_session(&name),
        );
        info!(project, workflow = workflow_id, session = %name, "session created");
        Ok(session)
    }

    /// List the workflow's sessions. The label selector is the only join.
    pub async fn list(&self, project: &str, workflow_id: &str) -> Result<Vec<AgenticSession>, EngineError> {
        self.store.get_workflow(project, workflow_id).await?;
        let selector = types::workflow_session_selector(project, workflow_id);
        Ok(self.store.list_sessions_by_label(project, &selector).await?)
    }

    pub async fn get(
        &self,
        project: &str,
        workflow_id: &str,
        name: &str,
    ) -> Result<AgenticSession, EngineError> {
        let session = self.store.get_session(project, name).await?;
        if session.label(types::LABEL_WORKFLOW) != Some(workflow_id) {
            return Err(EngineError::NotFound(format!(
                "session {name} does not belong to workflow {workflow_id}"
            )));
        }
        Ok(session)
    }

    // ---- preflight --------------------------------------------------------

    /// Refuse to create an implementation session while an open PR exists
    /// for the origin issue. Source-control trouble bypasses the gate with
    /// a warning; the gate must never block on a flaky provider.
    async fn preflight_open_pr_gate(
        &self,
        scm: &dyn SourceControl,
        workflow: &BugFixWorkflow,
        issue_ref: Option<&IssueRef>,
    ) -> Result<(), EngineError> {
        let repo = match issue_ref {
            Some(r) => r.repo.clone(),
            None => match RepoCoords::from_repo_url(&workflow.spec.implementation_repo.url) {
                Some(c) => c,
                None => return Ok(()),
            },
        };

        let prs = match scm.list_open_pull_requests(&repo).await {
            Ok(prs) => prs,
            Err(e) => {
                warn!(error = %e, "PR listing failed; preflight gate bypassed");
                return Ok(());
            }
        };

        let issue_marker = format!("#{}", workflow.spec.issue_number);
        if let Some(pr) = prs.iter().find(|pr| {
            pr.head_branch == workflow.spec.branch_name
                || pr.title.contains(&issue_marker)
                || pr.body.as_deref().is_some_and(|b| b.contains(&issue_marker))
        }) {
            return Err(EngineError::OpenPr(OpenPrConflict {
                number: pr.number,
                url: pr.html_url.clone(),
                state: pr.state.clone(),
                branch: pr.head_branch.clone(),
            }));
        }
        Ok(())
    }

    // ---- prompt sourcing --------------------------------------------------

    /// Claude-authored comments on the origin issue, if it bears the
    /// `claude` label. Read failures degrade to "no assessment".
    async fn harvest_claude_assessment(
        &self,
        scm: &dyn SourceControl,
        issue_ref: &IssueRef,
    ) -> Option<String> {
        let labels = match scm.list_issue_labels(&issue_ref.repo, issue_ref.number).await {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, "label listing failed during prompt composition");
                return None;
            }
        };
        if !labels.iter().any(|l| l.eq_ignore_ascii_case(CLAUDE_LABEL)) {
            return None;
        }
        match scm.list_comments(&issue_ref.repo, issue_ref.number).await {
            Ok(comments) => prompt::filter_claude_comments(&comments),
            Err(e) => {
                warn!(error = %e, "comment listing failed during prompt composition");
                None
            }
        }
    }

    /// Resolution plan for bug-implement-fix: the review gist first, the
    /// harvested comments second.
    async fn resolve_plan(
        &self,
        scm: &dyn SourceControl,
        workflow: &BugFixWorkflow,
        issue_ref: Option<&IssueRef>,
    ) -> Option<String> {
        if let Some(gist_url) = workflow.annotation(types::ANN_BUG_REVIEW_GIST_URL) {
            if let Some(id) = gist_id_from_url(gist_url) {
                match scm.gist_content(id).await {
                    Ok(content) if !content.is_empty() => return Some(content),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "review gist fetch failed, falling back to comments"),
                }
            }
        }
        match issue_ref {
            Some(r) => self.harvest_claude_assessment(scm, r).await,
            None => None,
        }
    }

    // ---- construction -----------------------------------------------------

    async fn persist_session(
        &self,
        project: &str,
        user_id: &str,
        workflow: &BugFixWorkflow,
        session_type: SessionType,
        req: &CreateSessionRequest,
        prompt: String,
    ) -> Result<AgenticSession, EngineError> {
        let spec = &workflow.spec;

        let repo = SessionRepo {
            name: repo_name_from_url(&spec.implementation_repo.url),
            input: RepoRef {
                url: spec.implementation_repo.url.clone(),
                branch: spec.implementation_repo.branch.clone(),
            },
            output: RepoRef {
                url: spec.implementation_repo.url.clone(),
                branch: Some(spec.branch_name.clone()),
            },
        };

        let mut env = req.environment_variables.clone().unwrap_or_default();
        env.insert(ENV_ISSUE_NUMBER.into(), spec.issue_number.to_string());
        env.insert(ENV_ISSUE_URL.into(), spec.issue_url.clone());
        env.insert(ENV_WORKFLOW_ID.into(), spec.id.clone());
        env.insert(ENV_SESSION_TYPE.into(), session_type.as_str().to_string());
        env.insert(ENV_PROJECT_NAME.into(), project.to_string());
        if let Some(personas) = req.agent_personas.as_deref().filter(|p| !p.is_empty()) {
            env.insert(ENV_AGENT_PERSONAS.into(), personas.to_string());
        }

        let mut llm = LlmSettings::default();
        if let Some(input) = &req.llm_settings {
            if let Some(model) = &input.model {
                llm.model = model.clone();
            }
            if let Some(temperature) = input.temperature {
                llm.temperature = temperature;
            }
            if let Some(max_tokens) = input.max_tokens {
                llm.max_tokens = max_tokens;
            }
        }

        let resource_overrides = req.resource_overrides.as_ref().map(|o| ResourceOverrides {
            cpu: o.cpu.clone(),
            memory: o.memory.clone(),
            storage_class: o.storage_class.clone(),
            priority_class: o.priority_class.clone(),
        });

        let display_name = match session_type {
            SessionType::BugReview => format!("Bug review for issue #{}", spec.issue_number),
            SessionType::BugImplementFix => format!("Fix implementation for issue #{}", spec.issue_number),
        };

        let build = |name: &str| {
            let mut session = AgenticSession::new(
                name,
                AgenticSessionSpec {
                    session_type,
                    prompt: prompt.clone(),
                    display_name: display_name.clone(),
                    description: req.description.clone(),
                    repos: vec![repo.clone()],
                    auto_push_on_complete: req.auto_push_on_complete.unwrap_or(true),
                    llm_settings: llm.clone(),
                    resource_overrides: resource_overrides.clone(),
                    environment_variables: env.clone(),
                    user_context: UserContext { user_id: user_id.to_string() },
                    project: project.to_string(),
                },
            );
            session.metadata.labels = Some(types::session_labels(
                project,
                &spec.id,
                session_type,
                spec.issue_number,
            ));
            session
        };

        // Names are second-granular; on a same-second collision retry once
        // with the next second.
        let now = Utc::now().timestamp();
        let first = build(&session_name(&spec.id, session_type, now));
        match self.store.create_session(project, first).await {
            Ok(s) => Ok(s),
            Err(StoreError::Conflict(_)) => {
                let second = build(&session_name(&spec.id, session_type, now + 1));
                Ok(self.store.create_session(project, second).await?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use acp_api_types::LlmSettingsInput;
    use acp_core::workflow::{BugFixWorkflowSpec, BugFixWorkflowStatus, ImplementationRepo};
    use acp_integrations::scm::{StubScmFactory, StubSourceControl};
    use acp_integrations::types::{Issue, IssueComment, PullRequest};
    use acp_store::{MemoryCredentialBroker, MemoryResourceStore};

    struct Fixture {
        svc: SessionService,
        scm: Arc<StubSourceControl>,
        store: Arc<MemoryResourceStore>,
        broker: Arc<MemoryCredentialBroker>,
        bus: EventBus,
    }

    fn fixture(with_token: bool) -> Fixture {
        let store = Arc::new(MemoryResourceStore::new());
        let broker = if with_token {
            Arc::new(MemoryCredentialBroker::new().with_user_token("proj-a", "alice", "ghp_x"))
        } else {
            Arc::new(MemoryCredentialBroker::new())
        };
        let scm = Arc::new(StubSourceControl::new());
        let bus = EventBus::new();
        let svc = SessionService::new(
            store.clone(),
            broker.clone(),
            Arc::new(StubScmFactory(scm.clone())),
            bus.clone(),
        );
        Fixture { svc, scm, store, broker, bus }
    }

    async fn seed_workflow(store: &MemoryResourceStore) -> BugFixWorkflow {
        let workflow = BugFixWorkflow::new(
            "42",
            BugFixWorkflowSpec {
                id: "42".into(),
                issue_number: 42,
                issue_url: "https://github.com/acme/svc/issues/42".into(),
                title: "Login fails".into(),
                description: None,
                branch_name: "bugfix/gh-42".into(),
                implementation_repo: ImplementationRepo {
                    url: "https://github.com/acme/svc.git".into(),
                    branch: Some("main".into()),
                },
                project: "proj-a".into(),
                created_by: "alice".into(),
                created_at: Utc::now(),
            },
        );
        store.upsert_workflow("proj-a", workflow.clone()).await.unwrap();
        store
            .update_workflow_status(
                "proj-a",
                "42",
                BugFixWorkflowStatus { phase: WorkflowPhase::Ready, ..Default::default() },
            )
            .await
            .unwrap();
        store.get_workflow("proj-a", "42").await.unwrap()
    }

    fn review_request() -> CreateSessionRequest {
        CreateSessionRequest {
            session_type: "bug-review".into(),
            description: None,
            environment_variables: None,
            llm_settings: None,
            resource_overrides: None,
            auto_push_on_complete: None,
            agent_personas: None,
        }
    }

    fn implement_request() -> CreateSessionRequest {
        CreateSessionRequest { session_type: "bug-implement-fix".into(), ..review_request() }
    }

    fn claude_comment(body: &str) -> IssueComment {
        IssueComment {
            id: "9".into(),
            body: body.into(),
            author_login: "claude-code[bot]".into(),
            author_type: "Bot".into(),
            html_url: "https://github.com/acme/svc/issues/42#issuecomment-9".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn invalid_session_type_rejected() {
        let f = fixture(true);
        seed_workflow(&f.store).await;
        let mut req = review_request();
        req.session_type = "code-review".into();
        assert!(matches!(
            f.svc.create("proj-a", "alice", "42", req).await.unwrap_err(),
            EngineError::Invalid(_)
        ));
    }

    #[tokio::test]
    async fn workflow_must_be_ready() {
        let f = fixture(true);
        let workflow = seed_workflow(&f.store).await;
        f.store
            .update_workflow_status(
                "proj-a",
                "42",
                BugFixWorkflowStatus { phase: WorkflowPhase::Failed, ..workflow.status_or_default() },
            )
            .await
            .unwrap();

        assert!(matches!(
            f.svc.create("proj-a", "alice", "42", review_request()).await.unwrap_err(),
            EngineError::Invalid(_)
        ));
    }

    #[tokio::test]
    async fn review_session_carries_labels_repos_env_and_prompt() {
        let f = fixture(true);
        seed_workflow(&f.store).await;

        let session = f.svc.create("proj-a", "alice", "42", review_request()).await.unwrap();
        let spec = &session.spec;

        assert!(spec.prompt.contains("https://github.com/acme/svc/issues/42"));
        assert_eq!(spec.repos.len(), 1);
        assert_eq!(spec.repos[0].name, "svc");
        assert_eq!(spec.repos[0].input.branch.as_deref(), Some("main"));
        assert_eq!(spec.repos[0].output.branch.as_deref(), Some("bugfix/gh-42"));
        assert!(spec.auto_push_on_complete);
        assert_eq!(spec.llm_settings, LlmSettings::default());
        assert_eq!(spec.user_context.user_id, "alice");

        assert_eq!(spec.environment_variables.get(ENV_ISSUE_NUMBER).unwrap(), "42");
        assert_eq!(spec.environment_variables.get(ENV_WORKFLOW_ID).unwrap(), "42");
        assert_eq!(spec.environment_variables.get(ENV_SESSION_TYPE).unwrap(), "bug-review");
        assert_eq!(spec.environment_variables.get(ENV_PROJECT_NAME).unwrap(), "proj-a");

        assert_eq!(session.label(types::LABEL_WORKFLOW), Some("42"));
        assert_eq!(session.label(types::LABEL_SESSION_TYPE), Some("bug-review"));

        // Runner token was provisioned for the new session.
        let name = session.metadata.name.as_deref().unwrap();
        assert!(f.broker.provisioned_for(name));
    }

    #[tokio::test]
    async fn reserved_env_keys_override_user_supplied() {
        let f = fixture(true);
        seed_workflow(&f.store).await;

        let mut req = review_request();
        req.environment_variables = Some(
            [
                ("GITHUB_ISSUE_NUMBER".to_string(), "999".to_string()),
                ("CUSTOM".to_string(), "kept".to_string()),
            ]
            .into(),
        );
        let session = f.svc.create("proj-a", "alice", "42", req).await.unwrap();
        assert_eq!(session.spec.environment_variables.get(ENV_ISSUE_NUMBER).unwrap(), "42");
        assert_eq!(session.spec.environment_variables.get("CUSTOM").unwrap(), "kept");
    }

    #[tokio::test]
    async fn llm_settings_partially_overridable() {
        let f = fixture(true);
        seed_workflow(&f.store).await;

        let mut req = review_request();
        req.llm_settings = Some(LlmSettingsInput {
            model: None,
            temperature: Some(0.2),
            max_tokens: None,
        });
        let session = f.svc.create("proj-a", "alice", "42", req).await.unwrap();
        assert_eq!(session.spec.llm_settings.model, "claude-sonnet-4-20250514");
        assert_eq!(session.spec.llm_settings.temperature, 0.2);
        assert_eq!(session.spec.llm_settings.max_tokens, 4000);
    }

    #[tokio::test]
    async fn review_prompt_harvests_claude_comments_behind_label() {
        let f = fixture(true);
        seed_workflow(&f.store).await;
        let repo = RepoCoords::new("acme", "svc");
        f.scm.put_issue(
            &repo,
            Issue {
                number: 42,
                title: "t".into(),
                body: None,
                labels: vec![],
                html_url: "https://github.com/acme/svc/issues/42".into(),
                author: "r".into(),
            },
        );
        f.scm.put_comment(&repo, 42, claude_comment("prior assessment body"));

        // Without the claude label the comments stay out of the prompt.
        let session = f.svc.create("proj-a", "alice", "42", review_request()).await.unwrap();
        assert!(!session.spec.prompt.contains("prior assessment body"));

        // With the label they come in.
        f.scm.add_issue_label(&repo, 42, "Claude").await.unwrap();
        let session = f.svc.create("proj-a", "alice", "42", review_request()).await.unwrap();
        assert!(session.spec.prompt.contains("EXISTING CLAUDE ASSESSMENT:"));
        assert!(session.spec.prompt.contains("prior assessment body"));
    }

    #[tokio::test]
    async fn implement_plan_prefers_review_gist() {
        let f = fixture(true);
        seed_workflow(&f.store).await;
        f.scm.put_gist("abc123", "https://gist.github.com/acp/abc123", "plan from gist");
        f.store
            .update_workflow_with("proj-a", "42", &|w| {
                w.record_annotation(types::ANN_BUG_REVIEW_GIST_URL, "https://gist.github.com/acp/abc123");
            })
            .await
            .unwrap();
        let repo = RepoCoords::new("acme", "svc");
        f.scm.add_issue_label(&repo, 42, "claude").await.unwrap();
        f.scm.put_comment(&repo, 42, claude_comment("plan from comments"));

        let session = f.svc.create("proj-a", "alice", "42", implement_request()).await.unwrap();
        assert!(session.spec.prompt.contains("RESOLUTION PLAN:\nplan from gist"));
        assert!(!session.spec.prompt.contains("plan from comments"));
    }

    #[tokio::test]
    async fn implement_plan_falls_back_to_comments_then_none() {
        let f = fixture(true);
        seed_workflow(&f.store).await;
        let repo = RepoCoords::new("acme", "svc");

        // No gist, no comments: the no-plan note.
        let session = f.svc.create("proj-a", "alice", "42", implement_request()).await.unwrap();
        assert!(session.spec.prompt.contains("No existing resolution plan was found"));

        // Comments behind the label become the fallback plan.
        f.scm.add_issue_label(&repo, 42, "claude").await.unwrap();
        f.scm.put_comment(&repo, 42, claude_comment("plan from comments"));
        let session = f.svc.create("proj-a", "alice", "42", implement_request()).await.unwrap();
        assert!(session.spec.prompt.contains("RESOLUTION PLAN:\nplan from comments"));
    }

    #[tokio::test]
    async fn preflight_blocks_on_open_pr_for_branch() {
        let f = fixture(true);
        seed_workflow(&f.store).await;
        f.scm.put_open_pr(PullRequest {
            number: 7,
            title: "fix login".into(),
            body: None,
            state: "open".into(),
            head_branch: "bugfix/gh-42".into(),
            base_branch: "main".into(),
            html_url: "https://github.com/acme/svc/pull/7".into(),
        });

        let err = f.svc.create("proj-a", "alice", "42", implement_request()).await.unwrap_err();
        match err {
            EngineError::OpenPr(pr) => {
                assert_eq!(pr.number, 7);
                assert_eq!(pr.state, "open");
                assert_eq!(pr.branch, "bugfix/gh-42");
            }
            other => panic!("expected OpenPr, got {other:?}"),
        }

        // No session CR was created.
        let sel = types::workflow_session_selector("proj-a", "42");
        assert!(f.store.list_sessions_by_label("proj-a", &sel).await.unwrap().is_empty());

        // Repeating the preflight sees the same state.
        let err = f.svc.create("proj-a", "alice", "42", implement_request()).await.unwrap_err();
        assert!(matches!(err, EngineError::OpenPr(_)));
    }

    #[tokio::test]
    async fn preflight_ignores_unrelated_prs_and_gates_only_implement() {
        let f = fixture(true);
        seed_workflow(&f.store).await;
        f.scm.put_open_pr(PullRequest {
            number: 9,
            title: "unrelated".into(),
            body: Some("does not mention the issue".into()),
            state: "open".into(),
            head_branch: "other-branch".into(),
            base_branch: "main".into(),
            html_url: "https://github.com/acme/svc/pull/9".into(),
        });

        assert!(f.svc.create("proj-a", "alice", "42", implement_request()).await.is_ok());
        // bug-review has no gate at all.
        assert!(f.svc.create("proj-a", "alice", "42", review_request()).await.is_ok());
    }

    #[tokio::test]
    async fn preflight_bypassed_without_credentials() {
        let f = fixture(false);
        seed_workflow(&f.store).await;
        f.scm.put_open_pr(PullRequest {
            number: 7,
            title: "fix".into(),
            body: None,
            state: "open".into(),
            head_branch: "bugfix/gh-42".into(),
            base_branch: "main".into(),
            html_url: "https://github.com/acme/svc/pull/7".into(),
        });

        // Missing credential bypasses the gate; the session is created.
        assert!(f.svc.create("proj-a", "alice", "42", implement_request()).await.is_ok());
    }

    #[tokio::test]
    async fn preflight_bypassed_on_provider_error() {
        let f = fixture(true);
        seed_workflow(&f.store).await;
        f.scm.fail_pr_listing(true);
        assert!(f.svc.create("proj-a", "alice", "42", implement_request()).await.is_ok());
    }

    #[tokio::test]
    async fn runner_token_failure_is_not_fatal() {
        let f = fixture(true);
        seed_workflow(&f.store).await;
        f.broker.fail_provisioning(true);

        let session = f.svc.create("proj-a", "alice", "42", review_request()).await.unwrap();
        let name = session.metadata.name.as_deref().unwrap();
        assert!(!f.broker.provisioned_for(name));
        assert!(f.store.get_session("proj-a", name).await.is_ok());
    }

    #[tokio::test]
    async fn session_started_event_published() {
        let f = fixture(true);
        seed_workflow(&f.store).await;
        let rx = f.bus.subscribe();

        f.svc.create("proj-a", "alice", "42", review_request()).await.unwrap();
        let events: Vec<_> = rx.drain().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::SessionStarted);
        assert_eq!(events[0].workflow_id, "42");
    }

    #[tokio::test]
    async fn list_and_get_go_through_the_label_join() {
        let f = fixture(true);
        seed_workflow(&f.store).await;
        let session = f.svc.create("proj-a", "alice", "42", review_request()).await.unwrap();
        let name = session.metadata.name.as_deref().unwrap();

        let listed = f.svc.list("proj-a", "42").await.unwrap();
        assert_eq!(listed.len(), 1);

        assert!(f.svc.get("proj-a", "42", name).await.is_ok());
        assert!(matches!(
            f.svc.get("proj-a", "99", name).await.unwrap_err(),
            EngineError::NotFound(_)
        ));

        assert!(matches!(
            f.svc.list("proj-a", "99").await.unwrap_err(),
            EngineError::NotFound(_)
        ));
    }
}
