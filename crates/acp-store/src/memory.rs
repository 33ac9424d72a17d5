use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use kube::ResourceExt;

use acp_core::project_settings::ProjectSettings;
use acp_core::session::{AgenticSession, AgenticSessionStatus};
use acp_core::workflow::{BugFixWorkflow, BugFixWorkflowStatus};

use crate::error::StoreError;
use crate::traits::{ResourceStore, Result, WorkflowMutator};

/// In-memory resource store for tests and single-node development. Mirrors
/// the cluster store's optimistic-concurrency behavior, including a
/// fault-injection knob for conflict-path coverage.
#[derive(Default)]
pub struct MemoryResourceStore {
    workflows: DashMap<String, BugFixWorkflow>,
    sessions: DashMap<String, AgenticSession>,
    settings: DashMap<String, ProjectSettings>,
    version_counter: AtomicU64,
    /// Number of upcoming spec/metadata writes that fail with `Conflict`.
    conflicts_to_inject: AtomicUsize,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(project: &str, name: &str) -> String {
        format!("{project}/{name}")
    }

    fn next_version(&self) -> String {
        self.version_counter.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Make the next `n` workflow writes fail with `Conflict`. The store's
    /// own retry consumes injected conflicts, so `1` exercises the retry
    /// path and `2` exercises conflict surfacing.
    pub fn inject_conflicts(&self, n: usize) {
        self.conflicts_to_inject.store(n, Ordering::SeqCst);
    }

    fn take_injected_conflict(&self) -> bool {
        self.conflicts_to_inject
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn put_project_settings(&self, project: &str, settings: ProjectSettings) {
        self.settings.insert(project.to_string(), settings);
    }

    fn write_workflow(&self, project: &str, mut workflow: BugFixWorkflow) -> Result<BugFixWorkflow> {
        if self.take_injected_conflict() {
            return Err(StoreError::Conflict("injected conflict".into()));
        }
        workflow.metadata.resource_version = Some(self.next_version());
        let key = Self::key(project, &workflow.name_any());
        self.workflows.insert(key, workflow.clone());
        Ok(workflow)
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn get_workflow(&self, project: &str, id: &str) -> Result<BugFixWorkflow> {
        self.workflows
            .get(&Self::key(project, id))
            .map(|w| w.clone())
            .ok_or_else(|| StoreError::NotFound(format!("workflow {project}/{id}")))
    }

    async fn upsert_workflow(&self, project: &str, mut workflow: BugFixWorkflow) -> Result<BugFixWorkflow> {
        // Preserve status across spec/metadata replacement, like the
        // cluster's status subresource does.
        if workflow.status.is_none() {
            if let Some(existing) = self.workflows.get(&Self::key(project, &workflow.name_any())) {
                workflow.status = existing.status.clone();
            }
        }
        match self.write_workflow(project, workflow.clone()) {
            Ok(w) => Ok(w),
            Err(StoreError::Conflict(_)) => self.write_workflow(project, workflow),
            Err(e) => Err(e),
        }
    }

    async fn update_workflow_with(
        &self,
        project: &str,
        id: &str,
        mutate: WorkflowMutator<'_>,
    ) -> Result<BugFixWorkflow> {
        let mut workflow = self.get_workflow(project, id).await?;
        mutate(&mut workflow);
        match self.write_workflow(project, workflow) {
            Ok(w) => Ok(w),
            Err(StoreError::Conflict(_)) => {
                // Refetch-and-retry once, mirroring the kube store.
                let mut latest = self.get_workflow(project, id).await?;
                mutate(&mut latest);
                self.write_workflow(project, latest)
            }
            Err(e) => Err(e),
        }
    }

    async fn update_workflow_status(
        &self,
        project: &str,
        id: &str,
        status: BugFixWorkflowStatus,
    ) -> Result<()> {
        let mut entry = self
            .workflows
            .get_mut(&Self::key(project, id))
            .ok_or_else(|| StoreError::NotFound(format!("workflow {project}/{id}")))?;
        entry.status = Some(status);
        Ok(())
    }

    async fn list_workflows(&self, project: &str) -> Result<Vec<BugFixWorkflow>> {
        let prefix = format!("{project}/");
        let mut items: Vec<_> = self
            .workflows
            .iter()
            .filter(|e| e.key().starts_with(&prefix))
            .map(|e| e.value().clone())
            .collect();
        items.sort_by(|a, b| a.spec.id.cmp(&b.spec.id));
        Ok(items)
    }

    async fn delete_workflow(&self, project: &str, id: &str) -> Result<()> {
        self.workflows
            .remove(&Self::key(project, id))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("workflow {project}/{id}")))
    }

    async fn get_session(&self, project: &str, name: &str) -> Result<AgenticSession> {
        self.sessions
            .get(&Self::key(project, name))
            .map(|s| s.clone())
            .ok_or_else(|| StoreError::NotFound(format!("session {project}/{name}")))
    }

    async fn create_session(&self, project: &str, mut session: AgenticSession) -> Result<AgenticSession> {
        let key = Self::key(project, &session.name_any());
        if self.sessions.contains_key(&key) {
            return Err(StoreError::Conflict(format!("session {key} already exists")));
        }
        session.metadata.resource_version = Some(self.next_version());
        self.sessions.insert(key, session.clone());
        Ok(session)
    }

    async fn update_session_status(
        &self,
        project: &str,
        name: &str,
        status: AgenticSessionStatus,
    ) -> Result<()> {
        let mut entry = self
            .sessions
            .get_mut(&Self::key(project, name))
            .ok_or_else(|| StoreError::NotFound(format!("session {project}/{name}")))?;
        entry.status = Some(status);
        Ok(())
    }

    async fn list_sessions_by_label(&self, project: &str, selector: &str) -> Result<Vec<AgenticSession>> {
        let wanted: Vec<(&str, &str)> = selector
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|pair| pair.split_once('=').ok_or(pair))
            .collect::<std::result::Result<_, _>>()
            .map_err(|pair| StoreError::Invalid(format!("bad label selector segment: {pair}")))?;

        let prefix = format!("{project}/");
        let mut items: Vec<_> = self
            .sessions
            .iter()
            .filter(|e| e.key().starts_with(&prefix))
            .filter(|e| wanted.iter().all(|(k, v)| e.value().label(k) == Some(*v)))
            .map(|e| e.value().clone())
            .collect();
        items.sort_by_key(|s| s.name_any());
        Ok(items)
    }

    async fn delete_session(&self, project: &str, name: &str) -> Result<()> {
        self.sessions
            .remove(&Self::key(project, name))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("session {project}/{name}")))
    }

    async fn get_project_settings(&self, project: &str) -> Result<Option<ProjectSettings>> {
        Ok(self.settings.get(project).map(|s| s.clone()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use acp_core::session::{AgenticSessionSpec, LlmSettings, UserContext};
    use acp_core::types::{self, SessionType, WorkflowPhase};
    use acp_core::workflow::{BugFixWorkflowSpec, ImplementationRepo};
    use chrono::Utc;

    fn workflow(id: &str) -> BugFixWorkflow {
        BugFixWorkflow::new(
            id,
            BugFixWorkflowSpec {
                id: id.into(),
                issue_number: id.parse().unwrap_or(0),
                issue_url: format!("https://github.com/acme/svc/issues/{id}"),
                title: "a title".into(),
                description: None,
                branch_name: format!("bugfix/gh-{id}"),
                implementation_repo: ImplementationRepo {
                    url: "https://github.com/acme/svc.git".into(),
                    branch: Some("main".into()),
                },
                project: "proj-a".into(),
                created_by: "alice".into(),
                created_at: Utc::now(),
            },
        )
    }

    fn session(name: &str, workflow_id: &str, session_type: SessionType) -> AgenticSession {
        let mut s = AgenticSession::new(
            name,
            AgenticSessionSpec {
                session_type,
                prompt: "p".into(),
                display_name: name.into(),
                description: None,
                repos: vec![],
                auto_push_on_complete: true,
                llm_settings: LlmSettings::default(),
                resource_overrides: None,
                environment_variables: Default::default(),
                user_context: UserContext { user_id: "alice".into() },
                project: "proj-a".into(),
            },
        );
        s.metadata.labels = Some(types::session_labels("proj-a", workflow_id, session_type, 42));
        s
    }

    #[tokio::test]
    async fn upsert_then_get_roundtrip() {
        let store = MemoryResourceStore::new();
        store.upsert_workflow("proj-a", workflow("42")).await.unwrap();
        let got = store.get_workflow("proj-a", "42").await.unwrap();
        assert_eq!(got.spec.issue_number, 42);
        assert!(got.metadata.resource_version.is_some());
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = MemoryResourceStore::new();
        let err = store.get_workflow("proj-a", "7").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn status_survives_spec_upsert() {
        let store = MemoryResourceStore::new();
        store.upsert_workflow("proj-a", workflow("42")).await.unwrap();
        store
            .update_workflow_status(
                "proj-a",
                "42",
                BugFixWorkflowStatus { phase: WorkflowPhase::Ready, ..Default::default() },
            )
            .await
            .unwrap();

        // A later metadata write must not blank the status subresource.
        let mut again = workflow("42");
        again.record_annotation("bug-review-gist-url", "https://gist/1");
        store.upsert_workflow("proj-a", again).await.unwrap();

        let got = store.get_workflow("proj-a", "42").await.unwrap();
        assert_eq!(got.status_or_default().phase, WorkflowPhase::Ready);
        assert_eq!(got.annotation("bug-review-gist-url"), Some("https://gist/1"));
    }

    #[tokio::test]
    async fn single_conflict_is_absorbed_by_retry() {
        let store = MemoryResourceStore::new();
        store.upsert_workflow("proj-a", workflow("42")).await.unwrap();

        store.inject_conflicts(1);
        let updated = store
            .update_workflow_with("proj-a", "42", &|w| {
                w.record_annotation("github-pr-number", "7");
            })
            .await
            .unwrap();
        assert_eq!(updated.annotation("github-pr-number"), Some("7"));
    }

    #[tokio::test]
    async fn double_conflict_surfaces() {
        let store = MemoryResourceStore::new();
        store.upsert_workflow("proj-a", workflow("42")).await.unwrap();

        store.inject_conflicts(2);
        let err = store
            .update_workflow_with("proj-a", "42", &|w| {
                w.record_annotation("github-pr-number", "7");
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn create_session_twice_conflicts() {
        let store = MemoryResourceStore::new();
        let s = session("42-bug-review-1", "42", SessionType::BugReview);
        store.create_session("proj-a", s.clone()).await.unwrap();
        let err = store.create_session("proj-a", s).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn label_selector_is_the_join() {
        let store = MemoryResourceStore::new();
        store
            .create_session("proj-a", session("42-bug-review-1", "42", SessionType::BugReview))
            .await
            .unwrap();
        store
            .create_session("proj-a", session("42-bug-implement-fix-2", "42", SessionType::BugImplementFix))
            .await
            .unwrap();
        store
            .create_session("proj-a", session("9-bug-review-3", "9", SessionType::BugReview))
            .await
            .unwrap();

        let sel = types::workflow_session_selector("proj-a", "42");
        let sessions = store.list_sessions_by_label("proj-a", &sel).await.unwrap();
        assert_eq!(sessions.len(), 2);

        let typed = store
            .list_sessions_by_label("proj-a", "bugfix-workflow=42,bugfix-session-type=bug-review")
            .await
            .unwrap();
        assert_eq!(typed.len(), 1);
    }

    #[tokio::test]
    async fn bad_selector_is_invalid() {
        let store = MemoryResourceStore::new();
        let err = store.list_sessions_by_label("proj-a", "not-a-pair").await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[tokio::test]
    async fn delete_session_then_missing() {
        let store = MemoryResourceStore::new();
        store
            .create_session("proj-a", session("42-bug-review-1", "42", SessionType::BugReview))
            .await
            .unwrap();
        store.delete_session("proj-a", "42-bug-review-1").await.unwrap();
        assert!(store.get_session("proj-a", "42-bug-review-1").await.is_err());
    }
}
