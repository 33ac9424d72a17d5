use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use acp_core::project_settings::DEFAULT_RUNNER_SECRETS_NAME;
use acp_core::types::{ANN_BUG_REVIEW_GIST_URL, ANN_IMPLEMENTATION_GIST_URL};
use acp_core::workflow::BugFixWorkflow;
use acp_integrations::github::ScmFactory;
use acp_integrations::scm::SourceControl;
use acp_integrations::tracker::format::{
    build_description, implementation_attachment_filename, issue_summary,
    review_attachment_filename,
};
use acp_integrations::tracker::{Tracker, TrackerConfig, TrackerError, TrackerFactory};
use acp_integrations::types::{gist_id_from_url, IssueRef};
use acp_store::{CredentialBroker, ResourceStore};

use crate::error::EngineError;
use crate::events::{ControlPlaneEvent, EventBus, EventKind};

/// Key inside the runner secret holding the control plane's own SCM token,
/// used for the backlink comment and gist reads.
const BOT_TOKEN_KEY: &str = "GITHUB_TOKEN";

/// Result of one sync run.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub tracker_key: String,
    pub tracker_url: String,
    /// True when this run took the create-path.
    pub created: bool,
    pub synced_at: DateTime<Utc>,
}

/// Create-or-update state machine against the external issue tracker.
///
/// Sync is user-initiated, but the workflow write at the end uses the
/// service-account store handle so user RBAC on status subresources cannot
/// block it.
pub struct TrackerSyncEngine {
    store: Arc<dyn ResourceStore>,
    broker: Arc<dyn CredentialBroker>,
    trackers: Arc<dyn TrackerFactory>,
    scm: Arc<dyn ScmFactory>,
    bus: EventBus,
}

impl TrackerSyncEngine {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        broker: Arc<dyn CredentialBroker>,
        trackers: Arc<dyn TrackerFactory>,
        scm: Arc<dyn ScmFactory>,
        bus: EventBus,
    ) -> Self {
        Self { store, broker, trackers, scm, bus }
    }

    pub async fn sync_workflow(&self, project: &str, workflow_id: &str) -> Result<SyncOutcome, EngineError> {
        let workflow = self.store.get_workflow(project, workflow_id).await?;
        let tracker = self.tracker_for(project).await?;

        self.bus
            .publish(ControlPlaneEvent::new(EventKind::SyncStarted, project, workflow_id));

        let outcome = match self.run_state_machine(project, &workflow, &*tracker).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.bus.publish(
                    ControlPlaneEvent::new(EventKind::SyncFailed, project, workflow_id)
                        .with_detail(e.to_string()),
                );
                return Err(e);
            }
        };

        // Persist under the service account.
        let current = self.store.get_workflow(project, workflow_id).await?;
        let mut status = current.status_or_default();
        status.tracker_key = Some(outcome.tracker_key.clone());
        status.tracker_url = Some(outcome.tracker_url.clone());
        status.last_synced_at = Some(outcome.synced_at);
        self.store.update_workflow_status(project, workflow_id, status).await?;

        self.bus.publish(
            ControlPlaneEvent::new(EventKind::SyncCompleted, project, workflow_id)
                .with_detail(outcome.tracker_key.clone()),
        );
        info!(project, workflow = workflow_id, key = %outcome.tracker_key, created = outcome.created, "tracker sync finished");
        Ok(outcome)
    }

    // ---- state machine ----------------------------------------------------

    async fn run_state_machine(
        &self,
        project: &str,
        workflow: &BugFixWorkflow,
        tracker: &dyn Tracker,
    ) -> Result<SyncOutcome, EngineError> {
        let description = build_description(workflow);

        if let Some(key) = workflow.status_or_default().tracker_key {
            match tracker.update_description(&key, &description).await {
                Ok(()) => {
                    // Re-attach gists to catch anything published since the
                    // last sync.
                    self.attach_gists(tracker, &key, workflow).await;
                    return Ok(SyncOutcome {
                        tracker_url: tracker.browse_url(&key),
                        tracker_key: key,
                        created: false,
                        synced_at: Utc::now(),
                    });
                }
                // The remote ticket is gone; fall through to the create-path.
                Err(TrackerError::NotFound(_)) => {
                    warn!(key = %key, "tracker ticket vanished, recreating");
                }
                Err(e) => return Err(map_tracker_error(e)),
            }
        }

        let key = tracker
            .create_issue(&issue_summary(workflow), &description)
            .await
            .map_err(map_tracker_error)?;
        let url = tracker.browse_url(&key);

        if let Err(e) = tracker
            .add_remote_link(&key, &workflow.spec.issue_url, &workflow.spec.title)
            .await
        {
            warn!(key = %key, error = %e, "remote link registration failed");
        }

        self.attach_gists(tracker, &key, workflow).await;

        self.post_backlink_comment(project, workflow, &key, &url).await;

        Ok(SyncOutcome { tracker_key: key, tracker_url: url, created: true, synced_at: Utc::now() })
    }

    /// Upload each recorded gist as an attachment, keyed by deterministic
    /// filename; files already present are skipped. Each upload is
    /// independent; partial failure proceeds.
    async fn attach_gists(&self, tracker: &dyn Tracker, key: &str, workflow: &BugFixWorkflow) {
        let issue_number = workflow.spec.issue_number;
        let wanted = [
            (workflow.annotation(ANN_BUG_REVIEW_GIST_URL), review_attachment_filename(issue_number)),
            (
                workflow.annotation(ANN_IMPLEMENTATION_GIST_URL),
                implementation_attachment_filename(issue_number),
            ),
        ];
        if wanted.iter().all(|(url, _)| url.is_none()) {
            return;
        }

        let existing = match tracker.list_attachment_filenames(key).await {
            Ok(names) => names,
            Err(e) => {
                warn!(key, error = %e, "attachment listing failed, skipping uploads");
                return;
            }
        };

        let scm = self.bot_scm(workflow).await;
        for (gist_url, filename) in wanted {
            let Some(gist_url) = gist_url else { continue };
            if existing.iter().any(|n| n == &filename) {
                continue;
            }
            let Some(gist_id) = gist_id_from_url(gist_url) else { continue };
            let content = match scm.gist_content(gist_id).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(gist = gist_url, error = %e, "gist fetch failed, skipping attachment");
                    continue;
                }
            };
            if let Err(e) = tracker.attach_file(key, &filename, &content).await {
                warn!(key, filename = %filename, error = %e, "attachment upload failed");
            }
        }
    }

    /// Best-effort comment on the origin issue pointing back at the ticket.
    async fn post_backlink_comment(&self, project: &str, workflow: &BugFixWorkflow, key: &str, url: &str) {
        let Some(issue_ref) = IssueRef::parse(&workflow.spec.issue_url) else { return };
        let scm = self.bot_scm(workflow).await;
        let body = format!("This bug is now tracked as [{key}]({url}).");
        if let Err(e) = scm.add_comment(&issue_ref.repo, issue_ref.number, &body).await {
            warn!(project, key, error = %e, "backlink comment failed");
        }
    }

    // ---- wiring -----------------------------------------------------------

    async fn tracker_for(&self, project: &str) -> Result<Arc<dyn Tracker>, EngineError> {
        let secret_name = match self.store.get_project_settings(project).await {
            Ok(Some(settings)) => settings.runner_secrets_name().to_string(),
            _ => DEFAULT_RUNNER_SECRETS_NAME.to_string(),
        };
        let secrets = self
            .broker
            .runner_secrets(project, &secret_name)
            .await
            .map_err(|e| EngineError::Invalid(format!(
                "runner secret unavailable ({e}); required keys: TRACKER_URL, TRACKER_PROJECT, TRACKER_API_TOKEN"
            )))?;
        let config = TrackerConfig::from_secret(&secrets).map_err(|e| EngineError::Invalid(e.to_string()))?;
        Ok(self.trackers.tracker_for(config))
    }

    async fn bot_scm(&self, workflow: &BugFixWorkflow) -> Arc<dyn SourceControl> {
        let project = &workflow.spec.project;
        let secret_name = match self.store.get_project_settings(project).await {
            Ok(Some(settings)) => settings.runner_secrets_name().to_string(),
            _ => DEFAULT_RUNNER_SECRETS_NAME.to_string(),
        };
        let token = self
            .broker
            .runner_secrets(project, &secret_name)
            .await
            .ok()
            .and_then(|map| map.get(BOT_TOKEN_KEY).cloned());
        self.scm
            .client_for(token.as_deref())
            .unwrap_or_else(|_| self.scm.client_for(None).expect("anonymous SCM client"))
    }
}

fn map_tracker_error(err: TrackerError) -> EngineError {
    match err {
        TrackerError::Auth => EngineError::Unauthorized,
        TrackerError::Config { .. } => EngineError::Invalid(err.to_string()),
        other => EngineError::ServiceUnavailable(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use acp_core::types::WorkflowPhase;
    use acp_core::workflow::{BugFixWorkflowSpec, BugFixWorkflowStatus, ImplementationRepo};
    use acp_integrations::scm::{StubScmFactory, StubSourceControl};
    use acp_integrations::tracker::{StubTracker, StubTrackerFactory};
    use acp_store::{MemoryCredentialBroker, MemoryResourceStore};
    use std::collections::BTreeMap;

    struct Fixture {
        engine: TrackerSyncEngine,
        tracker: Arc<StubTracker>,
        scm: Arc<StubSourceControl>,
        store: Arc<MemoryResourceStore>,
        broker: Arc<MemoryCredentialBroker>,
        bus: EventBus,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryResourceStore::new());
        let broker = Arc::new(MemoryCredentialBroker::new());
        broker.set_runner_secrets(
            "proj-a",
            DEFAULT_RUNNER_SECRETS_NAME,
            BTreeMap::from([
                ("TRACKER_URL".to_string(), "https://tracker.example.com".to_string()),
                ("TRACKER_PROJECT".to_string(), "PROJ".to_string()),
                ("TRACKER_API_TOKEN".to_string(), "secret".to_string()),
                ("GITHUB_TOKEN".to_string(), "ghp_bot".to_string()),
            ]),
        );
        let tracker = Arc::new(StubTracker::new("PROJ"));
        let scm = Arc::new(StubSourceControl::new());
        let bus = EventBus::new();
        let engine = TrackerSyncEngine::new(
            store.clone(),
            broker.clone(),
            Arc::new(StubTrackerFactory(tracker.clone())),
            Arc::new(StubScmFactory(scm.clone())),
            bus.clone(),
        );
        Fixture { engine, tracker, scm, store, broker, bus }
    }

    async fn seed_workflow(store: &MemoryResourceStore) {
        let workflow = BugFixWorkflow::new(
            "42",
            BugFixWorkflowSpec {
                id: "42".into(),
                issue_number: 42,
                issue_url: "https://github.com/acme/svc/issues/42".into(),
                title: "Login fails".into(),
                description: Some("cookie not set".into()),
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
        store.upsert_workflow("proj-a", workflow).await.unwrap();
        store
            .update_workflow_status(
                "proj-a",
                "42",
                BugFixWorkflowStatus { phase: WorkflowPhase::Ready, ..Default::default() },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_path_persists_key_url_and_backlink() {
        let f = fixture();
        seed_workflow(&f.store).await;
        let rx = f.bus.subscribe();

        let outcome = f.engine.sync_workflow("proj-a", "42").await.unwrap();
        assert_eq!(outcome.tracker_key, "PROJ-1");
        assert!(outcome.created);
        assert_eq!(outcome.tracker_url, "https://tracker.example.com/browse/PROJ-1");

        let w = f.store.get_workflow("proj-a", "42").await.unwrap();
        let status = w.status_or_default();
        assert_eq!(status.tracker_key.as_deref(), Some("PROJ-1"));
        assert_eq!(status.tracker_url.as_deref(), Some("https://tracker.example.com/browse/PROJ-1"));
        assert!(status.last_synced_at.is_some());

        // One remote link back to the origin issue, one backlink comment.
        assert_eq!(f.tracker.remote_links().len(), 1);
        let repo = acp_integrations::types::RepoCoords::new("acme", "svc");
        let comments = f.scm.comments_on(&repo, 42);
        assert_eq!(comments.len(), 1);
        assert!(comments[0].body.contains("PROJ-1"));

        let kinds: Vec<_> = rx.drain().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::SyncStarted, EventKind::SyncCompleted]);
    }

    #[tokio::test]
    async fn update_path_rewrites_description_without_new_issue() {
        let f = fixture();
        seed_workflow(&f.store).await;

        let first = f.engine.sync_workflow("proj-a", "42").await.unwrap();
        let second = f.engine.sync_workflow("proj-a", "42").await.unwrap();

        assert_eq!(second.tracker_key, first.tracker_key);
        assert!(!second.created);
        assert_eq!(f.tracker.issue_count(), 1);
        assert_eq!(f.tracker.remote_links().len(), 1);
    }

    #[tokio::test]
    async fn deleted_remote_ticket_falls_through_to_create() {
        let f = fixture();
        seed_workflow(&f.store).await;

        let first = f.engine.sync_workflow("proj-a", "42").await.unwrap();
        assert_eq!(first.tracker_key, "PROJ-1");

        f.tracker.drop_issues();
        let second = f.engine.sync_workflow("proj-a", "42").await.unwrap();
        assert_eq!(second.tracker_key, "PROJ-2");
        assert!(second.created);

        let w = f.store.get_workflow("proj-a", "42").await.unwrap();
        assert_eq!(w.status_or_default().tracker_key.as_deref(), Some("PROJ-2"));
        // The recreated ticket got its own remote link.
        assert_eq!(f.tracker.remote_links().len(), 2);
    }

    #[tokio::test]
    async fn missing_config_enumerates_required_keys() {
        let f = fixture();
        seed_workflow(&f.store).await;
        f.broker.set_runner_secrets(
            "proj-a",
            DEFAULT_RUNNER_SECRETS_NAME,
            BTreeMap::from([("TRACKER_URL".to_string(), "https://tracker.example.com".to_string())]),
        );

        let err = f.engine.sync_workflow("proj-a", "42").await.unwrap_err();
        match err {
            EngineError::Invalid(msg) => {
                assert!(msg.contains("TRACKER_PROJECT"));
                assert!(msg.contains("TRACKER_API_TOKEN"));
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn attachments_skip_already_uploaded_filenames() {
        let f = fixture();
        seed_workflow(&f.store).await;
        f.scm.put_gist("abc", "https://gist.github.com/acp/abc", "review body");
        f.store
            .update_workflow_with("proj-a", "42", &|w| {
                w.record_annotation(ANN_BUG_REVIEW_GIST_URL, "https://gist.github.com/acp/abc");
            })
            .await
            .unwrap();

        f.engine.sync_workflow("proj-a", "42").await.unwrap();
        f.engine.sync_workflow("proj-a", "42").await.unwrap();

        // N syncs, one attachment: the deterministic filename dedupes.
        assert_eq!(f.tracker.attachments_of("PROJ-1"), vec!["bug-review-issue-42.md".to_string()]);
    }

    #[tokio::test]
    async fn attachment_failure_does_not_fail_sync() {
        let f = fixture();
        seed_workflow(&f.store).await;
        f.scm.put_gist("abc", "https://gist.github.com/acp/abc", "review body");
        f.store
            .update_workflow_with("proj-a", "42", &|w| {
                w.record_annotation(ANN_BUG_REVIEW_GIST_URL, "https://gist.github.com/acp/abc");
            })
            .await
            .unwrap();
        f.tracker.fail_attachments(true);

        let outcome = f.engine.sync_workflow("proj-a", "42").await.unwrap();
        assert_eq!(outcome.tracker_key, "PROJ-1");
        assert!(f.tracker.attachments_of("PROJ-1").is_empty());
    }

    #[tokio::test]
    async fn missing_workflow_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.engine.sync_workflow("proj-a", "42").await.unwrap_err(),
            EngineError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn upstream_failure_is_503_and_publishes_sync_failed() {
        let f = fixture();
        seed_workflow(&f.store).await;
        f.tracker.fail_creates(true);
        let rx = f.bus.subscribe();

        let err = f.engine.sync_workflow("proj-a", "42").await.unwrap_err();
        assert!(matches!(err, EngineError::ServiceUnavailable(_)));

        let kinds: Vec<_> = rx.drain().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::SyncStarted, EventKind::SyncFailed]);

        // Nothing was persisted on the workflow.
        let w = f.store.get_workflow("proj-a", "42").await.unwrap();
        assert!(w.status_or_default().tracker_key.is_none());
    }
}
