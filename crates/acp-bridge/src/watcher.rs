//! Pull-transport ingestion: a long-lived, label-filtered watch on the
//! session resource, one task per project, feeding the same router function
//! the webhook uses.

use std::sync::Arc;
use std::time::Duration;

use futures_util::TryStreamExt;
use kube::runtime::{watcher, WatchStreamExt};
use kube::Api;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use acp_core::session::AgenticSession;
use acp_core::types::{LABEL_PROJECT, LABEL_WORKFLOW};
use acp_engine::completion::{CompletionRouter, SessionEvent, WatchEventType};

use crate::state::ApiState;

/// Spawn one watch task per project. Labels partition the event stream, so
/// the tasks never see each other's sessions.
pub fn spawn_session_watchers(
    client: kube::Client,
    projects: &[String],
    state: Arc<ApiState>,
) -> Vec<JoinHandle<()>> {
    projects
        .iter()
        .map(|project| {
            let client = client.clone();
            let project = project.clone();
            let state = state.clone();
            tokio::spawn(async move {
                watch_project_sessions(client, &project, &state.completion).await;
            })
        })
        .collect()
}

async fn watch_project_sessions(client: kube::Client, project: &str, router: &CompletionRouter) {
    let api: Api<AgenticSession> = Api::namespaced(client, project);
    let selector = format!("{LABEL_PROJECT}={project},{LABEL_WORKFLOW}");
    info!(project, selector = %selector, "session watch starting");

    loop {
        let stream = watcher(api.clone(), watcher::Config::default().labels(&selector))
            .applied_objects();
        futures_util::pin_mut!(stream);

        loop {
            match stream.try_next().await {
                Ok(Some(session)) => {
                    // The watch has no distinct MODIFIED signal once it is
                    // running; every apply of a completed session routes
                    // through the idempotent completion handler.
                    let event = SessionEvent {
                        event_type: WatchEventType::Modified,
                        object: session,
                    };
                    if let Err(e) = router.handle_event(&event).await {
                        warn!(project, error = %e, "completion handling failed");
                    }
                }
                Ok(None) => {
                    warn!(project, "session watch stream ended, restarting");
                    break;
                }
                Err(e) => {
                    warn!(project, error = %e, "session watch error, restarting");
                    break;
                }
            }
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}
