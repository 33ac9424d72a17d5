use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use acp_engine::completion::CompletionRouter;
use acp_engine::events::EventBus;
use acp_engine::session::SessionService;
use acp_engine::sync::TrackerSyncEngine;
use acp_engine::workflow::WorkflowService;
use acp_integrations::github::ScmFactory;
use acp_integrations::tracker::TrackerFactory;
use acp_store::{CredentialBroker, ResourceStore};

use crate::api_error::ApiError;

/// Header the tenancy middleware forwards the authenticated user in. A
/// request without it yields no user-scoped client and is unauthorized.
pub const USER_HEADER: &str = "x-forwarded-user";

/// Shared application state for all HTTP/WS handlers.
///
/// Two store authorities are wired in deliberately: the user-scoped handle
/// feeds the workflow and session services, the service-account handle
/// feeds the completion router and the sync engine's persistence. Neither
/// is ever promoted to the other.
pub struct ApiState {
    pub workflows: WorkflowService,
    pub sessions: SessionService,
    pub completion: CompletionRouter,
    pub sync: TrackerSyncEngine,
    pub bus: EventBus,
}

impl ApiState {
    pub fn new(
        user_store: Arc<dyn ResourceStore>,
        sa_store: Arc<dyn ResourceStore>,
        broker: Arc<dyn CredentialBroker>,
        scm: Arc<dyn ScmFactory>,
        trackers: Arc<dyn TrackerFactory>,
        bus: EventBus,
    ) -> Self {
        Self {
            workflows: WorkflowService::new(user_store.clone(), broker.clone(), scm.clone()),
            sessions: SessionService::new(user_store, broker.clone(), scm.clone(), bus.clone()),
            completion: CompletionRouter::new(sa_store.clone(), broker.clone(), scm.clone(), bus.clone()),
            sync: TrackerSyncEngine::new(sa_store, broker, trackers, scm, bus.clone()),
            bus,
        }
    }
}

/// The authenticated user forwarded by the tenancy middleware.
#[derive(Debug, Clone)]
pub struct UserIdentity(pub String);

impl<S> FromRequestParts<S> for UserIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(|s| UserIdentity(s.to_string()))
            .ok_or(ApiError::Unauthorized)
    }
}
