use async_trait::async_trait;

use acp_core::project_settings::ProjectSettings;
use acp_core::session::{AgenticSession, AgenticSessionStatus};
use acp_core::workflow::{BugFixWorkflow, BugFixWorkflowStatus};

use crate::error::StoreError;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Mutator applied inside the store's read-modify-write cycle.
pub type WorkflowMutator<'a> = &'a (dyn Fn(&mut BugFixWorkflow) + Send + Sync);

/// Typed CRUD over the two custom resource kinds.
///
/// Status mutations go exclusively through the `update_*_status` methods,
/// which target the status subresource. Spec and metadata mutations go
/// through `upsert_workflow` / `update_workflow_with`, which perform
/// read-modify-write under optimistic concurrency and retry a conflicting
/// write exactly once before surfacing `Conflict`.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    // ---- workflows --------------------------------------------------------

    async fn get_workflow(&self, project: &str, id: &str) -> Result<BugFixWorkflow>;

    /// Create the workflow or replace its spec and metadata wholesale.
    async fn upsert_workflow(&self, project: &str, workflow: BugFixWorkflow) -> Result<BugFixWorkflow>;

    /// Re-read the workflow, apply `mutate`, and write it back. This is the
    /// canonical way to durably record annotation changes: annotations are
    /// metadata, not status.
    async fn update_workflow_with(
        &self,
        project: &str,
        id: &str,
        mutate: WorkflowMutator<'_>,
    ) -> Result<BugFixWorkflow>;

    async fn update_workflow_status(
        &self,
        project: &str,
        id: &str,
        status: BugFixWorkflowStatus,
    ) -> Result<()>;

    async fn list_workflows(&self, project: &str) -> Result<Vec<BugFixWorkflow>>;

    async fn delete_workflow(&self, project: &str, id: &str) -> Result<()>;

    // ---- sessions ---------------------------------------------------------

    async fn get_session(&self, project: &str, name: &str) -> Result<AgenticSession>;

    async fn create_session(&self, project: &str, session: AgenticSession) -> Result<AgenticSession>;

    async fn update_session_status(
        &self,
        project: &str,
        name: &str,
        status: AgenticSessionStatus,
    ) -> Result<()>;

    /// List sessions by label selector (`k=v,k2=v2`). This is the sole query
    /// path from a workflow to its sessions.
    async fn list_sessions_by_label(&self, project: &str, selector: &str) -> Result<Vec<AgenticSession>>;

    async fn delete_session(&self, project: &str, name: &str) -> Result<()>;

    // ---- project settings -------------------------------------------------

    /// The project's settings resource, if any exists.
    async fn get_project_settings(&self, project: &str) -> Result<Option<ProjectSettings>>;
}
