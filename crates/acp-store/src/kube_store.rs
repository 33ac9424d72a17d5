use async_trait::async_trait;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use tracing::debug;

use acp_core::project_settings::ProjectSettings;
use acp_core::session::{AgenticSession, AgenticSessionStatus};
use acp_core::workflow::{BugFixWorkflow, BugFixWorkflowStatus};

use crate::error::StoreError;
use crate::traits::{ResourceStore, Result, WorkflowMutator};

/// Resource store backed by the cluster API. One instance per authority:
/// the user-scoped handle is built from the request's forwarded token, the
/// service-account handle from the pod's own credentials. Never promote one
/// to the other.
#[derive(Clone)]
pub struct KubeResourceStore {
    client: Client,
}

impl KubeResourceStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn workflows(&self, project: &str) -> Api<BugFixWorkflow> {
        Api::namespaced(self.client.clone(), project)
    }

    fn sessions(&self, project: &str) -> Api<AgenticSession> {
        Api::namespaced(self.client.clone(), project)
    }

    fn settings(&self, project: &str) -> Api<ProjectSettings> {
        Api::namespaced(self.client.clone(), project)
    }
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn get_workflow(&self, project: &str, id: &str) -> Result<BugFixWorkflow> {
        self.workflows(project)
            .get_opt(id)
            .await
            .map_err(StoreError::from_kube)?
            .ok_or_else(|| StoreError::NotFound(format!("workflow {project}/{id}")))
    }

    async fn upsert_workflow(&self, project: &str, mut workflow: BugFixWorkflow) -> Result<BugFixWorkflow> {
        let api = self.workflows(project);
        let name = workflow.name_any();
        let pp = PostParams::default();

        match api.get_opt(&name).await.map_err(StoreError::from_kube)? {
            None => api.create(&pp, &workflow).await.map_err(StoreError::from_kube),
            Some(existing) => {
                workflow.metadata.resource_version = existing.resource_version();
                match api.replace(&name, &pp, &workflow).await {
                    Ok(w) => Ok(w),
                    Err(kube::Error::Api(ae)) if ae.code == 409 => {
                        // One refetch-and-retry before surfacing the conflict.
                        debug!(workflow = %name, "upsert conflict, retrying once");
                        let latest = api.get(&name).await.map_err(StoreError::from_kube)?;
                        workflow.metadata.resource_version = latest.resource_version();
                        api.replace(&name, &pp, &workflow).await.map_err(StoreError::from_kube)
                    }
                    Err(e) => Err(StoreError::from_kube(e)),
                }
            }
        }
    }

    async fn update_workflow_with(
        &self,
        project: &str,
        id: &str,
        mutate: WorkflowMutator<'_>,
    ) -> Result<BugFixWorkflow> {
        let api = self.workflows(project);
        let pp = PostParams::default();

        let mut workflow = self.get_workflow(project, id).await?;
        mutate(&mut workflow);
        match api.replace(id, &pp, &workflow).await {
            Ok(w) => Ok(w),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                let mut latest = api.get(id).await.map_err(StoreError::from_kube)?;
                mutate(&mut latest);
                api.replace(id, &pp, &latest).await.map_err(StoreError::from_kube)
            }
            Err(e) => Err(StoreError::from_kube(e)),
        }
    }

    async fn update_workflow_status(
        &self,
        project: &str,
        id: &str,
        status: BugFixWorkflowStatus,
    ) -> Result<()> {
        let patch = serde_json::json!({ "status": status });
        self.workflows(project)
            .patch_status(id, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(StoreError::from_kube)
    }

    async fn list_workflows(&self, project: &str) -> Result<Vec<BugFixWorkflow>> {
        self.workflows(project)
            .list(&ListParams::default())
            .await
            .map(|l| l.items)
            .map_err(StoreError::from_kube)
    }

    async fn delete_workflow(&self, project: &str, id: &str) -> Result<()> {
        self.workflows(project)
            .delete(id, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(StoreError::from_kube)
    }

    async fn get_session(&self, project: &str, name: &str) -> Result<AgenticSession> {
        self.sessions(project)
            .get_opt(name)
            .await
            .map_err(StoreError::from_kube)?
            .ok_or_else(|| StoreError::NotFound(format!("session {project}/{name}")))
    }

    async fn create_session(&self, project: &str, session: AgenticSession) -> Result<AgenticSession> {
        self.sessions(project)
            .create(&PostParams::default(), &session)
            .await
            .map_err(StoreError::from_kube)
    }

    async fn update_session_status(
        &self,
        project: &str,
        name: &str,
        status: AgenticSessionStatus,
    ) -> Result<()> {
        let patch = serde_json::json!({ "status": status });
        self.sessions(project)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(StoreError::from_kube)
    }

    async fn list_sessions_by_label(&self, project: &str, selector: &str) -> Result<Vec<AgenticSession>> {
        self.sessions(project)
            .list(&ListParams::default().labels(selector))
            .await
            .map(|l| l.items)
            .map_err(StoreError::from_kube)
    }

    async fn delete_session(&self, project: &str, name: &str) -> Result<()> {
        self.sessions(project)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(StoreError::from_kube)
    }

    async fn get_project_settings(&self, project: &str) -> Result<Option<ProjectSettings>> {
        let list = self
            .settings(project)
            .list(&ListParams::default())
            .await
            .map_err(StoreError::from_kube)?;
        Ok(list.items.into_iter().next())
    }
}
