use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::{AssessmentStatus, WorkflowPhase};

// ---------------------------------------------------------------------------
// BugFixWorkflow custom resource
// ---------------------------------------------------------------------------

/// The repository a workflow's fix is implemented in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImplementationRepo {
    pub url: String,
    /// Base branch the feature branch forks from. `None` means the repo default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// Desired state of a bug-fix workflow. Immutable after creation except
/// through the annotation journal on metadata.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ambient.dev",
    version = "v1alpha1",
    kind = "BugFixWorkflow",
    plural = "bugfixworkflows",
    namespaced,
    status = "BugFixWorkflowStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BugFixWorkflowSpec {
    /// Workflow id; equals the origin issue number rendered as a string.
    pub id: String,
    pub issue_number: u64,
    pub issue_url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Feature branch name, fixed after creation.
    pub branch_name: String,
    pub implementation_repo: ImplementationRepo,
    pub project: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Observed state of a bug-fix workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BugFixWorkflowStatus {
    #[serde(default)]
    pub phase: WorkflowPhase,
    #[serde(default)]
    pub assessment_status: AssessmentStatus,
    /// Latched true once the implementation session succeeds. Never un-latched.
    #[serde(default)]
    pub implementation_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl BugFixWorkflow {
    /// Read one annotation journal entry. Missing and empty are both `None`.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Record an annotation. Empty values are dropped so a set key can never
    /// be blanked out again. Returns `true` when the map changed.
    pub fn record_annotation(&mut self, key: &str, value: &str) -> bool {
        if value.is_empty() {
            return false;
        }
        let annotations = self.metadata.annotations.get_or_insert_with(Default::default);
        let changed = annotations.get(key).map(String::as_str) != Some(value);
        if changed {
            annotations.insert(key.to_string(), value.to_string());
        }
        changed
    }

    /// Record an annotation only when the key is currently unset or empty.
    /// Returns `true` when the value was written.
    pub fn record_annotation_if_absent(&mut self, key: &str, value: &str) -> bool {
        if self.annotation(key).is_some() {
            return false;
        }
        self.record_annotation(key, value)
    }

    /// The status block, defaulting when the second write of workflow
    /// creation has not landed yet.
    pub fn status_or_default(&self) -> BugFixWorkflowStatus {
        self.status.clone().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
