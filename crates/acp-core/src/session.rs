use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::{SessionPhase, SessionType};

// ---------------------------------------------------------------------------
// Repository mapping
// ---------------------------------------------------------------------------

/// One side of a session repository mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RepoRef {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// A repository the runner clones, works in, and pushes from. The `name` is
/// both the workspace subdirectory and the push target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionRepo {
    pub name: String,
    pub input: RepoRef,
    pub output: RepoRef,
}

// ---------------------------------------------------------------------------
// LLM + infrastructure knobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LlmSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            temperature: 0.7,
            max_tokens: 4000,
        }
    }
}

/// Infrastructure-only overrides. LLM parameters never flow through here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class: Option<String>,
}

/// Owner identity the runner uses to mint source-control credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub user_id: String,
}

// ---------------------------------------------------------------------------
// AgenticSession custom resource
// ---------------------------------------------------------------------------

/// Desired state of one LLM execution attached to a workflow.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ambient.dev",
    version = "v1alpha1",
    kind = "AgenticSession",
    plural = "agenticsessions",
    namespaced,
    status = "AgenticSessionStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct AgenticSessionSpec {
    pub session_type: SessionType,
    pub prompt: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub repos: Vec<SessionRepo>,
    #[serde(default = "default_auto_push")]
    pub auto_push_on_complete: bool,
    #[serde(default)]
    pub llm_settings: LlmSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_overrides: Option<ResourceOverrides>,
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,
    pub user_context: UserContext,
    pub project: String,
}

fn default_auto_push() -> bool {
    true
}

/// Observed state of a session, written by the runner.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgenticSessionStatus {
    #[serde(default)]
    pub phase: SessionPhase,
    /// Populated at terminal `Completed`; may be tens of KB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Deterministic session name: `<workflowID>-<sessionType>-<unixSeconds>`.
pub fn session_name(workflow_id: &str, session_type: SessionType, unix_seconds: i64) -> String {
    format!("{workflow_id}-{}-{unix_seconds}", session_type.as_str())
}

impl AgenticSession {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(key))
            .map(String::as_str)
    }

    pub fn phase(&self) -> SessionPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    pub fn result_text(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.result.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
