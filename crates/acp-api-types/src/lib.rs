//! Wire types for the control-plane HTTP API.
//!
//! Pure data: request and response bodies plus their field-bound validation.
//! Everything here is serde round-trippable and carries no behavior beyond
//! input validation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Workflow creation
// ---------------------------------------------------------------------------

/// Structured bug description used when no origin issue exists yet. The
/// workflow service composes an issue body from this and files it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDescriptionInput {
    pub title: String,
    pub symptoms: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reproduction_steps: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_behavior: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_behavior: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
    /// Repository the composed issue is filed against. Falls back to the
    /// implementation repo when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_repository: Option<String>,
}

impl TextDescriptionInput {
    /// Enforce the documented field bounds. Returns the offending rule as a
    /// human-readable message.
    pub fn validate(&self) -> Result<(), String> {
        bounded("title", &self.title, 10, 200)?;
        bounded("symptoms", &self.symptoms, 20, 10_000)?;
        if let Some(v) = &self.reproduction_steps {
            bounded("reproductionSteps", v, 0, 10_000)?;
        }
        if let Some(v) = &self.expected_behavior {
            bounded("expectedBehavior", v, 0, 5_000)?;
        }
        if let Some(v) = &self.actual_behavior {
            bounded("actualBehavior", v, 0, 5_000)?;
        }
        if let Some(v) = &self.additional_context {
            bounded("additionalContext", v, 0, 10_000)?;
        }
        Ok(())
    }
}

fn bounded(field: &str, value: &str, min: usize, max: usize) -> Result<(), String> {
    let len = value.chars().count();
    if len < min {
        return Err(format!("{field} must be at least {min} characters (got {len})"));
    }
    if len > max {
        return Err(format!("{field} must be at most {max} characters (got {len})"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplementationRepoInput {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// `POST /api/projects/{p}/bugfix-workflows` body. Exactly one of
/// `issue_url` / `text_description` must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_description: Option<TextDescriptionInput>,
    pub implementation_repo: ImplementationRepoInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Workflow responses
// ---------------------------------------------------------------------------

/// Slim row for `GET .../bugfix-workflows`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: String,
    pub title: String,
    pub issue_url: String,
    pub phase: String,
    pub assessment_status: String,
    pub implementation_completed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowListResponse {
    pub workflows: Vec<WorkflowSummary>,
}

/// `DELETE` response; the advisory note spells out what was not removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteWorkflowResponse {
    pub deleted: String,
    pub note: String,
}

// ---------------------------------------------------------------------------
// Session creation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSettingsInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOverridesInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class: Option<String>,
}

/// `POST .../bugfix-workflows/{id}/sessions` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub session_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_variables: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_settings: Option<LlmSettingsInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_overrides: Option<ResourceOverridesInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_push_on_complete: Option<bool>,
    /// Optional agent persona list forwarded to the runner verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_personas: Option<String>,
}

/// 409 body when the preflight gate finds an open pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrConflictBody {
    pub error: String,
    pub pr_number: u64,
    pub pr_url: String,
    pub pr_state: String,
    pub pr_branch: String,
}

// ---------------------------------------------------------------------------
// Tracker sync
// ---------------------------------------------------------------------------

/// `POST .../sync-tracker` success body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTrackerResponse {
    pub tracker_key: String,
    pub tracker_url: String,
    /// True when this call took the create-path.
    pub created: bool,
    pub synced_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
