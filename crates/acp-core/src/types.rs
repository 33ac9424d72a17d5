use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SessionType
// ---------------------------------------------------------------------------

/// The closed set of LLM job types a workflow can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum SessionType {
    #[serde(rename = "bug-review")]
    BugReview,
    #[serde(rename = "bug-implement-fix")]
    BugImplementFix,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::BugReview => "bug-review",
            SessionType::BugImplementFix => "bug-implement-fix",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bug-review" => Some(SessionType::BugReview),
            "bug-implement-fix" => Some(SessionType::BugImplementFix),
            _ => None,
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SessionPhase
// ---------------------------------------------------------------------------

/// Observed phase of an agentic session. Monotonic toward a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub enum SessionPhase {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
    Error,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionPhase::Completed
                | SessionPhase::Failed
                | SessionPhase::Stopped
                | SessionPhase::Error
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Pending => "Pending",
            SessionPhase::Running => "Running",
            SessionPhase::Completed => "Completed",
            SessionPhase::Failed => "Failed",
            SessionPhase::Stopped => "Stopped",
            SessionPhase::Error => "Error",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// WorkflowPhase
// ---------------------------------------------------------------------------

/// Observed phase of a workflow. `Initializing` exists only transiently
/// between the spec upsert and the first status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub enum WorkflowPhase {
    #[default]
    Initializing,
    Ready,
    Completed,
    Failed,
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowPhase::Initializing => "Initializing",
            WorkflowPhase::Ready => "Ready",
            WorkflowPhase::Completed => "Completed",
            WorkflowPhase::Failed => "Failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// AssessmentStatus
// ---------------------------------------------------------------------------

/// Whether a successful review session has assessed the workflow yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentStatus {
    #[default]
    Unknown,
    Complete,
}

impl fmt::Display for AssessmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssessmentStatus::Unknown => f.write_str("unknown"),
            AssessmentStatus::Complete => f.write_str("complete"),
        }
    }
}

// ---------------------------------------------------------------------------
// Label schema
// ---------------------------------------------------------------------------

/// Label carrying the owning project (tenant) name.
pub const LABEL_PROJECT: &str = "project";
/// Label joining a session to its workflow. This is the only supported
/// query path from workflow to sessions.
pub const LABEL_WORKFLOW: &str = "bugfix-workflow";
/// Label carrying the session type.
pub const LABEL_SESSION_TYPE: &str = "bugfix-session-type";
/// Label carrying the origin issue number.
pub const LABEL_ISSUE_NUMBER: &str = "bugfix-issue-number";

/// The full label set stamped on every session created by the session service.
pub fn session_labels(
    project: &str,
    workflow_id: &str,
    session_type: SessionType,
    issue_number: u64,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_PROJECT.to_string(), project.to_string()),
        (LABEL_WORKFLOW.to_string(), workflow_id.to_string()),
        (LABEL_SESSION_TYPE.to_string(), session_type.as_str().to_string()),
        (LABEL_ISSUE_NUMBER.to_string(), issue_number.to_string()),
    ])
}

/// Label selector matching all sessions of one workflow in one project.
pub fn workflow_session_selector(project: &str, workflow_id: &str) -> String {
    format!("{LABEL_WORKFLOW}={workflow_id},{LABEL_PROJECT}={project}")
}

// ---------------------------------------------------------------------------
// Annotation journal keys
// ---------------------------------------------------------------------------
//
// Annotations are the durable, append-mostly journal of artifact references.
// Once a key holds a non-empty value it is never unset; it may only be
// overwritten with another non-empty value.

pub const ANN_BUG_REVIEW_GIST_URL: &str = "bug-review-gist-url";
pub const ANN_BUG_REVIEW_COMMENT_ID: &str = "bug-review-comment-id";
pub const ANN_BUG_REVIEW_COMMENT_URL: &str = "bug-review-comment-url";
pub const ANN_IMPLEMENTATION_GIST_URL: &str = "implementation-gist-url";
pub const ANN_IMPLEMENTATION_COMMENT_ID: &str = "implementation-comment-id";
pub const ANN_IMPLEMENTATION_COMMENT_URL: &str = "implementation-comment-url";
pub const ANN_GITHUB_PR_NUMBER: &str = "github-pr-number";
pub const ANN_GITHUB_PR_URL: &str = "github-pr-url";
pub const ANN_GITHUB_PR_STATE: &str = "github-pr-state";
pub const ANN_PR_CREATED_BY: &str = "pr-created-by";

/// Value of [`ANN_PR_CREATED_BY`] when the PR came from this control plane.
pub const PR_CREATED_BY_VTEAM: &str = "vteam";
/// Value of [`ANN_PR_CREATED_BY`] when the PR was opened externally.
pub const PR_CREATED_BY_EXTERNAL: &str = "external";

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_type_wire_names() {
        let json = serde_json::to_string(&SessionType::BugReview).unwrap();
        assert_eq!(json, "\"bug-review\"");
        let parsed: SessionType = serde_json::from_str("\"bug-implement-fix\"").unwrap();
        assert_eq!(parsed, SessionType::BugImplementFix);
    }

    #[test]
    fn session_type_parse_rejects_unknown() {
        assert_eq!(SessionType::parse("bug-review"), Some(SessionType::BugReview));
        assert_eq!(SessionType::parse("code-review"), None);
    }

    #[test]
    fn terminal_phases() {
        assert!(!SessionPhase::Pending.is_terminal());
        assert!(!SessionPhase::Running.is_terminal());
        assert!(SessionPhase::Completed.is_terminal());
        assert!(SessionPhase::Failed.is_terminal());
        assert!(SessionPhase::Stopped.is_terminal());
        assert!(SessionPhase::Error.is_terminal());
    }

    #[test]
    fn phase_wire_names_are_pascal_case() {
        assert_eq!(serde_json::to_string(&SessionPhase::Running).unwrap(), "\"Running\"");
        assert_eq!(serde_json::to_string(&WorkflowPhase::Ready).unwrap(), "\"Ready\"");
        assert_eq!(
            serde_json::to_string(&AssessmentStatus::Complete).unwrap(),
            "\"complete\""
        );
    }

    #[test]
    fn session_label_set() {
        let labels = session_labels("proj-a", "42", SessionType::BugReview, 42);
        assert_eq!(labels.get(LABEL_PROJECT).unwrap(), "proj-a");
        assert_eq!(labels.get(LABEL_WORKFLOW).unwrap(), "42");
        assert_eq!(labels.get(LABEL_SESSION_TYPE).unwrap(), "bug-review");
        assert_eq!(labels.get(LABEL_ISSUE_NUMBER).unwrap(), "42");
    }

    #[test]
    fn selector_shape() {
        assert_eq!(
            workflow_session_selector("p", "42"),
            "bugfix-workflow=42,project=p"
        );
    }
}
