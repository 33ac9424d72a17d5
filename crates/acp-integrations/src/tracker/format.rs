//! Deterministic rendering of a workflow into tracker-side artifacts.
//!
//! The description is rebuilt from scratch on every sync so the tracker
//! ticket always reflects the workflow's current state; sections appear
//! exactly when their underlying data does.

use acp_core::types::{
    ANN_BUG_REVIEW_GIST_URL, ANN_GITHUB_PR_STATE, ANN_GITHUB_PR_URL, ANN_IMPLEMENTATION_GIST_URL,
};
use acp_core::workflow::BugFixWorkflow;

/// Deterministic attachment filename for the bug-review artifact.
pub fn review_attachment_filename(issue_number: u64) -> String {
    format!("bug-review-issue-{issue_number}.md")
}

/// Deterministic attachment filename for the implementation artifact.
pub fn implementation_attachment_filename(issue_number: u64) -> String {
    format!("implementation-issue-{issue_number}.md")
}

/// Summary line for the tracker ticket.
pub fn issue_summary(workflow: &BugFixWorkflow) -> String {
    format!("Bug fix: {} (#{})", workflow.spec.title, workflow.spec.issue_number)
}

/// Render the full ticket description in tracker wiki markup.
pub fn build_description(workflow: &BugFixWorkflow) -> String {
    let spec = &workflow.spec;
    let status = workflow.status_or_default();
    let mut out = String::new();

    out.push_str("h2. Source Issue\n");
    out.push_str(&format!("[Issue #{}|{}]\n\n", spec.issue_number, spec.issue_url));

    if let Some(description) = spec.description.as_deref().filter(|d| !d.is_empty()) {
        out.push_str("h2. Description\n");
        out.push_str(description);
        out.push_str("\n\n");
    }

    out.push_str("h2. Repository\n");
    out.push_str(&format!("* Repository: {}\n", spec.implementation_repo.url));
    if let Some(base) = spec.implementation_repo.branch.as_deref() {
        out.push_str(&format!("* Base branch: {base}\n"));
    }
    out.push_str(&format!("* Feature branch: {}\n\n", spec.branch_name));

    out.push_str("h2. Workflow Status\n");
    out.push_str(&format!("* Created: {}\n", spec.created_at.to_rfc3339()));
    out.push_str(&format!("* Phase: {}\n", status.phase));
    out.push_str(&format!("* Assessment: {}\n", status.assessment_status));
    out.push_str(&format!(
        "* Implementation: {}\n\n",
        if status.implementation_completed { "complete" } else { "pending" }
    ));

    let review_gist = workflow.annotation(ANN_BUG_REVIEW_GIST_URL);
    let impl_gist = workflow.annotation(ANN_IMPLEMENTATION_GIST_URL);
    if review_gist.is_some() || impl_gist.is_some() {
        out.push_str("h2. Analysis Documents\n");
        if let Some(url) = review_gist {
            out.push_str(&format!("* [Bug review & assessment|{url}]\n"));
        }
        if let Some(url) = impl_gist {
            out.push_str(&format!("* [Implementation summary|{url}]\n"));
        }
        out.push('\n');
    }

    if let Some(pr_url) = workflow.annotation(ANN_GITHUB_PR_URL) {
        out.push_str("h2. Pull Request\n");
        match workflow.annotation(ANN_GITHUB_PR_STATE) {
            Some(state) => out.push_str(&format!("[{pr_url}|{pr_url}] ({state})\n\n")),
            None => out.push_str(&format!("[{pr_url}|{pr_url}]\n\n")),
        }
    }

    out.push_str("----\n");
    out.push_str(&format!(
        "Synced from [the origin issue|{}] by the agentic control plane.\n",
        spec.issue_url
    ));

    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
