//! Deterministic prompt composition for the two session types.
//!
//! Base instruction templates carry the issue URL literally; prior
//! artifacts (Claude-authored issue comments, the review gist) are layered
//! on according to the session type's sourcing rules.

use acp_integrations::types::IssueComment;

const BUG_REVIEW_TEMPLATE: &str = "\
You are reviewing a reported bug. Read the issue at {issue_url} carefully, \
reproduce the failure if possible, and produce a structured assessment: \
root cause analysis, affected components, severity, and a concrete \
resolution plan. Do not implement the fix.";

const BUG_IMPLEMENT_TEMPLATE: &str = "\
You are implementing the fix for the bug reported at {issue_url}. Follow \
the resolution plan below, keep the change minimal and test-covered, and \
commit your work to the session's output branch.";

/// Separator between harvested issue comments.
const COMMENT_SEPARATOR: &str = "\n\n---\n\n";

/// Keep only comments authored by Claude-adjacent accounts: a login
/// containing `claude` (case-insensitive) or a `Bot` account type. Returns
/// the concatenated bodies, or `None` when nothing qualifies.
pub fn filter_claude_comments(comments: &[IssueComment]) -> Option<String> {
    let kept: Vec<&str> = comments
        .iter()
        .filter(|c| {
            c.author_login.to_lowercase().contains("claude") || c.author_type == "Bot"
        })
        .map(|c| c.body.as_str())
        .filter(|b| !b.is_empty())
        .collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept.join(COMMENT_SEPARATOR))
    }
}

/// Compose the bug-review prompt, layering in an existing assessment when
/// the origin issue already carries one.
pub fn compose_bug_review_prompt(issue_url: &str, existing_assessment: Option<&str>) -> String {
    let mut prompt = BUG_REVIEW_TEMPLATE.replace("{issue_url}", issue_url);
    if let Some(assessment) = existing_assessment.filter(|a| !a.is_empty()) {
        prompt.push_str("\n\nEXISTING CLAUDE ASSESSMENT:\n");
        prompt.push_str(assessment);
        prompt.push_str(
            "\n\nBuild on this existing analysis: verify it against the current \
             code, refine it where it falls short, and fill in anything it missed.",
        );
    }
    prompt
}

/// Compose the bug-implement-fix prompt. The resolution plan comes from the
/// review gist when available, else from the harvested comments; with no
/// plan at all, the runner is told to analyze first.
pub fn compose_implement_prompt(issue_url: &str, resolution_plan: Option<&str>) -> String {
    let mut prompt = BUG_IMPLEMENT_TEMPLATE.replace("{issue_url}", issue_url);
    match resolution_plan.filter(|p| !p.is_empty()) {
        Some(plan) => {
            prompt.push_str("\n\nRESOLUTION PLAN:\n");
            prompt.push_str(plan);
        }
        None => {
            prompt.push_str(
                "\n\nNo existing resolution plan was found. Analyze the issue \
                 first, write down your plan, then implement the fix.",
            );
        }
    }
    prompt
}

/// Append the user-supplied session description, when any.
pub fn append_user_description(prompt: String, description: Option<&str>) -> String {
    match description.filter(|d| !d.is_empty()) {
        Some(d) => format!("{prompt}\n\n{d}"),
        None => prompt,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn comment(login: &str, author_type: &str, body: &str) -> IssueComment {
        IssueComment {
            id: "1".into(),
            body: body.into(),
            author_login: login.into(),
            author_type: author_type.into(),
            html_url: "https://github.com/acme/svc/issues/42#issuecomment-1".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn filter_keeps_claude_logins_and_bots() {
        let comments = vec![
            comment("alice", "User", "human note"),
            comment("claude-code[bot]", "Bot", "assessment A"),
            comment("Claude", "User", "assessment B"),
            comment("ci-runner", "Bot", "bot chatter"),
        ];
        let joined = filter_claude_comments(&comments).unwrap();
        assert!(!joined.contains("human note"));
        assert_eq!(joined, "assessment A\n\n---\n\nassessment B\n\n---\n\nbot chatter");
    }

    #[test]
    fn filter_empty_when_nothing_qualifies() {
        let comments = vec![comment("alice", "User", "note")];
        assert!(filter_claude_comments(&comments).is_none());
        assert!(filter_claude_comments(&[]).is_none());
    }

    #[test]
    fn review_prompt_contains_issue_url_literally() {
        let p = compose_bug_review_prompt("https://github.com/acme/svc/issues/42", None);
        assert!(p.contains("https://github.com/acme/svc/issues/42"));
        assert!(!p.contains("EXISTING CLAUDE ASSESSMENT"));
    }

    #[test]
    fn review_prompt_layers_existing_assessment() {
        let p = compose_bug_review_prompt("https://x/issues/1", Some("prior analysis"));
        let marker = p.find("EXISTING CLAUDE ASSESSMENT:").unwrap();
        let body = p.find("prior analysis").unwrap();
        let tail = p.find("Build on this existing analysis").unwrap();
        assert!(marker < body && body < tail);
    }

    #[test]
    fn implement_prompt_plan_vs_no_plan() {
        let with_plan = compose_implement_prompt("https://x/issues/1", Some("step 1"));
        assert!(with_plan.contains("RESOLUTION PLAN:\nstep 1"));

        let without = compose_implement_prompt("https://x/issues/1", None);
        assert!(without.contains("No existing resolution plan was found"));
    }

    #[test]
    fn user_description_appends_with_blank_line() {
        let p = append_user_description("base".to_string(), Some("extra"));
        assert_eq!(p, "base\n\nextra");
        assert_eq!(append_user_description("base".to_string(), None), "base");
        assert_eq!(append_user_description("base".to_string(), Some("")), "base");
    }
}
