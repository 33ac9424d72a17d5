use crate::types::{Issue, IssueComment, RepoCoords};

use super::{GitHubClient, Result};

/// Get a single issue by number.
pub async fn get_issue(client: &GitHubClient, repo: &RepoCoords, number: u64) -> Result<Issue> {
    let issue = client
        .octocrab
        .issues(&repo.owner, &repo.repo)
        .get(number)
        .await?;

    Ok(octocrab_issue_to_issue(issue))
}

/// Create a new issue.
pub async fn create_issue(
    client: &GitHubClient,
    repo: &RepoCoords,
    title: &str,
    body: &str,
) -> Result<Issue> {
    let issue = client
        .octocrab
        .issues(&repo.owner, &repo.repo)
        .create(title)
        .body(body)
        .send()
        .await?;

    Ok(octocrab_issue_to_issue(issue))
}

/// List all comments on an issue.
pub async fn list_comments(
    client: &GitHubClient,
    repo: &RepoCoords,
    issue_number: u64,
) -> Result<Vec<IssueComment>> {
    let page = client
        .octocrab
        .issues(&repo.owner, &repo.repo)
        .list_comments(issue_number)
        .per_page(100)
        .send()
        .await?;

    let comments = page
        .items
        .into_iter()
        .map(octocrab_comment_to_comment)
        .collect();

    Ok(comments)
}

/// Post a comment on an issue.
pub async fn add_comment(
    client: &GitHubClient,
    repo: &RepoCoords,
    issue_number: u64,
    body: &str,
) -> Result<IssueComment> {
    let comment = client
        .octocrab
        .issues(&repo.owner, &repo.repo)
        .create_comment(issue_number, body)
        .await?;

    Ok(octocrab_comment_to_comment(comment))
}

/// List the names of the labels currently on an issue.
pub async fn list_issue_labels(
    client: &GitHubClient,
    repo: &RepoCoords,
    issue_number: u64,
) -> Result<Vec<String>> {
    let page = client
        .octocrab
        .issues(&repo.owner, &repo.repo)
        .list_labels_for_issue(issue_number)
        .per_page(100)
        .send()
        .await?;

    Ok(page.items.into_iter().map(|l| l.name).collect())
}

/// Add a label to an issue, reading first so the write is conditional on
/// absence.
pub async fn add_issue_label(
    client: &GitHubClient,
    repo: &RepoCoords,
    issue_number: u64,
    label: &str,
) -> Result<()> {
    let current = list_issue_labels(client, repo, issue_number).await?;
    if current.iter().any(|l| l.eq_ignore_ascii_case(label)) {
        return Ok(());
    }

    client
        .octocrab
        .issues(&repo.owner, &repo.repo)
        .add_labels(issue_number, &[label.to_string()])
        .await?;

    Ok(())
}

// ---- internal helpers -------------------------------------------------------

fn octocrab_issue_to_issue(issue: octocrab::models::issues::Issue) -> Issue {
    Issue {
        number: issue.number,
        title: issue.title,
        body: issue.body,
        labels: issue.labels.into_iter().map(|l| l.name).collect(),
        html_url: issue.html_url.to_string(),
        author: issue.user.login,
    }
}

fn octocrab_comment_to_comment(comment: octocrab::models::issues::Comment) -> IssueComment {
    IssueComment {
        id: comment.id.to_string(),
        body: comment.body.unwrap_or_default(),
        author_login: comment.user.login.clone(),
        author_type: comment.user.r#type.clone(),
        html_url: comment.html_url.to_string(),
        created_at: comment.created_at,
    }
}
