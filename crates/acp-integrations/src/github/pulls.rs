use crate::types::{PullRequest, RepoCoords};

use super::{GitHubClient, Result};

/// List the repository's open pull requests.
pub async fn list_open_pull_requests(
    client: &GitHubClient,
    repo: &RepoCoords,
) -> Result<Vec<PullRequest>> {
    let page = client
        .octocrab
        .pulls(&repo.owner, &repo.repo)
        .list()
        .state(octocrab::params::State::Open)
        .per_page(100)
        .send()
        .await?;

    let prs = page.items.into_iter().map(octocrab_pr_to_pr).collect();

    Ok(prs)
}

// ---- internal helpers -------------------------------------------------------

fn octocrab_pr_to_pr(pr: octocrab::models::pulls::PullRequest) -> PullRequest {
    let state = match pr.state {
        Some(octocrab::models::IssueState::Closed) => "closed",
        _ => "open",
    };

    PullRequest {
        number: pr.number,
        title: pr.title.unwrap_or_default(),
        body: pr.body,
        state: state.to_string(),
        head_branch: pr.head.ref_field,
        base_branch: pr.base.ref_field,
        html_url: pr.html_url.map(|u| u.to_string()).unwrap_or_default(),
    }
}
