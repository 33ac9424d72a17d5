use serde_json::json;
use tracing::debug;

use crate::types::RepoCoords;

use super::{GitHubClient, GitHubError, Result};

/// Create `branch` from `base` (repo default branch when `None`). A branch
/// that already exists counts as success.
pub async fn ensure_branch(
    client: &GitHubClient,
    repo: &RepoCoords,
    branch: &str,
    base: Option<&str>,
) -> Result<()> {
    let base = match base {
        Some(b) => b.to_string(),
        None => default_branch(client, repo).await?,
    };

    let base_ref: serde_json::Value = client
        .octocrab
        .get(
            format!("/repos/{}/{}/git/ref/heads/{base}", repo.owner, repo.repo),
            None::<&()>,
        )
        .await?;
    let sha = base_ref["object"]["sha"]
        .as_str()
        .ok_or_else(|| GitHubError::Malformed(format!("ref heads/{base} missing object.sha")))?;

    let body = json!({ "ref": format!("refs/heads/{branch}"), "sha": sha });
    let created: std::result::Result<serde_json::Value, octocrab::Error> = client
        .octocrab
        .post(
            format!("/repos/{}/{}/git/refs", repo.owner, repo.repo),
            Some(&body),
        )
        .await;

    match created {
        Ok(_) => Ok(()),
        Err(e) if is_already_exists(&e) => {
            debug!(repo = %repo.full_name(), branch, "branch already exists");
            Ok(())
        }
        Err(e) => Err(GitHubError::Api(e)),
    }
}

async fn default_branch(client: &GitHubClient, repo: &RepoCoords) -> Result<String> {
    let repository: serde_json::Value = client
        .octocrab
        .get(format!("/repos/{}/{}", repo.owner, repo.repo), None::<&()>)
        .await?;

    Ok(repository["default_branch"].as_str().unwrap_or("main").to_string())
}

fn is_already_exists(err: &octocrab::Error) -> bool {
    matches!(
        err,
        octocrab::Error::GitHub { source, .. }
            if source.message.to_ascii_lowercase().contains("already exists")
    )
}
