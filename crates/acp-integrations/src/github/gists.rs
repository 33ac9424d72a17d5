use serde_json::json;

use crate::types::Gist;

use super::{GitHubClient, GitHubError, Result};

/// Create a single-file gist and return its id + web URL.
pub async fn create_gist(
    client: &GitHubClient,
    filename: &str,
    description: &str,
    content: &str,
    public: bool,
) -> Result<Gist> {
    let body = json!({
        "description": description,
        "public": public,
        "files": { filename: { "content": content } },
    });

    let created: serde_json::Value = client.octocrab.post("/gists", Some(&body)).await?;

    let id = created["id"]
        .as_str()
        .ok_or_else(|| GitHubError::Malformed("gist response missing id".into()))?;
    let html_url = created["html_url"]
        .as_str()
        .ok_or_else(|| GitHubError::Malformed("gist response missing html_url".into()))?;

    Ok(Gist { id: id.to_string(), html_url: html_url.to_string() })
}

/// Fetch the content of the first file of a gist.
pub async fn gist_content(client: &GitHubClient, gist_id: &str) -> Result<String> {
    let gist: serde_json::Value = client
        .octocrab
        .get(format!("/gists/{gist_id}"), None::<&()>)
        .await?;

    let files = gist["files"]
        .as_object()
        .ok_or_else(|| GitHubError::Malformed("gist response missing files".into()))?;

    files
        .values()
        .find_map(|f| f["content"].as_str())
        .map(String::from)
        .ok_or_else(|| GitHubError::NotFound(format!("gist {gist_id} has no file content")))
}
