/// Derive the runner-facing repository name from a clone URL: strip a
/// trailing `.git`, take the final path component, fall back to `repo` when
/// nothing remains. The runner uses this name as the workspace subdirectory
/// and as the push target.
pub fn repo_name_from_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let name = trimmed.rsplit('/').next().unwrap_or_default();
    if name.is_empty() {
        "repo".to_string()
    } else {
        name.to_string()
    }
}
