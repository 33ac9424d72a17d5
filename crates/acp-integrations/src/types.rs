use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Repository coordinates
// ---------------------------------------------------------------------------

/// Owner + repo pair identifying a source-control repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoCoords {
    pub owner: String,
    pub repo: String,
}

impl RepoCoords {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self { owner: owner.into(), repo: repo.into() }
    }

    /// Parse coordinates out of an HTTPS clone or web URL
    /// (`https://github.com/acme/svc`, with or without `.git`).
    pub fn from_repo_url(url: &str) -> Option<Self> {
        let rest = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))?;
        let mut segments = rest.trim_end_matches('/').split('/');
        let _host = segments.next()?;
        let owner = segments.next()?;
        let repo = segments.next()?;
        let repo = repo.strip_suffix(".git").unwrap_or(repo);
        if owner.is_empty() || repo.is_empty() {
            return None;
        }
        Some(Self::new(owner, repo))
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// A parsed issue URL: the repository plus the issue number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRef {
    pub repo: RepoCoords,
    pub number: u64,
}

impl IssueRef {
    /// Parse `https://<host>/<owner>/<repo>/issues/<n>`.
    pub fn parse(url: &str) -> Option<Self> {
        let rest = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))?;
        let mut segments = rest.trim_end_matches('/').split('/');
        let _host = segments.next()?;
        let owner = segments.next()?;
        let repo = segments.next()?;
        if segments.next()? != "issues" {
            return None;
        }
        let number: u64 = segments.next()?.parse().ok()?;
        if segments.next().is_some() {
            return None;
        }
        Some(Self { repo: RepoCoords::new(owner, repo), number })
    }
}

// ---------------------------------------------------------------------------
// Source-control objects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub labels: Vec<String>,
    pub html_url: String,
    pub author: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueComment {
    pub id: String,
    pub body: String,
    pub author_login: String,
    /// The platform's account type, e.g. `User` or `Bot`.
    pub author_type: String,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub head_branch: String,
    pub base_branch: String,
    pub html_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gist {
    pub id: String,
    pub html_url: String,
}

/// Extract a gist id from its web URL (last path segment).
pub fn gist_id_from_url(url: &str) -> Option<&str> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_url_parses() {
        let parsed = IssueRef::parse("https://github.com/acme/svc/issues/42").unwrap();
        assert_eq!(parsed.repo, RepoCoords::new("acme", "svc"));
        assert_eq!(parsed.number, 42);
    }

    #[test]
    fn issue_url_rejects_non_issue_paths() {
        assert!(IssueRef::parse("https://github.com/acme/svc/pull/42").is_none());
        assert!(IssueRef::parse("https://github.com/acme/svc").is_none());
        assert!(IssueRef::parse("https://github.com/acme/svc/issues/x").is_none());
        assert!(IssueRef::parse("not a url").is_none());
    }

    #[test]
    fn repo_coords_from_clone_url() {
        assert_eq!(
            RepoCoords::from_repo_url("https://github.com/acme/svc.git"),
            Some(RepoCoords::new("acme", "svc"))
        );
        assert_eq!(
            RepoCoords::from_repo_url("https://github.com/acme/svc/"),
            Some(RepoCoords::new("acme", "svc"))
        );
        assert!(RepoCoords::from_repo_url("git@github.com:acme/svc.git").is_none());
    }

    #[test]
    fn gist_id_extraction() {
        assert_eq!(gist_id_from_url("https://gist.github.com/alice/abc123"), Some("abc123"));
        assert_eq!(gist_id_from_url("abc123"), Some("abc123"));
    }
}
