mod branches;
mod gists;
mod issues;
mod pulls;

use std::sync::Arc;

use async_trait::async_trait;
use octocrab::Octocrab;
use thiserror::Error;

use crate::scm::SourceControl;
use crate::types::{Gist, Issue, IssueComment, PullRequest, RepoCoords};

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API error: {0}")]
    Api(#[from] octocrab::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected GitHub response: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, GitHubError>;

/// Token-scoped GitHub client. Repository coordinates are passed per call
/// because one workflow's origin issue and implementation repo may differ.
#[derive(Clone)]
pub struct GitHubClient {
    pub(crate) octocrab: Octocrab,
}

impl GitHubClient {
    /// Build a client. Without a token only public reads will succeed,
    /// which is enough for the token-optional paths.
    pub fn new(token: Option<&str>) -> Result<Self> {
        let builder = Octocrab::builder();
        let octocrab = match token {
            Some(t) if !t.is_empty() => builder.personal_token(t.to_string()).build()?,
            _ => builder.build()?,
        };
        Ok(Self { octocrab })
    }
}

#[async_trait]
impl SourceControl for GitHubClient {
    async fn get_issue(&self, repo: &RepoCoords, number: u64) -> Result<Issue> {
        issues::get_issue(self, repo, number).await
    }

    async fn create_issue(&self, repo: &RepoCoords, title: &str, body: &str) -> Result<Issue> {
        issues::create_issue(self, repo, title, body).await
    }

    async fn list_comments(&self, repo: &RepoCoords, issue_number: u64) -> Result<Vec<IssueComment>> {
        issues::list_comments(self, repo, issue_number).await
    }

    async fn add_comment(&self, repo: &RepoCoords, issue_number: u64, body: &str) -> Result<IssueComment> {
        issues::add_comment(self, repo, issue_number, body).await
    }

    async fn list_issue_labels(&self, repo: &RepoCoords, issue_number: u64) -> Result<Vec<String>> {
        issues::list_issue_labels(self, repo, issue_number).await
    }

    async fn add_issue_label(&self, repo: &RepoCoords, issue_number: u64, label: &str) -> Result<()> {
        issues::add_issue_label(self, repo, issue_number, label).await
    }

    async fn list_open_pull_requests(&self, repo: &RepoCoords) -> Result<Vec<PullRequest>> {
        pulls::list_open_pull_requests(self, repo).await
    }

    async fn create_gist(
        &self,
        filename: &str,
        description: &str,
        content: &str,
        public: bool,
    ) -> Result<Gist> {
        gists::create_gist(self, filename, description, content, public).await
    }

    async fn gist_content(&self, gist_id: &str) -> Result<String> {
        gists::gist_content(self, gist_id).await
    }

    async fn ensure_branch(&self, repo: &RepoCoords, branch: &str, base: Option<&str>) -> Result<()> {
        branches::ensure_branch(self, repo, branch, base).await
    }
}

/// Builds a [`SourceControl`] handle for a given token.
pub trait ScmFactory: Send + Sync {
    fn client_for(&self, token: Option<&str>) -> Result<Arc<dyn SourceControl>>;
}

/// Production factory: one octocrab instance per token.
#[derive(Default, Clone)]
pub struct GitHubFactory;

impl ScmFactory for GitHubFactory {
    fn client_for(&self, token: Option<&str>) -> Result<Arc<dyn SourceControl>> {
        Ok(Arc::new(GitHubClient::new(token)?))
    }
}
