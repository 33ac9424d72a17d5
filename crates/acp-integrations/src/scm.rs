use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::github::{GitHubError, Result};
use crate::types::{Gist, Issue, IssueComment, PullRequest, RepoCoords};

/// The capability surface the control plane needs from a source-control
/// provider. Implemented for GitHub; the engine only ever sees this trait.
#[async_trait]
pub trait SourceControl: Send + Sync {
    async fn get_issue(&self, repo: &RepoCoords, number: u64) -> Result<Issue>;

    async fn create_issue(&self, repo: &RepoCoords, title: &str, body: &str) -> Result<Issue>;

    async fn list_comments(&self, repo: &RepoCoords, issue_number: u64) -> Result<Vec<IssueComment>>;

    async fn add_comment(&self, repo: &RepoCoords, issue_number: u64, body: &str) -> Result<IssueComment>;

    async fn list_issue_labels(&self, repo: &RepoCoords, issue_number: u64) -> Result<Vec<String>>;

    async fn add_issue_label(&self, repo: &RepoCoords, issue_number: u64, label: &str) -> Result<()>;

    /// All currently open pull requests in the repository.
    async fn list_open_pull_requests(&self, repo: &RepoCoords) -> Result<Vec<PullRequest>>;

    async fn create_gist(
        &self,
        filename: &str,
        description: &str,
        content: &str,
        public: bool,
    ) -> Result<Gist>;

    /// Content of the first file of a gist.
    async fn gist_content(&self, gist_id: &str) -> Result<String>;

    /// Create `branch` from `base` (repo default branch when `None`).
    /// A branch that already exists counts as success.
    async fn ensure_branch(&self, repo: &RepoCoords, branch: &str, base: Option<&str>) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Recording stub for offline tests without network access
// ---------------------------------------------------------------------------

/// In-memory source control with failure-injection knobs. Mutations are
/// recorded so tests can assert on the external side effects the engine
/// performed.
#[derive(Default)]
pub struct StubSourceControl {
    issues: Mutex<HashMap<(String, u64), Issue>>,
    comments: Mutex<HashMap<(String, u64), Vec<IssueComment>>>,
    labels: Mutex<HashMap<(String, u64), Vec<String>>>,
    open_prs: Mutex<Vec<PullRequest>>,
    gists: Mutex<HashMap<String, (Gist, String)>>,
    branches: Mutex<Vec<String>>,
    next_issue_number: AtomicU64,
    next_id: AtomicU64,
    fail_gist_create: AtomicBool,
    fail_pr_listing: AtomicBool,
}

impl StubSourceControl {
    pub fn new() -> Self {
        Self {
            next_issue_number: AtomicU64::new(100),
            next_id: AtomicU64::new(1),
            ..Self::default()
        }
    }

    fn key(repo: &RepoCoords, number: u64) -> (String, u64) {
        (repo.full_name(), number)
    }

    pub fn put_issue(&self, repo: &RepoCoords, issue: Issue) {
        let key = Self::key(repo, issue.number);
        self.issues.lock().unwrap().insert(key, issue);
    }

    pub fn put_comment(&self, repo: &RepoCoords, issue_number: u64, comment: IssueComment) {
        self.comments
            .lock()
            .unwrap()
            .entry(Self::key(repo, issue_number))
            .or_default()
            .push(comment);
    }

    pub fn put_open_pr(&self, pr: PullRequest) {
        self.open_prs.lock().unwrap().push(pr);
    }

    pub fn put_gist(&self, id: &str, html_url: &str, content: &str) {
        self.gists.lock().unwrap().insert(
            id.to_string(),
            (Gist { id: id.to_string(), html_url: html_url.to_string() }, content.to_string()),
        );
    }

    pub fn fail_gist_create(&self, fail: bool) {
        self.fail_gist_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_pr_listing(&self, fail: bool) {
        self.fail_pr_listing.store(fail, Ordering::SeqCst);
    }

    // -- recorded side effects ----------------------------------------------

    pub fn comments_on(&self, repo: &RepoCoords, issue_number: u64) -> Vec<IssueComment> {
        self.comments
            .lock()
            .unwrap()
            .get(&Self::key(repo, issue_number))
            .cloned()
            .unwrap_or_default()
    }

    pub fn labels_on(&self, repo: &RepoCoords, issue_number: u64) -> Vec<String> {
        self.labels
            .lock()
            .unwrap()
            .get(&Self::key(repo, issue_number))
            .cloned()
            .unwrap_or_default()
    }

    pub fn gist_count(&self) -> usize {
        self.gists.lock().unwrap().len()
    }

    pub fn created_branches(&self) -> Vec<String> {
        self.branches.lock().unwrap().clone()
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceControl for StubSourceControl {
    async fn get_issue(&self, repo: &RepoCoords, number: u64) -> Result<Issue> {
        self.issues
            .lock()
            .unwrap()
            .get(&Self::key(repo, number))
            .cloned()
            .ok_or_else(|| GitHubError::NotFound(format!("issue {}#{number}", repo.full_name())))
    }

    async fn create_issue(&self, repo: &RepoCoords, title: &str, body: &str) -> Result<Issue> {
        let number = self.next_issue_number.fetch_add(1, Ordering::SeqCst);
        let issue = Issue {
            number,
            title: title.to_string(),
            body: Some(body.to_string()),
            labels: vec![],
            html_url: format!("https://github.com/{}/issues/{number}", repo.full_name()),
            author: "stub".to_string(),
        };
        self.put_issue(repo, issue.clone());
        Ok(issue)
    }

    async fn list_comments(&self, repo: &RepoCoords, issue_number: u64) -> Result<Vec<IssueComment>> {
        Ok(self.comments_on(repo, issue_number))
    }

    async fn add_comment(&self, repo: &RepoCoords, issue_number: u64, body: &str) -> Result<IssueComment> {
        let id = self.next();
        let comment = IssueComment {
            id: id.to_string(),
            body: body.to_string(),
            author_login: "control-plane".to_string(),
            author_type: "Bot".to_string(),
            html_url: format!(
                "https://github.com/{}/issues/{issue_number}#issuecomment-{id}",
                repo.full_name()
            ),
            created_at: Utc::now(),
        };
        self.put_comment(repo, issue_number, comment.clone());
        Ok(comment)
    }

    async fn list_issue_labels(&self, repo: &RepoCoords, issue_number: u64) -> Result<Vec<String>> {
        Ok(self.labels_on(repo, issue_number))
    }

    async fn add_issue_label(&self, repo: &RepoCoords, issue_number: u64, label: &str) -> Result<()> {
        let mut labels = self.labels.lock().unwrap();
        let entry = labels.entry(Self::key(repo, issue_number)).or_default();
        if !entry.iter().any(|l| l == label) {
            entry.push(label.to_string());
        }
        Ok(())
    }

    async fn list_open_pull_requests(&self, _repo: &RepoCoords) -> Result<Vec<PullRequest>> {
        if self.fail_pr_listing.load(Ordering::SeqCst) {
            return Err(GitHubError::NotFound("injected PR listing failure".into()));
        }
        Ok(self.open_prs.lock().unwrap().clone())
    }

    async fn create_gist(
        &self,
        filename: &str,
        _description: &str,
        content: &str,
        _public: bool,
    ) -> Result<Gist> {
        if self.fail_gist_create.load(Ordering::SeqCst) {
            return Err(GitHubError::NotFound("injected gist failure".into()));
        }
        let id = format!("gist-{}", self.next());
        let gist = Gist {
            id: id.clone(),
            html_url: format!("https://gist.github.com/control-plane/{id}#{filename}"),
        };
        self.gists
            .lock()
            .unwrap()
            .insert(id, (gist.clone(), content.to_string()));
        Ok(gist)
    }

    async fn gist_content(&self, gist_id: &str) -> Result<String> {
        self.gists
            .lock()
            .unwrap()
            .get(gist_id)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| GitHubError::NotFound(format!("gist {gist_id}")))
    }

    async fn ensure_branch(&self, repo: &RepoCoords, branch: &str, _base: Option<&str>) -> Result<()> {
        let name = format!("{}#{branch}", repo.full_name());
        let mut branches = self.branches.lock().unwrap();
        if !branches.contains(&name) {
            branches.push(name);
        }
        Ok(())
    }
}

/// Factory handing out one shared stub regardless of token, so tests can
/// assert on the side effects afterwards.
pub struct StubScmFactory(pub Arc<StubSourceControl>);

impl crate::github::ScmFactory for StubScmFactory {
    fn client_for(&self, _token: Option<&str>) -> Result<Arc<dyn SourceControl>> {
        Ok(self.0.clone())
    }
}
