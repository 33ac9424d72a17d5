pub mod format;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from the external issue-tracker API.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Required configuration keys missing from the runner secret.
    #[error("tracker configuration incomplete, missing: {}", .missing.join(", "))]
    Config { missing: Vec<String> },

    /// The tracker rejected our credentials (401/403).
    #[error("tracker authentication failed")]
    Auth,

    /// Project or issue does not exist on the tracker (404). On the
    /// update-path this triggers the fall-through to the create-path.
    #[error("tracker object not found: {0}")]
    NotFound(String),

    /// Any other non-success response.
    #[error("tracker API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, TrackerError>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const CONFIG_KEY_URL: &str = "TRACKER_URL";
pub const CONFIG_KEY_PROJECT: &str = "TRACKER_PROJECT";
pub const CONFIG_KEY_TOKEN: &str = "TRACKER_API_TOKEN";

/// Tracker connection settings, read from the per-project runner secret.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub base_url: String,
    pub project_key: String,
    pub api_token: String,
}

impl TrackerConfig {
    /// Build from the decoded secret map, enumerating every missing key in
    /// the error so operators can fix the secret in one pass.
    pub fn from_secret(map: &BTreeMap<String, String>) -> Result<Self> {
        let mut missing = Vec::new();
        for key in [CONFIG_KEY_URL, CONFIG_KEY_PROJECT, CONFIG_KEY_TOKEN] {
            if map.get(key).map(String::as_str).unwrap_or("").is_empty() {
                missing.push(key.to_string());
            }
        }
        if !missing.is_empty() {
            return Err(TrackerError::Config { missing });
        }
        Ok(Self {
            base_url: map[CONFIG_KEY_URL].trim_end_matches('/').to_string(),
            project_key: map[CONFIG_KEY_PROJECT].clone(),
            api_token: map[CONFIG_KEY_TOKEN].clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Capability trait
// ---------------------------------------------------------------------------

/// The capability surface the sync engine needs from an issue tracker.
#[async_trait]
pub trait Tracker: Send + Sync {
    /// Create an issue and return its key (e.g. `PROJ-7`).
    async fn create_issue(&self, summary: &str, description: &str) -> Result<String>;

    async fn update_description(&self, key: &str, description: &str) -> Result<()>;

    /// Filenames of the attachments currently on an issue.
    async fn list_attachment_filenames(&self, key: &str) -> Result<Vec<String>>;

    async fn attach_file(&self, key: &str, filename: &str, content: &str) -> Result<()>;

    async fn add_remote_link(&self, key: &str, url: &str, title: &str) -> Result<()>;

    /// Browse URL for an issue key.
    fn browse_url(&self, key: &str) -> String;
}

// ---------------------------------------------------------------------------
// Jira-style REST client
// ---------------------------------------------------------------------------

pub struct JiraTracker {
    http: reqwest::Client,
    config: TrackerConfig,
}

impl JiraTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self { http: reqwest::Client::new(), config }
    }

    fn api(&self, path: &str) -> String {
        format!("{}/rest/api/2/{path}", self.config.base_url)
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.config.api_token)
    }

    /// Map a non-success response onto the error taxonomy.
    async fn fail(resp: reqwest::Response) -> TrackerError {
        let status = resp.status().as_u16();
        let message = resp.text().await.unwrap_or_default();
        match status {
            401 | 403 => TrackerError::Auth,
            404 => TrackerError::NotFound(message),
            _ => TrackerError::Api { status, message },
        }
    }
}

#[async_trait]
impl Tracker for JiraTracker {
    async fn create_issue(&self, summary: &str, description: &str) -> Result<String> {
        let body = serde_json::json!({
            "fields": {
                "project": { "key": self.config.project_key },
                "summary": summary,
                "description": description,
                "issuetype": { "name": "Task" },
            }
        });
        let resp = self.auth(self.http.post(self.api("issue")).json(&body)).send().await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp).await);
        }
        let created: serde_json::Value = resp.json().await?;
        created["key"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| TrackerError::Api {
                status: 201,
                message: "create response missing key".into(),
            })
    }

    async fn update_description(&self, key: &str, description: &str) -> Result<()> {
        let body = serde_json::json!({ "fields": { "description": description } });
        let resp = self
            .auth(self.http.put(self.api(&format!("issue/{key}"))).json(&body))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp).await);
        }
        Ok(())
    }

    async fn list_attachment_filenames(&self, key: &str) -> Result<Vec<String>> {
        let resp = self
            .auth(self.http.get(self.api(&format!("issue/{key}"))).query(&[("fields", "attachment")]))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp).await);
        }
        let issue: serde_json::Value = resp.json().await?;
        let names = issue["fields"]["attachment"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|a| a["filename"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        Ok(names)
    }

    async fn attach_file(&self, key: &str, filename: &str, content: &str) -> Result<()> {
        let part = reqwest::multipart::Part::text(content.to_string())
            .file_name(filename.to_string())
            .mime_str("text/markdown")?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp = self
            .auth(
                self.http
                    .post(self.api(&format!("issue/{key}/attachments")))
                    .header("X-Atlassian-Token", "no-check")
                    .multipart(form),
            )
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp).await);
        }
        Ok(())
    }

    async fn add_remote_link(&self, key: &str, url: &str, title: &str) -> Result<()> {
        let body = serde_json::json!({ "object": { "url": url, "title": title } });
        let resp = self
            .auth(self.http.post(self.api(&format!("issue/{key}/remotelink"))).json(&body))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp).await);
        }
        Ok(())
    }

    fn browse_url(&self, key: &str) -> String {
        format!("{}/browse/{key}", self.config.base_url)
    }
}

/// Builds a [`Tracker`] handle from per-project configuration.
pub trait TrackerFactory: Send + Sync {
    fn tracker_for(&self, config: TrackerConfig) -> std::sync::Arc<dyn Tracker>;
}

/// Production factory: one REST client per configuration.
#[derive(Default, Clone)]
pub struct JiraTrackerFactory;

impl TrackerFactory for JiraTrackerFactory {
    fn tracker_for(&self, config: TrackerConfig) -> std::sync::Arc<dyn Tracker> {
        std::sync::Arc::new(JiraTracker::new(config))
    }
}

/// Factory handing out one shared stub regardless of configuration.
pub struct StubTrackerFactory(pub std::sync::Arc<StubTracker>);

impl TrackerFactory for StubTrackerFactory {
    fn tracker_for(&self, _config: TrackerConfig) -> std::sync::Arc<dyn Tracker> {
        self.0.clone()
    }
}

// ---------------------------------------------------------------------------
// Stub tracker for offline tests without network access
// ---------------------------------------------------------------------------

/// In-memory tracker with failure-injection knobs, mirroring the state a
/// real tracker would hold per issue.
pub struct StubTracker {
    base_url: String,
    project_key: String,
    issues: Mutex<HashMap<String, String>>,
    attachments: Mutex<HashMap<String, Vec<String>>>,
    remote_links: Mutex<Vec<(String, String)>>,
    next_number: AtomicU64,
    update_returns_not_found: AtomicBool,
    fail_attachments: AtomicBool,
    fail_creates: AtomicBool,
}

impl StubTracker {
    pub fn new(project_key: &str) -> Self {
        Self {
            base_url: "https://tracker.example.com".to_string(),
            project_key: project_key.to_string(),
            issues: Mutex::new(HashMap::new()),
            attachments: Mutex::new(HashMap::new()),
            remote_links: Mutex::new(Vec::new()),
            next_number: AtomicU64::new(1),
            update_returns_not_found: AtomicBool::new(false),
            fail_attachments: AtomicBool::new(false),
            fail_creates: AtomicBool::new(false),
        }
    }

    /// Simulate deletion of remote issues: every update 404s until a new
    /// issue is created.
    pub fn drop_issues(&self) {
        self.issues.lock().unwrap().clear();
        self.update_returns_not_found.store(true, Ordering::SeqCst);
    }

    pub fn fail_attachments(&self, fail: bool) {
        self.fail_attachments.store(fail, Ordering::SeqCst);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn issue_count(&self) -> usize {
        self.issues.lock().unwrap().len()
    }

    pub fn description_of(&self, key: &str) -> Option<String> {
        self.issues.lock().unwrap().get(key).cloned()
    }

    pub fn attachments_of(&self, key: &str) -> Vec<String> {
        self.attachments.lock().unwrap().get(key).cloned().unwrap_or_default()
    }

    pub fn remote_links(&self) -> Vec<(String, String)> {
        self.remote_links.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tracker for StubTracker {
    async fn create_issue(&self, _summary: &str, description: &str) -> Result<String> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(TrackerError::Api { status: 500, message: "injected create failure".into() });
        }
        let key = format!("{}-{}", self.project_key, self.next_number.fetch_add(1, Ordering::SeqCst));
        self.issues.lock().unwrap().insert(key.clone(), description.to_string());
        self.update_returns_not_found.store(false, Ordering::SeqCst);
        debug!(key, "stub tracker issue created");
        Ok(key)
    }

    async fn update_description(&self, key: &str, description: &str) -> Result<()> {
        if self.update_returns_not_found.load(Ordering::SeqCst) {
            return Err(TrackerError::NotFound(format!("issue {key} does not exist")));
        }
        let mut issues = self.issues.lock().unwrap();
        match issues.get_mut(key) {
            Some(existing) => {
                *existing = description.to_string();
                Ok(())
            }
            None => Err(TrackerError::NotFound(format!("issue {key} does not exist"))),
        }
    }

    async fn list_attachment_filenames(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.attachments_of(key))
    }

    async fn attach_file(&self, key: &str, filename: &str, _content: &str) -> Result<()> {
        if self.fail_attachments.load(Ordering::SeqCst) {
            return Err(TrackerError::Api { status: 500, message: "injected attachment failure".into() });
        }
        self.attachments
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push(filename.to_string());
        Ok(())
    }

    async fn add_remote_link(&self, key: &str, url: &str, _title: &str) -> Result<()> {
        self.remote_links.lock().unwrap().push((key.to_string(), url.to_string()));
        Ok(())
    }

    fn browse_url(&self, key: &str) -> String {
        format!("{}/browse/{key}", self.base_url)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_enumerates_missing_keys() {
        let err = TrackerConfig::from_secret(&BTreeMap::new()).unwrap_err();
        match err {
            TrackerError::Config { missing } => {
                assert_eq!(missing, vec!["TRACKER_URL", "TRACKER_PROJECT", "TRACKER_API_TOKEN"]);
            }
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn config_trims_trailing_slash() {
        let map = BTreeMap::from([
            (CONFIG_KEY_URL.to_string(), "https://jira.example.com/".to_string()),
            (CONFIG_KEY_PROJECT.to_string(), "PROJ".to_string()),
            (CONFIG_KEY_TOKEN.to_string(), "secret".to_string()),
        ]);
        let config = TrackerConfig::from_secret(&map).unwrap();
        assert_eq!(config.base_url, "https://jira.example.com");
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let map = BTreeMap::from([
            (CONFIG_KEY_URL.to_string(), "https://jira.example.com".to_string()),
            (CONFIG_KEY_PROJECT.to_string(), String::new()),
            (CONFIG_KEY_TOKEN.to_string(), "secret".to_string()),
        ]);
        let err = TrackerConfig::from_secret(&map).unwrap_err();
        assert!(matches!(err, TrackerError::Config { missing } if missing == vec!["TRACKER_PROJECT"]));
    }

    #[tokio::test]
    async fn stub_create_then_update() {
        let tracker = StubTracker::new("PROJ");
        let key = tracker.create_issue("summary", "desc v1").await.unwrap();
        assert_eq!(key, "PROJ-1");
        tracker.update_description(&key, "desc v2").await.unwrap();
        assert_eq!(tracker.description_of(&key).unwrap(), "desc v2");
    }

    #[tokio::test]
    async fn stub_dropped_issue_404s_until_recreated() {
        let tracker = StubTracker::new("PROJ");
        let key = tracker.create_issue("s", "d").await.unwrap();
        tracker.drop_issues();
        let err = tracker.update_description(&key, "d2").await.unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(_)));

        let key2 = tracker.create_issue("s", "d").await.unwrap();
        assert_eq!(key2, "PROJ-2");
        tracker.update_description(&key2, "d2").await.unwrap();
    }

    #[tokio::test]
    async fn stub_attachments_accumulate() {
        let tracker = StubTracker::new("PROJ");
        let key = tracker.create_issue("s", "d").await.unwrap();
        tracker.attach_file(&key, "a.md", "x").await.unwrap();
        tracker.attach_file(&key, "b.md", "y").await.unwrap();
        assert_eq!(tracker.list_attachment_filenames(&key).await.unwrap(), vec!["a.md", "b.md"]);
    }
}
