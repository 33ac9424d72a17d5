use std::fmt;

/// Which transport delivers session status transitions to the completion
/// router. At most one is active per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTransport {
    /// An external watcher POSTs `{type, object}` to `/webhooks/session-status`.
    Webhook,
    /// The daemon opens a long-lived label-filtered watch per project.
    Watch,
}

impl fmt::Display for EventTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTransport::Webhook => f.write_str("webhook"),
            EventTransport::Watch => f.write_str("watch"),
        }
    }
}

/// Daemon runtime settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Address the HTTP API binds to.
    pub bind_addr: String,
    /// Namespace the control plane's own resources live in. Per-project
    /// resources live in the project's namespace.
    pub namespace: String,
    pub event_transport: EventTransport,
    /// Root of runner workspaces.
    pub state_base_dir: String,
    /// Projects the pull watcher follows when `event_transport` is `Watch`.
    pub watched_projects: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            namespace: "ambient".to_string(),
            event_transport: EventTransport::Webhook,
            state_base_dir: "/workspace".to_string(),
            watched_projects: Vec::new(),
        }
    }
}

impl Settings {
    /// Build settings from the process environment, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let transport = match std::env::var("ACP_EVENT_TRANSPORT").as_deref() {
            Ok("watch") => EventTransport::Watch,
            _ => EventTransport::Webhook,
        };
        let watched_projects = std::env::var("ACP_WATCHED_PROJECTS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            bind_addr: std::env::var("ACP_BIND_ADDR").unwrap_or(defaults.bind_addr),
            namespace: std::env::var("ACP_NAMESPACE").unwrap_or(defaults.namespace),
            event_transport: transport,
            state_base_dir: std::env::var("STATE_BASE_DIR").unwrap_or(defaults.state_base_dir),
            watched_projects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.bind_addr, "0.0.0.0:8080");
        assert_eq!(s.event_transport, EventTransport::Webhook);
        assert_eq!(s.state_base_dir, "/workspace");
    }

    #[test]
    fn transport_display() {
        assert_eq!(EventTransport::Watch.to_string(), "watch");
        assert_eq!(EventTransport::Webhook.to_string(), "webhook");
    }
}
