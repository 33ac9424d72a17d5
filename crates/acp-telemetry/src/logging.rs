use tracing_subscriber::{fmt, EnvFilter};

/// Wire format of the log stream. Chosen once at startup from
/// `ACP_LOG_FORMAT`: `json` for log-aggregated deployments, anything else
/// is human-readable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }

    pub fn from_env() -> Self {
        Self::parse(std::env::var("ACP_LOG_FORMAT").ok().as_deref())
    }
}

/// Filter applied when `RUST_LOG` is unset: the control plane at info, the
/// cluster client and HTTP middleware quieted down to warnings.
pub const DEFAULT_FILTER: &str = "info,kube=warn,tower_http=warn";

/// Install the global subscriber for `service`, format per
/// `ACP_LOG_FORMAT`. Returns `false` when a subscriber was already
/// installed, so repeated calls across tests stay harmless.
pub fn init(service: &str) -> bool {
    init_with(service, LogFormat::from_env(), DEFAULT_FILTER)
}

/// [`init`] with the format and fallback filter pinned by the caller.
pub fn init_with(service: &str, format: LogFormat, default_filter: &str) -> bool {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => EnvFilter::new(default_filter),
    };

    let installed = match format {
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init().is_ok(),
        LogFormat::Json => fmt()
            .json()
            .flatten_event(true)
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok(),
    };

    if installed {
        tracing::info!(service, format = ?format, "logging initialised");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing() {
        assert_eq!(LogFormat::parse(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("text")), LogFormat::Text);
        assert_eq!(LogFormat::parse(Some("yaml")), LogFormat::Text);
        assert_eq!(LogFormat::parse(None), LogFormat::Text);
    }

    #[test]
    fn second_init_reports_already_installed() {
        init_with("acp-test", LogFormat::Text, DEFAULT_FILTER);
        // A subscriber exists now, whoever installed it; the repeat cannot.
        assert!(!init_with("acp-test", LogFormat::Text, DEFAULT_FILTER));
    }
}
