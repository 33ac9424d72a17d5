use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the runner secret used when a project has no
/// `ProjectSettings` resource or it names none.
pub const DEFAULT_RUNNER_SECRETS_NAME: &str = "ambient-runner-secrets";

/// Per-project configuration knobs consumed by the control plane.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ambient.dev",
    version = "v1alpha1",
    kind = "ProjectSettings",
    plural = "projectsettings",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettingsSpec {
    /// Name of the secret holding runner credentials (tracker config,
    /// bot token). Defaults to [`DEFAULT_RUNNER_SECRETS_NAME`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_secrets_name: Option<String>,
}

impl ProjectSettings {
    pub fn runner_secrets_name(&self) -> &str {
        self.spec
            .runner_secrets_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_RUNNER_SECRETS_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_secret_name() {
        let ps = ProjectSettings::new("settings", ProjectSettingsSpec::default());
        assert_eq!(ps.runner_secrets_name(), "ambient-runner-secrets");
    }

    #[test]
    fn explicit_secret_name() {
        let ps = ProjectSettings::new(
            "settings",
            ProjectSettingsSpec {
                runner_secrets_name: Some("team-secrets".into()),
            },
        );
        assert_eq!(ps.runner_secrets_name(), "team-secrets");
    }
}
