//! Controller configuration, mounted from a `ConfigMap`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime knobs for the remediation controller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationConfig {
    /// Wait between attempts when the strategy carries no timeout
    #[serde(default = "default_timeout", with = "crate::duration")]
    pub default_timeout: Duration,

    /// Backoff after a failed reconciliation
    #[serde(default = "default_error_requeue", with = "crate::duration")]
    pub error_requeue: Duration,

    /// How often an offline host is checked for coming back online
    #[serde(default = "default_host_recheck", with = "crate::duration")]
    pub host_recheck: Duration,

    /// Namespace to watch instead of the one given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch_namespace: Option<String>,
}

fn default_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_error_requeue() -> Duration {
    Duration::from_secs(30)
}

fn default_host_recheck() -> Duration {
    Duration::from_secs(60)
}

impl Default for RemediationConfig {
    fn default() -> Self {
        RemediationConfig {
            default_timeout: default_timeout(),
            error_requeue: default_error_requeue(),
            host_recheck: default_host_recheck(),
            watch_namespace: None,
        }
    }
}

impl RemediationConfig {
    /// Load configuration from mounted `ConfigMap` file
    pub fn from_mounted_file(config_path: &str) -> Result<Self, anyhow::Error> {
        let config_str = std::fs::read_to_string(config_path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {config_path}: {e}"))?;

        let config: RemediationConfig = serde_yaml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config YAML: {e}"))?;

        Ok(config)
    }

    /// Reject settings that would make the controller spin.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.error_requeue.is_zero() {
            return Err(anyhow::anyhow!("errorRequeue must be greater than zero"));
        }
        if self.host_recheck.is_zero() {
            return Err(anyhow::anyhow!("hostRecheck must be greater than zero"));
        }
        if matches!(self.watch_namespace.as_deref(), Some("")) {
            return Err(anyhow::anyhow!(
                "watchNamespace must not be empty when set; omit it to use --namespace"
            ));
        }
        Ok(())
    }

    /// Namespace to watch: the configured override, else `fallback`.
    #[must_use]
    pub fn namespace<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.watch_namespace.as_deref().unwrap_or(fallback)
    }
}
