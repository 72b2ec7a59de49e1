//! `Metal3Remediation` Custom Resource Definition
//!
//! One remediation episode for one unhealthy machine. The spec carries the
//! operator-authored strategy; the status is owned by this controller.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Finalizer that holds deletion until markers are cleaned up.
pub const REMEDIATION_FINALIZER: &str = "metal3remediation.infrastructure.cluster.x-k8s.io";

/// The only strategy kind this controller acts on.
pub const REBOOT_REMEDIATION_STRATEGY: &str = "Reboot";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Metal3Remediation"
)]
#[kube(namespaced)]
#[kube(status = "Metal3RemediationStatus")]
#[kube(printcolumn = r#"{"name":"Strategy","type":"string","jsonPath":".spec.strategy.type"}"#)]
#[kube(printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#)]
#[kube(printcolumn = r#"{"name":"Retries","type":"integer","jsonPath":".status.retryCount"}"#)]
#[kube(printcolumn = r#"{"name":"Last Remediated","type":"string","jsonPath":".status.lastRemediated"}"#)]
pub struct Metal3RemediationSpec {
    /// Remediation strategy. Absent means default policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<RemediationStrategy>,
}

/// How a host is remediated and how hard we try.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemediationStrategy {
    /// Strategy kind, e.g. "Reboot"
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Maximum number of remediation attempts. Zero or negative means unset.
    #[serde(default)]
    pub retry_limit: i32,

    /// Time to wait between attempts, Go duration format ("10m0s")
    #[serde(
        default,
        with = "crate::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<String>")]
    pub timeout: Option<Duration>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Metal3RemediationStatus {
    /// Raw phase string. Read it through `RemediationPhase::parse`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Number of remediation attempts made in this episode
    #[serde(default)]
    pub retry_count: u32,

    /// When the most recent attempt was issued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub last_remediated: Option<DateTime<Utc>>,
}

/// Phase of a remediation episode
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum RemediationPhase {
    /// A reboot is due or in flight
    Running,
    /// Waiting for the timeout to elapse before the next decision
    Waiting,
    /// Retries exhausted; the machine is handed over for replacement
    #[serde(rename = "Deleting machine")]
    DeletingMachine,
}

impl RemediationPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Waiting => "Waiting",
            Self::DeletingMachine => "Deleting machine",
        }
    }

    /// Recognize one of the three phase literals. Anything else, including
    /// the empty string, yields `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Running" => Some(Self::Running),
            "Waiting" => Some(Self::Waiting),
            "Deleting machine" => Some(Self::DeletingMachine),
            _ => None,
        }
    }
}

impl fmt::Display for RemediationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
