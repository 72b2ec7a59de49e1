//! `BareMetalHost` Custom Resource Definition
//!
//! Owned by the bare metal operator. The remediation controller reads
//! `spec.online` and writes marker annotations, nothing else.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(group = "metal3.io", version = "v1alpha1", kind = "BareMetalHost")]
#[kube(namespaced)]
#[kube(printcolumn = r#"{"name":"Online","type":"boolean","jsonPath":".spec.online"}"#)]
#[serde(rename_all = "camelCase")]
pub struct BareMetalHostSpec {
    /// Desired power state
    #[serde(default)]
    pub online: bool,

    /// Boot interface MAC address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_mac_address: Option<String>,
}
