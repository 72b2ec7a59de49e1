//! `Metal3Machine` Custom Resource Definition
//!
//! Only the parts the remediation controller reads are modelled. The machine
//! points at its bare metal host through the `metal3.io/BareMetalHost`
//! annotation.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Metal3Machine"
)]
#[kube(namespaced)]
#[serde(rename_all = "camelCase")]
pub struct Metal3MachineSpec {
    /// Provider ID of the node backing this machine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}
