use crate::crds::{BareMetalHost, Metal3Machine, Metal3Remediation};
use crate::error::{Error, Result};
use crate::resolver::HostReference;
use crate::store::ObjectStore;
use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde_json::json;
use tracing::{debug, instrument};

/// [`ObjectStore`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, object: &K) -> Result<(Api<K>, String)>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        let namespace = object.namespace().ok_or_else(|| {
            Error::Configuration(format!("{} has no namespace", object.name_any()))
        })?;
        Ok((
            Api::namespaced(self.client.clone(), &namespace),
            format!("{namespace}/{}", object.name_any()),
        ))
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    #[instrument(skip(self), fields(host = %reference))]
    async fn get_host(&self, reference: &HostReference) -> Result<BareMetalHost> {
        let hosts: Api<BareMetalHost> = Api::namespaced(self.client.clone(), reference.namespace());
        hosts
            .get(reference.name())
            .await
            .map_err(|e| Error::from_kube(e, &reference.to_string()))
    }

    #[instrument(skip(self, host), fields(host = %host.name_any()))]
    async fn update_host(&self, host: &BareMetalHost) -> Result<BareMetalHost> {
        let (hosts, key) = self.namespaced(host)?;
        let updated = hosts
            .replace(&host.name_any(), &PostParams::default(), host)
            .await
            .map_err(|e| Error::from_kube(e, &key))?;
        debug!(
            resource_version = ?updated.resource_version(),
            "Updated BareMetalHost {}", key
        );
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn get_machine(&self, namespace: &str, name: &str) -> Result<Metal3Machine> {
        let machines: Api<Metal3Machine> = Api::namespaced(self.client.clone(), namespace);
        machines
            .get(name)
            .await
            .map_err(|e| Error::from_kube(e, &format!("{namespace}/{name}")))
    }

    #[instrument(skip(self, remediation), fields(remediation = %remediation.name_any()))]
    async fn update_remediation(&self, remediation: &Metal3Remediation) -> Result<Metal3Remediation> {
        let (remediations, key) = self.namespaced(remediation)?;
        let name = remediation.name_any();

        // Status is a subresource: the main update carries metadata only.
        let updated = remediations
            .replace(&name, &PostParams::default(), remediation)
            .await
            .map_err(|e| Error::from_kube(e, &key))?;

        let Some(status) = &remediation.status else {
            return Ok(updated);
        };

        // Pinning the resourceVersion makes the merge patch a compare-and-swap.
        let patch = json!({
            "metadata": { "resourceVersion": updated.resource_version() },
            "status": status,
        });
        let patched = remediations
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| Error::from_kube(e, &key))?;

        debug!(
            resource_version = ?patched.resource_version(),
            "Updated Metal3Remediation {}", key
        );
        Ok(patched)
    }
}
