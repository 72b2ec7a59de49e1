//! Resolution of the unhealthy host behind a `Metal3Machine`.

use crate::crds::{BareMetalHost, Metal3Machine};
use crate::error::{Error, Result};
use crate::store::ObjectStore;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Machine annotation that points at the backing host as `namespace/name`.
pub const HOST_ANNOTATION: &str = "metal3.io/BareMetalHost";

/// Validated `namespace/name` reference to a `BareMetalHost`.
///
/// Only constructed by parsing the machine annotation, so an instance always
/// carries two non-empty components.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostReference {
    namespace: String,
    name: String,
}

impl HostReference {
    /// Read and parse the host reference from a machine's annotations.
    pub fn from_annotations(annotations: &BTreeMap<String, String>, binding: &str) -> Result<Self> {
        match annotations.get(HOST_ANNOTATION).map(String::as_str) {
            None | Some("") => Err(Error::ReferenceMissing {
                annotation: HOST_ANNOTATION.to_string(),
                binding: binding.to_string(),
            }),
            Some(value) => Self::parse(value),
        }
    }

    fn parse(value: &str) -> Result<Self> {
        let mut parts = value.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(namespace), Some(name), None) if !namespace.is_empty() && !name.is_empty() => {
                Ok(Self {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(Error::ReferenceMalformed {
                value: value.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for HostReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Writes a host back as a compare-and-swap against the version it was read
/// at. A concurrent change in between surfaces as `VersionConflict`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPatchHelper {
    reference: HostReference,
    resource_version: Option<String>,
}

impl HostPatchHelper {
    fn new(reference: HostReference, host: &BareMetalHost) -> Self {
        Self {
            reference,
            resource_version: host.resource_version(),
        }
    }

    #[must_use]
    pub fn reference(&self) -> &HostReference {
        &self.reference
    }

    #[must_use]
    pub fn resource_version(&self) -> Option<&str> {
        self.resource_version.as_deref()
    }

    /// Persist `host`, pinned to the version this helper was created with.
    pub async fn patch(&self, store: &dyn ObjectStore, mut host: BareMetalHost) -> Result<BareMetalHost> {
        host.metadata.resource_version.clone_from(&self.resource_version);
        store.update_host(&host).await
    }
}

/// Finds the `BareMetalHost` a machine is provisioned on.
pub struct HostResolver<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> HostResolver<'a> {
    #[must_use]
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// Resolve the machine's host and a patch helper bound to the version
    /// read here.
    pub async fn resolve(&self, machine: &Metal3Machine) -> Result<(BareMetalHost, HostPatchHelper)> {
        let binding = format!(
            "{}/{}",
            machine.namespace().unwrap_or_default(),
            machine.name_any()
        );
        let reference = HostReference::from_annotations(machine.annotations(), &binding)?;

        debug!(host = %reference, machine = %binding, "Resolving unhealthy host");
        let host = self.store.get_host(&reference).await?;
        let helper = HostPatchHelper::new(reference, &host);
        Ok((host, helper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{BareMetalHostSpec, Metal3MachineSpec};
    use crate::store::InMemoryStore;

    fn annotations(value: Option<&str>) -> BTreeMap<String, String> {
        value
            .map(|v| BTreeMap::from([(HOST_ANNOTATION.to_string(), v.to_string())]))
            .unwrap_or_default()
    }

    fn machine(reference: Option<&str>) -> Metal3Machine {
        let mut machine = Metal3Machine::new("mym3machine", Metal3MachineSpec::default());
        machine.metadata.namespace = Some("myns".to_string());
        if let Some(reference) = reference {
            machine.metadata.annotations = Some(annotations(Some(reference)));
        }
        machine
    }

    fn store_with_host() -> InMemoryStore {
        let store = InMemoryStore::new();
        let mut host = BareMetalHost::new("myhost", BareMetalHostSpec::default());
        host.metadata.namespace = Some("myns".to_string());
        store.insert_host(host);
        store
    }

    #[test]
    fn test_parse_reference() {
        let reference = HostReference::from_annotations(&annotations(Some("ns/host")), "b").unwrap();
        assert_eq!(reference.namespace(), "ns");
        assert_eq!(reference.name(), "host");
        assert_eq!(reference.to_string(), "ns/host");
    }

    #[test]
    fn test_missing_reference() {
        for value in [None, Some("")] {
            let err = HostReference::from_annotations(&annotations(value), "myns/m").unwrap_err();
            assert!(matches!(err, Error::ReferenceMissing { ref binding, .. } if binding == "myns/m"));
        }
    }

    #[test]
    fn test_malformed_reference() {
        for value in ["ns/host/extra", "host", "ns/", "/host", "/"] {
            let err = HostReference::from_annotations(&annotations(Some(value)), "b").unwrap_err();
            assert!(
                matches!(err, Error::ReferenceMalformed { value: ref v } if v == value),
                "expected malformed for {value}"
            );
        }
    }

    #[tokio::test]
    async fn test_resolves_existing_host() {
        let store = store_with_host();
        let (host, helper) = HostResolver::new(&store)
            .resolve(&machine(Some("myns/myhost")))
            .await
            .unwrap();

        assert_eq!(host.name_any(), "myhost");
        assert_eq!(helper.reference().to_string(), "myns/myhost");
        assert_eq!(helper.resource_version(), host.resource_version().as_deref());
    }

    #[tokio::test]
    async fn test_wrong_name_or_namespace_is_not_found() {
        let store = store_with_host();
        for reference in ["myns/wronghostname", "otherns/myhost"] {
            let err = HostResolver::new(&store)
                .resolve(&machine(Some(reference)))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::NotFound(_)), "{reference}");
        }
    }

    #[tokio::test]
    async fn test_unresolvable_annotations() {
        let store = store_with_host();

        let err = HostResolver::new(&store).resolve(&machine(None)).await.unwrap_err();
        assert!(matches!(err, Error::ReferenceMissing { .. }));

        let err = HostResolver::new(&store)
            .resolve(&machine(Some("myns/wronghostname/wronghostname")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ReferenceMalformed { .. }));
    }

    #[tokio::test]
    async fn test_patch_detects_concurrent_change() {
        let store = store_with_host();
        let m = machine(Some("myns/myhost"));

        let (mut stale, helper) = HostResolver::new(&store).resolve(&m).await.unwrap();

        // Someone else writes the host in between.
        let (fresh, fresh_helper) = HostResolver::new(&store).resolve(&m).await.unwrap();
        fresh_helper.patch(&store, fresh).await.unwrap();

        stale.spec.online = true;
        let err = helper.patch(&store, stale).await.unwrap_err();
        assert!(matches!(err, Error::VersionConflict(_)));
    }
}
