use crate::crds::{BareMetalHost, Metal3Machine, Metal3Remediation};
use crate::error::{Error, Result};
use crate::resolver::HostReference;
use crate::store::ObjectStore;
use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

type Key = (String, String);

/// In-process [`ObjectStore`] with API-server-like versioning.
///
/// Every write stamps a fresh `resourceVersion`; an update whose version does
/// not match the stored one is rejected with `VersionConflict`, including
/// updates that carry no version at all.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    hosts: BTreeMap<Key, BareMetalHost>,
    machines: BTreeMap<Key, Metal3Machine>,
    remediations: BTreeMap<Key, Metal3Remediation>,
    version: u64,
}

impl Inner {
    fn stamp<K: Resource>(&mut self, object: &mut K) {
        self.version += 1;
        object.meta_mut().resource_version = Some(self.version.to_string());
    }
}

fn key_of<K: Resource>(object: &K) -> Key {
    (object.namespace().unwrap_or_default(), object.name_any())
}

fn display(key: &Key) -> String {
    format!("{}/{}", key.0, key.1)
}

/// Compare-and-swap `object` into `map`.
fn swap<K: Resource + Clone>(
    map: &mut BTreeMap<Key, K>,
    object: &K,
    next_version: u64,
) -> Result<K> {
    let key = key_of(object);
    let stored = map
        .get_mut(&key)
        .ok_or_else(|| Error::NotFound(display(&key)))?;

    if stored.resource_version() != object.resource_version() || object.resource_version().is_none() {
        return Err(Error::VersionConflict(display(&key)));
    }

    let mut updated = object.clone();
    updated.meta_mut().resource_version = Some(next_version.to_string());
    *stored = updated.clone();
    Ok(updated)
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or overwrite a host, returning it with its new version.
    pub fn insert_host(&self, mut host: BareMetalHost) -> BareMetalHost {
        let mut inner = self.lock();
        inner.stamp(&mut host);
        inner.hosts.insert(key_of(&host), host.clone());
        host
    }

    /// Add or overwrite a machine, returning it with its new version.
    pub fn insert_machine(&self, mut machine: Metal3Machine) -> Metal3Machine {
        let mut inner = self.lock();
        inner.stamp(&mut machine);
        inner.machines.insert(key_of(&machine), machine.clone());
        machine
    }

    /// Add or overwrite a remediation, returning it with its new version.
    pub fn insert_remediation(&self, mut remediation: Metal3Remediation) -> Metal3Remediation {
        let mut inner = self.lock();
        inner.stamp(&mut remediation);
        inner
            .remediations
            .insert(key_of(&remediation), remediation.clone());
        remediation
    }

    #[must_use]
    pub fn host(&self, namespace: &str, name: &str) -> Option<BareMetalHost> {
        self.lock()
            .hosts
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    #[must_use]
    pub fn remediation(&self, namespace: &str, name: &str) -> Option<Metal3Remediation> {
        self.lock()
            .remediations
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get_host(&self, reference: &HostReference) -> Result<BareMetalHost> {
        self.host(reference.namespace(), reference.name())
            .ok_or_else(|| Error::NotFound(reference.to_string()))
    }

    async fn update_host(&self, host: &BareMetalHost) -> Result<BareMetalHost> {
        let mut inner = self.lock();
        let next = inner.version + 1;
        let updated = swap(&mut inner.hosts, host, next)?;
        inner.version = next;
        Ok(updated)
    }

    async fn get_machine(&self, namespace: &str, name: &str) -> Result<Metal3Machine> {
        self.lock()
            .machines
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{namespace}/{name}")))
    }

    async fn update_remediation(&self, remediation: &Metal3Remediation) -> Result<Metal3Remediation> {
        let mut inner = self.lock();
        let next = inner.version + 1;
        let updated = swap(&mut inner.remediations, remediation, next)?;
        inner.version = next;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{BareMetalHostSpec, Metal3RemediationSpec};

    fn host() -> BareMetalHost {
        let mut host = BareMetalHost::new("myhost", BareMetalHostSpec::default());
        host.metadata.namespace = Some("myns".to_string());
        host
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let store = InMemoryStore::new();
        let stored = store.insert_host(host());
        let before = stored.resource_version();

        let updated = store.update_host(&stored).await.unwrap();
        assert_ne!(updated.resource_version(), before);
        assert_eq!(
            store.host("myns", "myhost").unwrap().resource_version(),
            updated.resource_version()
        );
    }

    #[tokio::test]
    async fn test_stale_update_is_rejected() {
        let store = InMemoryStore::new();
        let stale = store.insert_host(host());
        store.update_host(&stale).await.unwrap();

        let mut changed = stale.clone();
        changed.spec.online = true;
        assert!(matches!(
            store.update_host(&changed).await,
            Err(Error::VersionConflict(_))
        ));
        assert!(!store.host("myns", "myhost").unwrap().spec.online);
    }

    #[tokio::test]
    async fn test_unversioned_update_is_rejected() {
        let store = InMemoryStore::new();
        store.insert_host(host());
        assert!(matches!(
            store.update_host(&host()).await,
            Err(Error::VersionConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_objects_are_not_found() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.update_host(&host()).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            store.get_machine("myns", "nope").await,
            Err(Error::NotFound(name)) if name == "myns/nope"
        ));

        let mut remediation = Metal3Remediation::new("r", Metal3RemediationSpec::default());
        remediation.metadata.namespace = Some("myns".to_string());
        assert!(matches!(
            store.update_remediation(&remediation).await,
            Err(Error::NotFound(_))
        ));
    }
}
