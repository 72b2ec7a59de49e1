//! Object store seam.
//!
//! Everything the remediation core reads or writes goes through
//! [`ObjectStore`]. Updates are compare-and-swap on the object's
//! `metadata.resourceVersion`; a stale version fails with
//! `Error::VersionConflict` and is never silently overwritten.

mod kubernetes;
mod memory;

pub use self::kubernetes::KubeStore;
pub use self::memory::InMemoryStore;

use crate::crds::{BareMetalHost, Metal3Machine, Metal3Remediation};
use crate::error::Result;
use crate::resolver::HostReference;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a host by reference.
    async fn get_host(&self, reference: &HostReference) -> Result<BareMetalHost>;

    /// Replace a host, expecting the resource version it carries.
    async fn update_host(&self, host: &BareMetalHost) -> Result<BareMetalHost>;

    /// Fetch the machine a remediation is bound to.
    async fn get_machine(&self, namespace: &str, name: &str) -> Result<Metal3Machine>;

    /// Persist a remediation's metadata and status, expecting the resource
    /// version it carries.
    async fn update_remediation(&self, remediation: &Metal3Remediation) -> Result<Metal3Remediation>;
}
