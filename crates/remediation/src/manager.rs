//! Remediation manager: the primitives the reconcile loop composes.
//!
//! Wraps one `Metal3Remediation` (mutably), optionally the `Metal3Machine` it
//! is bound to and the object store. Record mutators only touch memory;
//! persisting the remediation is the caller's job. Host operations need both
//! the machine and the store and fail with `Error::Configuration` otherwise.

use crate::crds::{
    BareMetalHost, Metal3Machine, Metal3Remediation, RemediationPhase, RemediationStrategy,
    REMEDIATION_FINALIZER,
};
use crate::error::{Error, Result};
use crate::markers::{self, Marker, MarkerSignal};
use crate::policy::{self, Readiness};
use crate::resolver::{HostPatchHelper, HostResolver};
use crate::store::ObjectStore;
use chrono::{DateTime, Utc};
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct RemediationManager<'a> {
    remediation: &'a mut Metal3Remediation,
    machine: Option<&'a Metal3Machine>,
    store: Option<Arc<dyn ObjectStore>>,
    /// Set when `set_finalizer` had to create the finalizer list.
    created_finalizers: bool,
}

impl<'a> RemediationManager<'a> {
    #[must_use]
    pub fn new(remediation: &'a mut Metal3Remediation) -> Self {
        Self {
            remediation,
            machine: None,
            store: None,
            created_finalizers: false,
        }
    }

    #[must_use]
    pub fn with_machine(mut self, machine: &'a Metal3Machine) -> Self {
        self.machine = Some(machine);
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn remediation(&self) -> &Metal3Remediation {
        self.remediation
    }

    // Finalizer

    pub fn set_finalizer(&mut self) {
        if self.remediation.metadata.finalizers.is_none() {
            self.created_finalizers = true;
        }
        let finalizers = self.remediation.finalizers_mut();
        if !finalizers.iter().any(|f| f == REMEDIATION_FINALIZER) {
            finalizers.push(REMEDIATION_FINALIZER.to_string());
        }
    }

    /// Remove the finalizer. The list is dropped only if this manager
    /// created it; an existing empty list is kept.
    pub fn unset_finalizer(&mut self) {
        if let Some(finalizers) = self.remediation.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != REMEDIATION_FINALIZER);
            if finalizers.is_empty() && self.created_finalizers {
                self.remediation.metadata.finalizers = None;
                self.created_finalizers = false;
            }
        }
    }

    #[must_use]
    pub fn has_finalizer(&self) -> bool {
        self.remediation
            .finalizers()
            .iter()
            .any(|f| f == REMEDIATION_FINALIZER)
    }

    // Strategy and retry policy

    fn strategy(&self) -> Option<&RemediationStrategy> {
        self.remediation.spec.strategy.as_ref()
    }

    /// Configured strategy kind, empty when no strategy is set.
    #[must_use]
    pub fn remediation_type(&self) -> &str {
        self.strategy().map_or("", |s| s.kind.as_str())
    }

    #[must_use]
    pub fn retry_limit_is_set(&self) -> bool {
        policy::retry_limit_is_set(self.strategy())
    }

    #[must_use]
    pub fn has_reached_retry_limit(&self) -> bool {
        policy::has_reached_retry_limit(self.strategy(), self.retry_count())
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        policy::timeout(self.strategy())
    }

    #[must_use]
    pub fn time_to_remediate(&self, timeout: Duration, now: DateTime<Utc>) -> Readiness {
        policy::time_to_remediate(self.last_remediated_time(), timeout, now)
    }

    // Status

    /// Current phase, `None` when unset or not one of the known literals.
    /// A corrupted value is reported, not repaired.
    #[must_use]
    pub fn remediation_phase(&self) -> Option<RemediationPhase> {
        self.remediation
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .and_then(RemediationPhase::parse)
    }

    /// Raw stored phase, including values `remediation_phase` does not
    /// recognize.
    #[must_use]
    pub fn raw_phase(&self) -> Option<&str> {
        self.remediation
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
    }

    pub fn set_remediation_phase(&mut self, phase: RemediationPhase) {
        self.remediation.status.get_or_insert_with(Default::default).phase =
            Some(phase.as_str().to_string());
    }

    #[must_use]
    pub fn last_remediated_time(&self) -> Option<DateTime<Utc>> {
        self.remediation
            .status
            .as_ref()
            .and_then(|s| s.last_remediated)
    }

    pub fn set_last_remediation_time(&mut self, time: DateTime<Utc>) {
        self.remediation
            .status
            .get_or_insert_with(Default::default)
            .last_remediated = Some(time);
    }

    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.remediation
            .status
            .as_ref()
            .map_or(0, |s| s.retry_count)
    }

    pub fn increase_retry_count(&mut self) {
        let status = self.remediation.status.get_or_insert_with(Default::default);
        status.retry_count = status.retry_count.saturating_add(1);
    }

    /// Write the remediation back and adopt the stored copy, so the next
    /// write carries the new resource version.
    pub async fn persist(&mut self) -> Result<()> {
        let updated = self.store()?.update_remediation(self.remediation).await?;
        *self.remediation = updated;
        Ok(())
    }

    // Host

    #[must_use]
    pub fn online_status(host: &BareMetalHost) -> bool {
        markers::online_status(host)
    }

    fn store(&self) -> Result<&dyn ObjectStore> {
        self.store.as_deref().ok_or_else(|| {
            Error::Configuration(format!(
                "no object store configured for remediation {}",
                self.remediation.name_any()
            ))
        })
    }

    fn host_collaborators(&self) -> Result<(&Metal3Machine, &dyn ObjectStore)> {
        let store = self.store()?;
        let machine = self.machine.ok_or_else(|| {
            Error::Configuration(format!(
                "no Metal3Machine bound to remediation {}",
                self.remediation.name_any()
            ))
        })?;
        Ok((machine, store))
    }

    /// Resolve the host behind the bound machine.
    pub async fn get_unhealthy_host(&self) -> Result<(BareMetalHost, HostPatchHelper)> {
        let (machine, store) = self.host_collaborators()?;
        HostResolver::new(store).resolve(machine).await
    }

    pub async fn set_unhealthy_annotation(&self) -> Result<()> {
        self.signal(MarkerSignal::raise(Marker::Unhealthy)).await
    }

    pub async fn set_reboot_annotation(&self) -> Result<()> {
        self.signal(MarkerSignal::raise(Marker::Reboot)).await
    }

    pub async fn clear_reboot_annotation(&self) -> Result<()> {
        self.signal(MarkerSignal::clear(Marker::Reboot)).await
    }

    /// Resolve the host, apply `signal` and write it back as a
    /// compare-and-swap. Nothing is written when the marker is already in
    /// the requested state.
    pub async fn signal(&self, signal: MarkerSignal) -> Result<()> {
        let (_, store) = self.host_collaborators()?;
        let (mut host, helper) = self.get_unhealthy_host().await?;

        if !signal.apply(&mut host)? {
            debug!(
                host = %helper.reference(),
                marker = signal.marker.annotation_key(),
                "Marker already in requested state"
            );
            return Ok(());
        }

        helper.patch(store, host).await?;
        info!(
            host = %helper.reference(),
            marker = signal.marker.annotation_key(),
            state = ?signal.state,
            "Updated host marker"
        );
        Ok(())
    }
}
