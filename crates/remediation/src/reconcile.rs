//! One reconciliation tick of a remediation episode.
//!
//! ```text
//!   (unset) ──► Running ──reboot──► Waiting ──timeout──► Running ──► ...
//!                  │                   │
//!                  └──── limit ────────┴──► Deleting machine (terminal)
//! ```
//!
//! Every tick reads the current record, does at most one marker write per
//! step and persists the record after the marker it pairs with, so a crash
//! between the two repeats the marker (idempotent) rather than losing it.

use crate::config::RemediationConfig;
use crate::crds::{Metal3Machine, Metal3Remediation, RemediationPhase, REBOOT_REMEDIATION_STRATEGY};
use crate::error::{Error, Result};
use crate::manager::RemediationManager;
use crate::policy::{Readiness, MIN_WAIT};
use crate::store::ObjectStore;
use chrono::{DateTime, Utc};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const MACHINE_KIND: &str = "Metal3Machine";

/// What the controller should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Look at the remediation again after the given delay.
    RequeueAfter(Duration),
    /// Nothing to do until the object changes.
    AwaitChange,
}

impl From<Outcome> for Action {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::RequeueAfter(delay) => Action::requeue(delay),
            Outcome::AwaitChange => Action::await_change(),
        }
    }
}

/// Name of the `Metal3Machine` a remediation is bound to: its owner of that
/// kind, else the machine named like the remediation.
#[must_use]
pub fn binding_name(remediation: &Metal3Remediation) -> String {
    remediation
        .owner_references()
        .iter()
        .find(|owner| owner.kind == MACHINE_KIND)
        .map_or_else(|| remediation.name_any(), |owner| owner.name.clone())
}

async fn fetch_binding(
    store: &dyn ObjectStore,
    remediation: &Metal3Remediation,
) -> Result<Metal3Machine> {
    let namespace = remediation.namespace().unwrap_or_default();
    store.get_machine(&namespace, &binding_name(remediation)).await
}

/// Advance `remediation` by one step at time `now`.
///
/// On success `remediation` holds the last persisted copy. On error it may
/// carry unpersisted changes and should be discarded.
#[instrument(
    skip(remediation, store, config),
    fields(
        name = %remediation.name_any(),
        namespace = %remediation.namespace().unwrap_or_default()
    )
)]
pub async fn reconcile_remediation(
    remediation: &mut Metal3Remediation,
    store: Arc<dyn ObjectStore>,
    config: &RemediationConfig,
    now: DateTime<Utc>,
) -> Result<Outcome> {
    if remediation.metadata.deletion_timestamp.is_some() {
        return finalize(remediation, store).await;
    }

    {
        let mut mgr = RemediationManager::new(remediation).with_store(store.clone());
        if !mgr.has_finalizer() {
            mgr.set_finalizer();
            mgr.persist().await?;
            debug!("Added finalizer");
        }
    }

    let machine = fetch_binding(store.as_ref(), remediation).await?;
    let mut mgr = RemediationManager::new(remediation)
        .with_machine(&machine)
        .with_store(store);

    let (host, _) = mgr.get_unhealthy_host().await?;
    if !RemediationManager::online_status(&host) {
        info!(host = %host.name_any(), "Host is offline, not remediating");
        return Ok(Outcome::RequeueAfter(config.host_recheck));
    }

    if mgr.remediation_type() != REBOOT_REMEDIATION_STRATEGY {
        debug!(
            strategy = mgr.remediation_type(),
            "Unsupported remediation strategy, nothing to do"
        );
        return Ok(Outcome::AwaitChange);
    }

    let timeout = mgr.timeout().unwrap_or(config.default_timeout);

    let phase = match (mgr.remediation_phase(), mgr.raw_phase()) {
        (Some(phase), _) => phase,
        (None, None) => RemediationPhase::Running,
        (None, Some(raw)) => {
            warn!(phase = raw, "Unrecognized remediation phase, restarting from Running");
            RemediationPhase::Running
        }
    };

    match phase {
        RemediationPhase::DeletingMachine => Ok(Outcome::AwaitChange),
        RemediationPhase::Running => {
            if mgr.last_remediated_time().is_some() && mgr.has_reached_retry_limit() {
                escalate(&mut mgr).await
            } else {
                attempt(&mut mgr, timeout, now).await
            }
        }
        RemediationPhase::Waiting => {
            if mgr.last_remediated_time().is_none() {
                warn!("Waiting without a recorded attempt, rebooting now");
                return attempt(&mut mgr, timeout, now).await;
            }
            match mgr.time_to_remediate(timeout, now) {
                Readiness::Wait(remaining) => {
                    debug!(remaining = ?remaining, "Timeout not yet elapsed");
                    Ok(Outcome::RequeueAfter(remaining))
                }
                Readiness::Ready if mgr.has_reached_retry_limit() => escalate(&mut mgr).await,
                Readiness::Ready => {
                    mgr.set_remediation_phase(RemediationPhase::Running);
                    attempt(&mut mgr, timeout, now).await
                }
            }
        }
    }
}

async fn attempt(
    mgr: &mut RemediationManager<'_>,
    timeout: Duration,
    now: DateTime<Utc>,
) -> Result<Outcome> {
    mgr.set_reboot_annotation().await?;

    mgr.set_last_remediation_time(now);
    mgr.increase_retry_count();
    mgr.set_remediation_phase(RemediationPhase::Waiting);
    mgr.persist().await?;

    info!(retry_count = mgr.retry_count(), "Requested host reboot");
    Ok(Outcome::RequeueAfter(timeout.max(MIN_WAIT)))
}

async fn escalate(mgr: &mut RemediationManager<'_>) -> Result<Outcome> {
    mgr.set_unhealthy_annotation().await?;

    mgr.set_remediation_phase(RemediationPhase::DeletingMachine);
    mgr.persist().await?;

    info!(
        retry_count = mgr.retry_count(),
        "Retries exhausted, marked host unhealthy"
    );
    Ok(Outcome::AwaitChange)
}

/// Clear the reboot marker and release the finalizer.
async fn finalize(
    remediation: &mut Metal3Remediation,
    store: Arc<dyn ObjectStore>,
) -> Result<Outcome> {
    if !RemediationManager::new(remediation).has_finalizer() {
        return Ok(Outcome::AwaitChange);
    }

    match fetch_binding(store.as_ref(), remediation).await {
        Ok(machine) => {
            let mgr = RemediationManager::new(remediation)
                .with_machine(&machine)
                .with_store(store.clone());
            match mgr.clear_reboot_annotation().await {
                Ok(()) => {}
                Err(
                    err @ (Error::NotFound(_)
                    | Error::ReferenceMissing { .. }
                    | Error::ReferenceMalformed { .. }
                    | Error::PreconditionFailed { .. }),
                ) => warn!(error = %err, "Skipping reboot marker cleanup"),
                Err(err) => return Err(err),
            }
        }
        Err(Error::NotFound(machine)) => {
            warn!(machine = %machine, "Bound machine is gone, skipping reboot marker cleanup");
        }
        Err(err) => return Err(err),
    }

    let mut mgr = RemediationManager::new(remediation).with_store(store);
    mgr.unset_finalizer();
    mgr.persist().await?;
    info!("Released finalizer");
    Ok(Outcome::AwaitChange)
}
