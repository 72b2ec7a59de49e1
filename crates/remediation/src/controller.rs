//! Controller runtime wiring for `Metal3Remediation`.

use crate::config::RemediationConfig;
use crate::crds::{Metal3Machine, Metal3Remediation};
use crate::error::{Error, Result};
use crate::reconcile::reconcile_remediation;
use crate::store::{KubeStore, ObjectStore};
use chrono::Utc;
use futures::StreamExt;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config;
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use tracing::{error, info, instrument, Instrument};

/// Shared state handed to every reconciliation.
pub struct Context {
    pub store: Arc<dyn ObjectStore>,
    pub config: Arc<RemediationConfig>,
    pub namespace: String,
}

/// Watch `Metal3Remediation` objects in `namespace` until the watch stream
/// ends.
#[instrument(skip(client, config), fields(namespace = %namespace))]
pub async fn run_remediation_controller(
    client: Client,
    namespace: String,
    config: RemediationConfig,
) -> Result<()> {
    info!("Starting Metal3Remediation controller");

    let context = Arc::new(Context {
        store: Arc::new(KubeStore::new(client.clone())),
        config: Arc::new(config),
        namespace: namespace.clone(),
    });

    let remediations: Api<Metal3Remediation> = Api::namespaced(client.clone(), &namespace);
    let machines: Api<Metal3Machine> = Api::namespaced(client, &namespace);
    let watcher_config = Config::default().any_semantic();
    Controller::new(remediations, watcher_config.clone())
        .watches(machines, watcher_config, remediation_for_machine)
        .run(reconcile, error_policy, context)
        .for_each(|reconciliation_result| {
            let span = tracing::info_span!("remediation_reconciliation_result");
            async move {
                match reconciliation_result {
                    Ok(resource) => {
                        info!(resource = ?resource, "Metal3Remediation reconciliation successful");
                    }
                    Err(reconciliation_err) => {
                        error!(
                            error = ?reconciliation_err,
                            "Metal3Remediation reconciliation error"
                        );
                    }
                }
            }
            .instrument(span)
        })
        .await;

    info!("Metal3Remediation controller shutting down");
    Ok(())
}

/// Map a changed `Metal3Machine` to the remediation named after it, so a
/// fixed host reference triggers a new tick.
fn remediation_for_machine(machine: Metal3Machine) -> Option<ObjectRef<Metal3Remediation>> {
    let namespace = machine.namespace()?;
    Some(ObjectRef::new(&machine.name_any()).within(&namespace))
}

async fn reconcile(remediation: Arc<Metal3Remediation>, ctx: Arc<Context>) -> Result<Action> {
    let mut remediation = (*remediation).clone();
    let outcome =
        reconcile_remediation(&mut remediation, ctx.store.clone(), &ctx.config, Utc::now()).await?;
    Ok(outcome.into())
}

#[instrument(skip(remediation, ctx), fields(name = %remediation.name_any(), namespace = %ctx.namespace))]
fn error_policy(remediation: Arc<Metal3Remediation>, err: &Error, ctx: Arc<Context>) -> Action {
    requeue_for(err, &ctx.config)
}

fn requeue_for(err: &Error, config: &RemediationConfig) -> Action {
    if err.is_retryable() {
        error!(error = %err, requeue = ?config.error_requeue, "Remediation failed, requeueing");
        Action::requeue(config.error_requeue)
    } else {
        error!(error = %err, "Remediation failed and cannot make progress until the object changes");
        Action::await_change()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::Metal3MachineSpec;
    use std::time::Duration;

    #[test]
    fn test_machine_change_maps_to_same_named_remediation() {
        let mut machine = Metal3Machine::new("worker-0", Metal3MachineSpec::default());
        assert!(remediation_for_machine(machine.clone()).is_none());

        machine.metadata.namespace = Some("metal3".to_string());
        let target = remediation_for_machine(machine).unwrap();
        assert_eq!(target.name, "worker-0");
        assert_eq!(target.namespace.as_deref(), Some("metal3"));
    }

    #[test]
    fn test_retryable_errors_back_off() {
        let config = RemediationConfig {
            error_requeue: Duration::from_secs(7),
            ..Default::default()
        };
        let action = requeue_for(&Error::VersionConflict("myns/r".to_string()), &config);
        assert_eq!(
            format!("{action:?}"),
            format!("{:?}", Action::requeue(Duration::from_secs(7)))
        );
    }

    #[test]
    fn test_malformed_reference_waits_for_change() {
        let err = Error::ReferenceMalformed {
            value: "a/b/c".to_string(),
        };
        let action = requeue_for(&err, &RemediationConfig::default());
        assert_eq!(format!("{action:?}"), format!("{:?}", Action::await_change()));
    }
}
