use thiserror::Error;

/// Errors surfaced by remediation operations.
///
/// None of these are retried internally. The reconcile loop requeues on
/// everything except [`Error::ReferenceMalformed`].
#[derive(Error, Debug)]
pub enum Error {
    /// A collaborator the operation needs was not provided.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The machine carries no host reference annotation.
    #[error("Host reference annotation '{annotation}' is missing or empty on {binding}")]
    ReferenceMissing { annotation: String, binding: String },

    /// The host reference annotation is not in `namespace/name` form.
    #[error("Host reference '{value}' is not in namespace/name form")]
    ReferenceMalformed { value: String },

    /// The referenced object does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The marker key was never declared on the host.
    #[error("Marker '{key}' is not declared on host {host}")]
    PreconditionFailed { key: String, host: String },

    /// The object changed since it was read.
    #[error("Version conflict while updating {0}")]
    VersionConflict(String),

    /// Kubernetes API error other than not-found and conflict.
    #[error("Kubernetes error: {0}")]
    Kube(#[source] kube::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Whether requeueing the reconciliation can make progress.
    ///
    /// A malformed host reference needs an operator to fix the machine
    /// annotation, so retrying it would only spin.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::ReferenceMalformed { .. })
    }

    /// Map a kube API error for `object`, keeping not-found and conflicts
    /// distinguishable from transport failures.
    pub(crate) fn from_kube(err: kube::Error, object: &str) -> Self {
        match err {
            kube::Error::Api(response) if response.code == 404 => {
                Error::NotFound(object.to_string())
            }
            kube::Error::Api(response) if response.code == 409 => {
                Error::VersionConflict(object.to_string())
            }
            other => Error::Kube(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: "test".to_string(),
            code,
        })
    }

    #[test]
    fn test_only_malformed_reference_is_permanent() {
        assert!(!Error::ReferenceMalformed {
            value: "a/b/c".to_string()
        }
        .is_retryable());

        assert!(Error::NotFound("ns/host".to_string()).is_retryable());
        assert!(Error::VersionConflict("ns/host".to_string()).is_retryable());
        assert!(Error::Configuration("no store".to_string()).is_retryable());
        assert!(Error::ReferenceMissing {
            annotation: "metal3.io/BareMetalHost".to_string(),
            binding: "ns/machine".to_string(),
        }
        .is_retryable());
        assert!(Error::PreconditionFailed {
            key: "reboot.metal3.io".to_string(),
            host: "ns/host".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn test_kube_status_codes_are_classified() {
        assert!(matches!(
            Error::from_kube(api_error(404), "ns/host"),
            Error::NotFound(name) if name == "ns/host"
        ));
        assert!(matches!(
            Error::from_kube(api_error(409), "ns/host"),
            Error::VersionConflict(_)
        ));
        assert!(matches!(
            Error::from_kube(api_error(500), "ns/host"),
            Error::Kube(_)
        ));
    }
}
