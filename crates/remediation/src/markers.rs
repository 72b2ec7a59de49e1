//! Marker annotations on the bare metal host.
//!
//! The controller never talks to the bare metal operator directly. It raises
//! and clears well-known annotations on the `BareMetalHost` and the operator
//! reacts to them. The operator declares which markers it understands by
//! creating the keys with empty values; writing a marker that was never
//! declared is rejected.

use crate::crds::BareMetalHost;
use crate::error::{Error, Result};
use kube::ResourceExt;

/// Tells the operator the host failed remediation and must not be reused.
pub const UNHEALTHY_ANNOTATION: &str = "capi.metal3.io/unhealthy";

/// Asks the operator for a one-shot reboot.
pub const REBOOT_ANNOTATION: &str = "reboot.metal3.io";

/// Kinds of marker the controller can signal with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    Unhealthy,
    Reboot,
}

impl Marker {
    #[must_use]
    pub const fn annotation_key(self) -> &'static str {
        match self {
            Marker::Unhealthy => UNHEALTHY_ANNOTATION,
            Marker::Reboot => REBOOT_ANNOTATION,
        }
    }

    const fn raised_value(self) -> &'static str {
        match self {
            Marker::Unhealthy => "capi",
            Marker::Reboot => "capi-remediation",
        }
    }
}

/// Whether a declared marker is currently raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    Present,
    Absent,
}

/// A request to move one marker into a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerSignal {
    pub marker: Marker,
    pub state: MarkerState,
}

impl MarkerSignal {
    #[must_use]
    pub const fn raise(marker: Marker) -> Self {
        Self {
            marker,
            state: MarkerState::Present,
        }
    }

    #[must_use]
    pub const fn clear(marker: Marker) -> Self {
        Self {
            marker,
            state: MarkerState::Absent,
        }
    }

    /// Apply the signal to `host` in memory.
    ///
    /// Returns whether the annotations changed, so callers can skip the write
    /// when the marker was already in the requested state. Fails without
    /// touching the host when the key is not declared.
    pub fn apply(&self, host: &mut BareMetalHost) -> Result<bool> {
        let key = self.marker.annotation_key();
        let host_name = host_key(host);

        let Some(value) = host
            .metadata
            .annotations
            .as_mut()
            .and_then(|annotations| annotations.get_mut(key))
        else {
            return Err(Error::PreconditionFailed {
                key: key.to_string(),
                host: host_name,
            });
        };

        let desired = match self.state {
            MarkerState::Present => self.marker.raised_value(),
            MarkerState::Absent => "",
        };
        if value.as_str() == desired {
            return Ok(false);
        }
        *value = desired.to_string();
        Ok(true)
    }
}

/// Read a marker back. `None` means the operator never declared it.
#[must_use]
pub fn marker_state(host: &BareMetalHost, marker: Marker) -> Option<MarkerState> {
    host.annotations()
        .get(marker.annotation_key())
        .map(|value| {
            if value.is_empty() {
                MarkerState::Absent
            } else {
                MarkerState::Present
            }
        })
}

/// Desired power state of the host.
#[must_use]
pub fn online_status(host: &BareMetalHost) -> bool {
    host.spec.online
}

pub(crate) fn host_key(host: &BareMetalHost) -> String {
    format!(
        "{}/{}",
        host.namespace().unwrap_or_default(),
        host.name_any()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::BareMetalHostSpec;
    use std::collections::BTreeMap;

    fn host_with(annotations: &[(&str, &str)]) -> BareMetalHost {
        let mut host = BareMetalHost::new("myhost", BareMetalHostSpec::default());
        host.metadata.namespace = Some("myns".to_string());
        if !annotations.is_empty() {
            host.metadata.annotations = Some(
                annotations
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect::<BTreeMap<_, _>>(),
            );
        }
        host
    }

    #[test]
    fn test_raise_declared_marker() {
        let mut host = host_with(&[(REBOOT_ANNOTATION, "")]);
        assert_eq!(marker_state(&host, Marker::Reboot), Some(MarkerState::Absent));

        let changed = MarkerSignal::raise(Marker::Reboot).apply(&mut host).unwrap();
        assert!(changed);
        assert_eq!(marker_state(&host, Marker::Reboot), Some(MarkerState::Present));
    }

    #[test]
    fn test_raise_is_idempotent() {
        let mut host = host_with(&[(UNHEALTHY_ANNOTATION, "")]);
        let signal = MarkerSignal::raise(Marker::Unhealthy);

        assert!(signal.apply(&mut host).unwrap());
        assert!(!signal.apply(&mut host).unwrap());
        assert_eq!(
            marker_state(&host, Marker::Unhealthy),
            Some(MarkerState::Present)
        );
    }

    #[test]
    fn test_undeclared_marker_is_rejected_and_host_untouched() {
        let mut host = host_with(&[(UNHEALTHY_ANNOTATION, "")]);
        let before = host.metadata.annotations.clone();

        let err = MarkerSignal::raise(Marker::Reboot)
            .apply(&mut host)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::PreconditionFailed { ref key, ref host } if key == REBOOT_ANNOTATION && host == "myns/myhost"
        ));
        assert_eq!(host.metadata.annotations, before);
    }

    #[test]
    fn test_no_annotations_at_all_is_rejected() {
        let mut host = host_with(&[]);
        assert!(MarkerSignal::raise(Marker::Unhealthy)
            .apply(&mut host)
            .is_err());
        assert_eq!(marker_state(&host, Marker::Unhealthy), None);
        assert!(host.metadata.annotations.is_none());
    }

    #[test]
    fn test_clear_keeps_declaration() {
        let mut host = host_with(&[(REBOOT_ANNOTATION, "capi-remediation")]);

        assert!(MarkerSignal::clear(Marker::Reboot).apply(&mut host).unwrap());
        assert_eq!(marker_state(&host, Marker::Reboot), Some(MarkerState::Absent));
        assert!(host.annotations().contains_key(REBOOT_ANNOTATION));

        assert!(!MarkerSignal::clear(Marker::Reboot).apply(&mut host).unwrap());
    }

    #[test]
    fn test_markers_are_independent() {
        let mut host = host_with(&[(REBOOT_ANNOTATION, ""), (UNHEALTHY_ANNOTATION, "")]);

        MarkerSignal::raise(Marker::Unhealthy)
            .apply(&mut host)
            .unwrap();
        assert_eq!(marker_state(&host, Marker::Reboot), Some(MarkerState::Absent));
        assert_eq!(
            marker_state(&host, Marker::Unhealthy),
            Some(MarkerState::Present)
        );
    }

    #[test]
    fn test_online_status() {
        let mut host = host_with(&[]);
        assert!(!online_status(&host));
        host.spec.online = true;
        assert!(online_status(&host));
    }
}
