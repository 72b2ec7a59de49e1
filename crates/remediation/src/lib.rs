/*
 * 5D Labs Agent Platform - Bare Metal Remediation
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Bare metal host remediation.
//!
//! Decides whether, when and how many times an unhealthy bare metal host is
//! rebooted, and when remediation gives up and asks for the machine to be
//! replaced.
//!
//! ## Architecture
//!
//! ```text
//!  Metal3Remediation ──owner──► Metal3Machine ──annotation──► BareMetalHost
//!   (phase, retries)             (host reference)              (online, markers)
//!         │                                                         ▲
//!         ▼                                                         │
//!   ┌───────────┐   ┌──────────┐   ┌──────────┐   ┌─────────┐       │
//!   │ reconcile │──►│ manager  │──►│ resolver │──►│ markers │───────┘
//!   └───────────┘   └──────────┘   └──────────┘   └─────────┘
//!         │               │
//!         ▼               ▼
//!     policy         ObjectStore (kube or in-memory)
//! ```
//!
//! The reboot itself is carried out by the bare metal operator, which watches
//! for the reboot marker on the host. This crate only raises and clears
//! markers, measures time and persists the remediation status.
//!
//! ## Example
//!
//! ```ignore
//! use remediation::{reconcile_remediation, InMemoryStore, RemediationConfig};
//!
//! let store = Arc::new(InMemoryStore::new());
//! let outcome = reconcile_remediation(&mut remediation, store, &RemediationConfig::default(), Utc::now()).await?;
//! ```

pub mod config;
pub mod controller;
pub mod crds;
pub mod duration;
pub mod error;
pub mod manager;
pub mod markers;
pub mod policy;
pub mod reconcile;
pub mod resolver;
pub mod store;

pub use config::RemediationConfig;
pub use controller::{run_remediation_controller, Context};
pub use crds::{
    BareMetalHost, BareMetalHostSpec, Metal3Machine, Metal3MachineSpec, Metal3Remediation,
    Metal3RemediationSpec, Metal3RemediationStatus, RemediationPhase, RemediationStrategy,
};
pub use error::{Error, Result};
pub use manager::RemediationManager;
pub use markers::{Marker, MarkerSignal, MarkerState};
pub use policy::Readiness;
pub use reconcile::{reconcile_remediation, Outcome};
pub use resolver::{HostPatchHelper, HostReference, HostResolver};
pub use store::{InMemoryStore, KubeStore, ObjectStore};
