// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Device provisioning for fleetprov.
//!
//! A provisioning request is validated and admitted by
//! [`ProvisioningService`], which allocates an operation and runs the
//! workflow as a detached task. The workflow drives a
//! [`ProvisioningSession`] through connect, OS install or stateful repair,
//! firmware, DLC and miniOS phases, and deposits either a result or a
//! structured error tagged with a [`ReasonTag`].

pub mod device;
pub mod error;
pub mod firmware;
pub mod lacros;
pub mod request;
pub mod service;
pub mod session;
pub mod timeouts;
pub mod workflow;

pub use error::{ProvisionError, ReasonTag, Result};
pub use lacros::{provision_lacros, LacrosOutcome};
pub use request::{DlcSpec, ImagePath, LacrosRequest, ProvisionFlags, ProvisionRequest};
pub use service::ProvisioningService;
pub use session::{should_install_os, CurrentPhase, ProvisioningSession};
pub use timeouts::ProvisionTimeouts;
pub use workflow::{provision, ProvisionOutcome};
