// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP facade for the fleet provisioning control plane.
//!
//! Admits provisioning requests as long-running operations, streams remote
//! command output, and manages fake update-origin servers.

pub mod api;
pub mod error;
pub mod exec;
pub mod routes;
pub mod version;

pub use api::{create_app_state, create_router, AppState};
pub use error::{ErrorResponse, ServerError};
pub use exec::{stream_exec, ExecEvent, ExecExit};
