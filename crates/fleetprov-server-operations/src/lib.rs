// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Long-running operation registry for fleetprov.
//!
//! Every admitted provisioning request is tracked as an [`Operation`]. The
//! workflow task deposits exactly one terminal result or
//! [`StructuredOperationError`]; pollers read snapshots or wait for the
//! terminal state. Terminal operations are garbage-collected by
//! [`RetentionCleaner`] after the configured retention period.

pub mod cleanup;
pub mod error;
pub mod store;
pub mod types;

pub use cleanup::RetentionCleaner;
pub use error::{OperationError, Result};
pub use store::OperationStore;
pub use types::{Operation, OperationCounts, OperationState, StructuredOperationError};
