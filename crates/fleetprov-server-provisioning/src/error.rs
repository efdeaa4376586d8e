// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;

use fleetprov_server_operations::StructuredOperationError;
use serde::Serialize;

pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Machine-readable failure reason attached to a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonTag {
	InvalidRequest,
	DutUnreachablePreProvision,
	ProvisioningFailed,
	ProvisioningTimedOut,
	UpdateFirmwareFailed,
}

impl ReasonTag {
	pub fn as_str(self) -> &'static str {
		match self {
			ReasonTag::InvalidRequest => "REASON_INVALID_REQUEST",
			ReasonTag::DutUnreachablePreProvision => "REASON_DUT_UNREACHABLE_PRE_PROVISION",
			ReasonTag::ProvisioningFailed => "REASON_PROVISIONING_FAILED",
			ReasonTag::ProvisioningTimedOut => "REASON_PROVISIONING_TIMEDOUT",
			ReasonTag::UpdateFirmwareFailed => "REASON_UPDATE_FIRMWARE_FAILED",
		}
	}

	/// Transport status code reported alongside the reason.
	pub fn code(self) -> &'static str {
		match self {
			ReasonTag::InvalidRequest => "invalid_argument",
			ReasonTag::DutUnreachablePreProvision => "unavailable",
			ReasonTag::ProvisioningFailed => "internal",
			ReasonTag::ProvisioningTimedOut => "deadline_exceeded",
			ReasonTag::UpdateFirmwareFailed => "failed_precondition",
		}
	}
}

impl fmt::Display for ReasonTag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Errors that end a provisioning workflow.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
	#[error("invalid request: {0}")]
	InvalidRequest(String),

	#[error("DUT unreachable before provisioning: {0}")]
	DutUnreachable(String),

	#[error("{step}: {message}")]
	Failed { step: String, message: String },

	#[error("provisioning timed out during {phase}")]
	TimedOut { phase: String },

	#[error("firmware update failed: {0}")]
	UpdateFirmware(String),
}

impl ProvisionError {
	pub fn failed(step: impl Into<String>, err: impl fmt::Display) -> Self {
		ProvisionError::Failed {
			step: step.into(),
			message: err.to_string(),
		}
	}

	pub fn reason(&self) -> ReasonTag {
		match self {
			ProvisionError::InvalidRequest(_) => ReasonTag::InvalidRequest,
			ProvisionError::DutUnreachable(_) => ReasonTag::DutUnreachablePreProvision,
			ProvisionError::Failed { .. } => ReasonTag::ProvisioningFailed,
			ProvisionError::TimedOut { .. } => ReasonTag::ProvisioningTimedOut,
			ProvisionError::UpdateFirmware(_) => ReasonTag::UpdateFirmwareFailed,
		}
	}
}

impl From<&ProvisionError> for StructuredOperationError {
	fn from(err: &ProvisionError) -> Self {
		let reason = err.reason();
		StructuredOperationError {
			code: reason.code().to_string(),
			message: err.to_string(),
			reason: reason.as_str().to_string(),
		}
	}
}
