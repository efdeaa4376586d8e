// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

use crate::client::RemoteExitStatus;

/// Result type alias for remote shell operations.
pub type Result<T> = std::result::Result<T, SshError>;

/// Errors that can occur while talking to a device over SSH.
#[derive(Error, Debug)]
pub enum SshError {
	#[error("failed to connect to {address}: {message}")]
	Connect { address: String, message: String },

	#[error("invalid device address: {0}")]
	InvalidAddress(String),

	#[error("failed to spawn ssh: {0}")]
	Spawn(#[source] std::io::Error),

	#[error("command {command:?} exited with {status}: {stderr}")]
	CommandFailed {
		command: String,
		status: RemoteExitStatus,
		stderr: String,
	},

	#[error("command {command:?} timed out")]
	Timeout { command: String },

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

impl SshError {
	/// Whether the error indicates the device could not be reached at all,
	/// as opposed to a command running and failing.
	pub fn is_connection_error(&self) -> bool {
		matches!(
			self,
			SshError::Connect { .. } | SshError::Spawn(_) | SshError::Timeout { .. }
		)
	}
}
