// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResourceError>;

#[derive(Error, Debug)]
pub enum ResourceError {
	#[error("resource already exists: {0}")]
	AlreadyExists(String),

	#[error("resource not found: {0}")]
	NotFound(String),

	#[error("invalid request: {0}")]
	InvalidRequest(String),

	#[error("failed to close resource {name}: {message}")]
	Close { name: String, message: String },

	#[error("failed to start fake origin server: {0}")]
	Spawn(#[source] std::io::Error),

	#[error("fake origin server did not report a listening port within {0:?}")]
	StartupTimeout(std::time::Duration),

	#[error("fake origin server exited before listening")]
	EarlyExit,

	#[error("wiring error: {0}")]
	Wiring(#[from] fleetprov_server_wiring::WiringError),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}
