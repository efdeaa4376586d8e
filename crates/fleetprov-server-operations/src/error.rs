// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

use crate::types::OperationState;

pub type Result<T> = std::result::Result<T, OperationError>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum OperationError {
	#[error("operation not found: {0}")]
	NotFound(String),

	#[error("operation {name} is already {state}")]
	AlreadyDone { name: String, state: OperationState },
}
