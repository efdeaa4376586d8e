// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of an operation. `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
	Pending,
	Running,
	Succeeded,
	Failed,
}

impl OperationState {
	pub fn is_terminal(self) -> bool {
		matches!(self, OperationState::Succeeded | OperationState::Failed)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			OperationState::Pending => "pending",
			OperationState::Running => "running",
			OperationState::Succeeded => "succeeded",
			OperationState::Failed => "failed",
		}
	}
}

impl fmt::Display for OperationState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Terminal failure deposited by a workflow.
///
/// `code` is the transport status code, `reason` the machine-readable tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredOperationError {
	pub code: String,
	pub message: String,
	pub reason: String,
}

/// Snapshot of an operation as seen by pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
	pub name: String,
	pub state: OperationState,
	pub done: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub metadata: Option<serde_json::Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<serde_json::Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<StructuredOperationError>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Operation {
	pub(crate) fn new(name: String, metadata: Option<serde_json::Value>) -> Self {
		let now = Utc::now();
		Self {
			name,
			state: OperationState::Pending,
			done: false,
			metadata,
			result: None,
			error: None,
			created_at: now,
			updated_at: now,
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCounts {
	pub pending: usize,
	pub running: usize,
	pub succeeded: usize,
	pub failed: usize,
}

impl OperationCounts {
	pub fn in_flight(&self) -> usize {
		self.pending + self.running
	}
}
