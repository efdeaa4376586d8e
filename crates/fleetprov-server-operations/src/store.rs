// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{OperationError, Result};
use crate::types::{Operation, OperationCounts, OperationState, StructuredOperationError};

const NAME_PREFIX: &str = "operations/";

struct Entry {
	tx: watch::Sender<Operation>,
	finished_at: Option<Instant>,
}

/// In-memory operation registry.
///
/// Each operation is held in a `watch` channel so waiters are woken on the
/// terminal write without polling.
#[derive(Default)]
pub struct OperationStore {
	entries: RwLock<HashMap<String, Entry>>,
}

impl OperationStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Allocate a new pending operation and return its name.
	pub fn new_operation(&self, metadata: Option<serde_json::Value>) -> String {
		let name = format!("{NAME_PREFIX}{}", Uuid::new_v4());
		let (tx, _) = watch::channel(Operation::new(name.clone(), metadata));
		self.entries.write().insert(
			name.clone(),
			Entry {
				tx,
				finished_at: None,
			},
		);
		debug!(operation = %name, "operation created");
		name
	}

	pub fn mark_running(&self, name: &str) -> Result<()> {
		self.transition(name, |op| {
			op.state = OperationState::Running;
		})
	}

	/// Deposit a success payload. Fails if the operation is already terminal.
	#[instrument(skip(self, payload))]
	pub fn set_result(&self, name: &str, payload: serde_json::Value) -> Result<()> {
		self.transition(name, |op| {
			op.state = OperationState::Succeeded;
			op.done = true;
			op.result = Some(payload);
		})?;
		info!(operation = %name, "operation succeeded");
		Ok(())
	}

	/// Deposit a structured error. Fails if the operation is already terminal.
	#[instrument(skip(self, error), fields(reason = %error.reason))]
	pub fn set_error(&self, name: &str, error: StructuredOperationError) -> Result<()> {
		self.transition(name, |op| {
			op.state = OperationState::Failed;
			op.done = true;
			op.error = Some(error);
		})?;
		info!(operation = %name, "operation failed");
		Ok(())
	}

	fn transition(&self, name: &str, apply: impl FnOnce(&mut Operation)) -> Result<()> {
		let mut entries = self.entries.write();
		let entry = entries
			.get_mut(name)
			.ok_or_else(|| OperationError::NotFound(name.to_string()))?;

		let state = entry.tx.borrow().state;
		if state.is_terminal() {
			warn!(operation = %name, %state, "rejecting write to terminal operation");
			return Err(OperationError::AlreadyDone {
				name: name.to_string(),
				state,
			});
		}

		let mut terminal = false;
		entry.tx.send_modify(|op| {
			apply(op);
			op.updated_at = Utc::now();
			terminal = op.state.is_terminal();
		});
		if terminal {
			entry.finished_at = Some(Instant::now());
		}
		Ok(())
	}

	pub fn get(&self, name: &str) -> Result<Operation> {
		self.entries
			.read()
			.get(name)
			.map(|e| e.tx.borrow().clone())
			.ok_or_else(|| OperationError::NotFound(name.to_string()))
	}

	/// Wait until the operation is terminal or `timeout` elapses, then return
	/// the latest snapshot either way.
	#[instrument(skip(self))]
	pub async fn wait(&self, name: &str, timeout: Duration) -> Result<Operation> {
		let mut rx = self
			.entries
			.read()
			.get(name)
			.map(|e| e.tx.subscribe())
			.ok_or_else(|| OperationError::NotFound(name.to_string()))?;

		let waited = tokio::time::timeout(timeout, async {
			rx.wait_for(|op| op.state.is_terminal())
				.await
				.map(|op| op.clone())
		})
		.await;

		match waited {
			Ok(Ok(op)) => Ok(op),
			// Sender dropped: the operation was collected while we waited.
			Ok(Err(_)) => Err(OperationError::NotFound(name.to_string())),
			Err(_) => Ok(rx.borrow().clone()),
		}
	}

	/// Remove terminal operations that finished more than `retention` ago.
	pub fn cleanup_expired(&self, retention: Duration) -> usize {
		let now = Instant::now();
		let mut entries = self.entries.write();
		let before = entries.len();
		entries.retain(|_, e| match e.finished_at {
			Some(finished) => now.duration_since(finished) < retention,
			None => true,
		});
		before - entries.len()
	}

	pub fn counts(&self) -> OperationCounts {
		let entries = self.entries.read();
		let mut counts = OperationCounts::default();
		for entry in entries.values() {
			match entry.tx.borrow().state {
				OperationState::Pending => counts.pending += 1,
				OperationState::Running => counts.running += 1,
				OperationState::Succeeded => counts.succeeded += 1,
				OperationState::Failed => counts.failed += 1,
			}
		}
		counts
	}

	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}
}
