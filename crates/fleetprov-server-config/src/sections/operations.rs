// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Long-running operation retention.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OperationsConfigLayer {
	pub retention_secs: Option<u64>,
	pub cleanup_interval_secs: Option<u64>,
	pub max_wait_secs: Option<u64>,
}

impl OperationsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.retention_secs.is_some() {
			self.retention_secs = other.retention_secs;
		}
		if other.cleanup_interval_secs.is_some() {
			self.cleanup_interval_secs = other.cleanup_interval_secs;
		}
		if other.max_wait_secs.is_some() {
			self.max_wait_secs = other.max_wait_secs;
		}
	}

	pub fn finalize(self) -> OperationsConfig {
		OperationsConfig {
			retention: Duration::from_secs(self.retention_secs.unwrap_or(24 * 60 * 60)),
			cleanup_interval: Duration::from_secs(self.cleanup_interval_secs.unwrap_or(5 * 60)),
			max_wait: Duration::from_secs(self.max_wait_secs.unwrap_or(10 * 60)),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationsConfig {
	/// How long finished operations stay queryable.
	pub retention: Duration,
	pub cleanup_interval: Duration,
	/// Upper bound a caller may request on a blocking wait.
	pub max_wait: Duration,
}

impl Default for OperationsConfig {
	fn default() -> Self {
		OperationsConfigLayer::default().finalize()
	}
}
