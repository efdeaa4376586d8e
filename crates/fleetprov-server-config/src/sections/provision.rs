// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Provisioning workflow time limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProvisionConfigLayer {
	pub overall_timeout_secs: Option<u64>,
	pub initial_connect_timeout_secs: Option<u64>,
	pub reboot_reconnect_timeout_secs: Option<u64>,
	pub ui_stabilize_timeout_secs: Option<u64>,
	pub kernel_stickiness_timeout_secs: Option<u64>,
	pub verify_timeout_secs: Option<u64>,
	pub poll_interval_ms: Option<u64>,
}

impl ProvisionConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.overall_timeout_secs.is_some() {
			self.overall_timeout_secs = other.overall_timeout_secs;
		}
		if other.initial_connect_timeout_secs.is_some() {
			self.initial_connect_timeout_secs = other.initial_connect_timeout_secs;
		}
		if other.reboot_reconnect_timeout_secs.is_some() {
			self.reboot_reconnect_timeout_secs = other.reboot_reconnect_timeout_secs;
		}
		if other.ui_stabilize_timeout_secs.is_some() {
			self.ui_stabilize_timeout_secs = other.ui_stabilize_timeout_secs;
		}
		if other.kernel_stickiness_timeout_secs.is_some() {
			self.kernel_stickiness_timeout_secs = other.kernel_stickiness_timeout_secs;
		}
		if other.verify_timeout_secs.is_some() {
			self.verify_timeout_secs = other.verify_timeout_secs;
		}
		if other.poll_interval_ms.is_some() {
			self.poll_interval_ms = other.poll_interval_ms;
		}
	}

	pub fn finalize(self) -> ProvisionConfig {
		ProvisionConfig {
			overall_timeout: Duration::from_secs(self.overall_timeout_secs.unwrap_or(3600)),
			initial_connect_timeout: Duration::from_secs(
				self.initial_connect_timeout_secs.unwrap_or(120),
			),
			reboot_reconnect_timeout: Duration::from_secs(
				self.reboot_reconnect_timeout_secs.unwrap_or(600),
			),
			ui_stabilize_timeout: Duration::from_secs(self.ui_stabilize_timeout_secs.unwrap_or(300)),
			// 2 x 45s kernel confirmation delay + 10s
			kernel_stickiness_timeout: Duration::from_secs(
				self.kernel_stickiness_timeout_secs.unwrap_or(100),
			),
			verify_timeout: Duration::from_secs(self.verify_timeout_secs.unwrap_or(300)),
			poll_interval: Duration::from_millis(self.poll_interval_ms.unwrap_or(2000)),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionConfig {
	pub overall_timeout: Duration,
	pub initial_connect_timeout: Duration,
	pub reboot_reconnect_timeout: Duration,
	pub ui_stabilize_timeout: Duration,
	pub kernel_stickiness_timeout: Duration,
	pub verify_timeout: Duration,
	pub poll_interval: Duration,
}

impl Default for ProvisionConfig {
	fn default() -> Self {
		ProvisionConfigLayer::default().finalize()
	}
}

impl ProvisionConfig {
	/// Every sub-wait must fit inside the outer deadline.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let subs = [
			("initial_connect_timeout_secs", self.initial_connect_timeout),
			("reboot_reconnect_timeout_secs", self.reboot_reconnect_timeout),
			("ui_stabilize_timeout_secs", self.ui_stabilize_timeout),
			("kernel_stickiness_timeout_secs", self.kernel_stickiness_timeout),
			("verify_timeout_secs", self.verify_timeout),
		];
		for (key, value) in subs {
			if value >= self.overall_timeout {
				return Err(ConfigError::Validation(format!(
					"provision.{key} ({}s) must be shorter than provision.overall_timeout_secs ({}s)",
					value.as_secs(),
					self.overall_timeout.as_secs()
				)));
			}
		}
		if self.poll_interval.is_zero() {
			return Err(ConfigError::Validation(
				"provision.poll_interval_ms must be greater than zero".to_string(),
			));
		}
		Ok(())
	}
}
