// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

/// Platform minimum delay before a newly booted kernel is marked good.
const KERNEL_CONFIRM_DELAY: Duration = Duration::from_secs(45);

/// Time limits for each bounded wait in a provisioning workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionTimeouts {
	/// Outer deadline for the whole workflow.
	pub overall: Duration,
	pub initial_connect: Duration,
	/// Window for the device to come back after each reboot.
	pub reboot_reconnect: Duration,
	pub ui_stabilize: Duration,
	pub kernel_stickiness: Duration,
	pub verify: Duration,
	pub poll_interval: Duration,
	/// Bound on the best-effort marker write after the outer deadline fires.
	pub timeout_marker: Duration,
}

impl Default for ProvisionTimeouts {
	fn default() -> Self {
		Self {
			overall: Duration::from_secs(60 * 60),
			initial_connect: Duration::from_secs(2 * 60),
			reboot_reconnect: Duration::from_secs(10 * 60),
			ui_stabilize: Duration::from_secs(5 * 60),
			kernel_stickiness: KERNEL_CONFIRM_DELAY * 2 + Duration::from_secs(10),
			verify: Duration::from_secs(5 * 60),
			poll_interval: Duration::from_secs(2),
			timeout_marker: Duration::from_secs(30),
		}
	}
}
