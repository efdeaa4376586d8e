// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fake update origin process settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FakeOriginConfigLayer {
	pub binary: Option<PathBuf>,
	pub runtime_root: Option<PathBuf>,
	pub bind_host: Option<String>,
	pub startup_timeout_secs: Option<u64>,
}

impl FakeOriginConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.binary.is_some() {
			self.binary = other.binary;
		}
		if other.runtime_root.is_some() {
			self.runtime_root = other.runtime_root;
		}
		if other.bind_host.is_some() {
			self.bind_host = other.bind_host;
		}
		if other.startup_timeout_secs.is_some() {
			self.startup_timeout_secs = other.startup_timeout_secs;
		}
	}

	pub fn finalize(self) -> FakeOriginConfig {
		FakeOriginConfig {
			binary: self
				.binary
				.unwrap_or_else(|| PathBuf::from("/usr/local/bin/fake-update-origin")),
			runtime_root: self
				.runtime_root
				.unwrap_or_else(|| std::env::temp_dir().join("fleetprov-fake-origin")),
			bind_host: self.bind_host.unwrap_or_else(|| "127.0.0.1".to_string()),
			startup_timeout: Duration::from_secs(self.startup_timeout_secs.unwrap_or(30)),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeOriginConfig {
	pub binary: PathBuf,
	pub runtime_root: PathBuf,
	pub bind_host: String,
	pub startup_timeout: Duration,
}

impl Default for FakeOriginConfig {
	fn default() -> Self {
		FakeOriginConfigLayer::default().finalize()
	}
}
