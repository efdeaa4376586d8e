// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SSH transport configuration section.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SshConfigLayer {
	pub user: Option<String>,
	pub port: Option<u16>,
	pub identity_file: Option<PathBuf>,
	pub connect_timeout_secs: Option<u64>,
	pub control_dir: Option<PathBuf>,
	pub control_persist_secs: Option<u64>,
	pub strict_host_key_checking: Option<bool>,
}

impl SshConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.user.is_some() {
			self.user = other.user;
		}
		if other.port.is_some() {
			self.port = other.port;
		}
		if other.identity_file.is_some() {
			self.identity_file = other.identity_file;
		}
		if other.connect_timeout_secs.is_some() {
			self.connect_timeout_secs = other.connect_timeout_secs;
		}
		if other.control_dir.is_some() {
			self.control_dir = other.control_dir;
		}
		if other.control_persist_secs.is_some() {
			self.control_persist_secs = other.control_persist_secs;
		}
		if other.strict_host_key_checking.is_some() {
			self.strict_host_key_checking = other.strict_host_key_checking;
		}
	}

	pub fn finalize(self) -> SshConfig {
		SshConfig {
			user: self.user.unwrap_or_else(|| "root".to_string()),
			port: self.port.unwrap_or(22),
			identity_file: self.identity_file,
			connect_timeout: Duration::from_secs(self.connect_timeout_secs.unwrap_or(10)),
			control_dir: self
				.control_dir
				.unwrap_or_else(|| std::env::temp_dir().join("fleetprov-ssh")),
			control_persist: Duration::from_secs(self.control_persist_secs.unwrap_or(60)),
			strict_host_key_checking: self.strict_host_key_checking.unwrap_or(false),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct SshConfig {
	pub user: String,
	pub port: u16,
	pub identity_file: Option<PathBuf>,
	pub connect_timeout: Duration,
	pub control_dir: PathBuf,
	pub control_persist: Duration,
	pub strict_host_key_checking: bool,
}

impl Default for SshConfig {
	fn default() -> Self {
		SshConfigLayer::default().finalize()
	}
}
