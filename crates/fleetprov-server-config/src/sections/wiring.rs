// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Device address resolution and artifact cache settings.
//!
//! Either `base_url` points at a wiring service, or `hosts` maps device
//! names to addresses directly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WiringConfigLayer {
	pub base_url: Option<String>,
	pub hosts: Option<HashMap<String, String>>,
	pub advertise_host: Option<String>,
	pub cache_base: Option<String>,
	pub task_id: Option<String>,
	pub build_id: Option<String>,
}

impl WiringConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.base_url.is_some() {
			self.base_url = other.base_url;
		}
		if let Some(hosts) = other.hosts {
			self.hosts.get_or_insert_with(HashMap::new).extend(hosts);
		}
		if other.advertise_host.is_some() {
			self.advertise_host = other.advertise_host;
		}
		if other.cache_base.is_some() {
			self.cache_base = other.cache_base;
		}
		if other.task_id.is_some() {
			self.task_id = other.task_id;
		}
		if other.build_id.is_some() {
			self.build_id = other.build_id;
		}
	}

	pub fn finalize(self) -> WiringConfig {
		WiringConfig {
			base_url: self.base_url,
			hosts: self.hosts.unwrap_or_default(),
			advertise_host: self.advertise_host.unwrap_or_else(|| "127.0.0.1".to_string()),
			cache_base: self.cache_base,
			task_id: self.task_id,
			build_id: self.build_id,
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WiringConfig {
	pub base_url: Option<String>,
	pub hosts: HashMap<String, String>,
	/// Address handed out for ports exposed from this host.
	pub advertise_host: String,
	pub cache_base: Option<String>,
	pub task_id: Option<String>,
	pub build_id: Option<String>,
}

impl WiringConfig {
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.base_url.is_none() && self.hosts.is_empty() {
			return Err(ConfigError::Validation(
				"wiring requires either base_url or at least one entry in hosts".to_string(),
			));
		}
		if let Some(url) = &self.base_url {
			if !url.starts_with("http://") && !url.starts_with("https://") {
				return Err(ConfigError::InvalidValue {
					key: "wiring.base_url".to_string(),
					message: format!("expected an http(s) URL, got '{url}'"),
				});
			}
		}
		Ok(())
	}
}
