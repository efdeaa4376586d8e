// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecConfigLayer {
	pub chunk_size: Option<usize>,
}

impl ExecConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.chunk_size.is_some() {
			self.chunk_size = other.chunk_size;
		}
	}

	pub fn finalize(self) -> ExecConfig {
		ExecConfig {
			chunk_size: self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecConfig {
	/// Maximum bytes per streamed output message.
	pub chunk_size: usize,
}

impl Default for ExecConfig {
	fn default() -> Self {
		ExecConfigLayer::default().finalize()
	}
}

impl ExecConfig {
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.chunk_size == 0 {
			return Err(ConfigError::Validation(
				"exec.chunk_size must be greater than zero".to_string(),
			));
		}
		Ok(())
	}
}
