// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};

/// A build in image storage, `gs://<bucket>/<builder path>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePath {
	pub bucket: String,
	pub builder_path: String,
}

impl ImagePath {
	pub fn parse(path: &str) -> Result<Self> {
		if path.is_empty() {
			return Err(ProvisionError::InvalidRequest("image path is empty".to_string()));
		}
		let rest = path.strip_prefix("gs://").ok_or_else(|| {
			ProvisionError::InvalidRequest(format!("image path {path:?} is not a gs:// URL"))
		})?;
		let (bucket, builder_path) = rest.split_once('/').ok_or_else(|| {
			ProvisionError::InvalidRequest(format!("image path {path:?} has no builder path"))
		})?;
		let builder_path = builder_path.trim_matches('/');
		if bucket.is_empty() || builder_path.is_empty() {
			return Err(ProvisionError::InvalidRequest(format!(
				"image path {path:?} must name a bucket and a builder path"
			)));
		}
		Ok(Self {
			bucket: bucket.to_string(),
			builder_path: builder_path.to_string(),
		})
	}

	pub fn url(&self) -> String {
		format!("gs://{}/{}", self.bucket, self.builder_path)
	}

	/// URL of a named artifact inside this build.
	pub fn artifact(&self, name: &str) -> String {
		format!("{}/{}", self.url(), name)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlcSpec {
	pub id: String,
}

/// Behaviour flags copied into a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionFlags {
	pub preserve_stateful: bool,
	pub prevent_reboot: bool,
	pub update_firmware: bool,
	pub force: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
	pub dut_name: String,
	#[serde(default)]
	pub port: Option<u16>,
	pub image_path: String,
	#[serde(default)]
	pub preserve_stateful: bool,
	#[serde(default)]
	pub prevent_reboot: bool,
	#[serde(default)]
	pub update_firmware: bool,
	/// Reinstall even if the device already runs the requested build.
	#[serde(default)]
	pub force: bool,
	#[serde(default)]
	pub dlc_specs: Vec<DlcSpec>,
}

impl ProvisionRequest {
	/// Admission checks that need no device access.
	pub fn validate(&self) -> Result<ImagePath> {
		validate_dut_name(&self.dut_name)?;
		let image = ImagePath::parse(&self.image_path)?;
		for spec in &self.dlc_specs {
			if spec.id.is_empty()
				|| !spec
					.id
					.chars()
					.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
			{
				return Err(ProvisionError::InvalidRequest(format!(
					"invalid DLC id {:?}",
					spec.id
				)));
			}
		}
		Ok(image)
	}

	pub fn flags(&self) -> ProvisionFlags {
		ProvisionFlags {
			preserve_stateful: self.preserve_stateful,
			prevent_reboot: self.prevent_reboot,
			update_firmware: self.update_firmware,
			force: self.force,
		}
	}
}

/// Request to install a Lacros browser component from `image_path`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LacrosRequest {
	pub dut_name: String,
	#[serde(default)]
	pub port: Option<u16>,
	pub image_path: String,
}

impl LacrosRequest {
	pub fn validate(&self) -> Result<ImagePath> {
		validate_dut_name(&self.dut_name)?;
		ImagePath::parse(&self.image_path)
	}
}

fn validate_dut_name(name: &str) -> Result<()> {
	if name.trim().is_empty() {
		return Err(ProvisionError::InvalidRequest("dut name is empty".to_string()));
	}
	Ok(())
}
