// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lacros browser component provisioning.
//!
//! Installs a Lacros image as an image-loader component: the compressed
//! squashfs goes into `<component dir>/<version>/` next to a manifest, and
//! `latest-version` points image-loader at it.

use std::time::Duration;

use fleetprov_server_wiring::Resolver;
use serde::Serialize;
use tracing::{info, instrument};

use crate::device;
use crate::error::{ProvisionError, Result};
use crate::session::ProvisioningSession;

const METADATA_FILE: &str = "metadata.json";
const IMAGE_FILE: &str = "lacros_compressed.squash";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LacrosOutcome {
	pub dut_name: String,
	pub version: String,
}

/// Version string from a Lacros `metadata.json`.
pub fn parse_lacros_version(metadata: &str) -> Option<String> {
	let value: serde_json::Value = serde_json::from_str(metadata).ok()?;
	value
		.get("content")?
		.get("version")?
		.as_str()
		.map(str::trim)
		.filter(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit() || c == '.'))
		.map(str::to_string)
}

/// Image-loader manifest for a Lacros component.
pub fn lacros_manifest(version: &str, image_sha256: &str) -> String {
	serde_json::json!({
		"manifest-version": 2,
		"fs-type": "squashfs",
		"version": version,
		"image-sha256-hash": image_sha256,
		"is-removable": true,
	})
	.to_string()
}

#[instrument(skip_all, fields(dut = %session.dut_name(), image = %session.image().url()))]
pub async fn provision_lacros(
	session: &mut ProvisioningSession,
	resolver: &dyn Resolver,
) -> Result<LacrosOutcome> {
	let initial = session.timeouts().initial_connect;
	session
		.connect_within(initial)
		.await
		.map_err(|e| ProvisionError::failed("connect", e))?;

	session.check_deadline("Lacros metadata", Duration::ZERO)?;
	let metadata_url = resolver
		.cache_artifact(&session.image().artifact(METADATA_FILE), session.dut_name())
		.await
		.map_err(|e| ProvisionError::failed("Lacros metadata", e))?;
	let metadata = session
		.run_output(&format!("curl -fsS --retry 3 {}", fleetprov_common_ssh::shell_quote(&metadata_url)))
		.await
		.map_err(|e| ProvisionError::failed("Lacros metadata", e))?;
	let version = parse_lacros_version(&metadata).ok_or_else(|| {
		ProvisionError::failed("Lacros metadata", "metadata.json has no usable content.version")
	})?;
	info!(%version, "installing Lacros");

	session.check_deadline("Lacros image download", Duration::ZERO)?;
	let step = "Lacros image download";
	let component_dir = format!("{}/{}", device::LACROS_COMPONENT_DIR, version);
	let image_dest = format!("{component_dir}/image.squash");
	let image_url = resolver
		.cache_artifact(&session.image().artifact(IMAGE_FILE), session.dut_name())
		.await
		.map_err(|e| ProvisionError::failed(step, e))?;
	session
		.run(&device::download(&image_url, &image_dest))
		.await
		.map_err(|e| ProvisionError::failed(step, e))?;

	session.check_deadline("Lacros manifest", Duration::ZERO)?;
	let step = "Lacros manifest";
	let hash = session
		.run_output(&format!("sha256sum {image_dest} | cut -d' ' -f1"))
		.await
		.map_err(|e| ProvisionError::failed(step, e))?;
	let hash = hash.trim();
	if hash.len() != 64 {
		return Err(ProvisionError::failed(step, format!("unexpected sha256 output {hash:?}")));
	}
	session
		.run(&device::write_file(
			&format!("{component_dir}/imageloader.json"),
			&lacros_manifest(&version, hash),
		))
		.await
		.map_err(|e| ProvisionError::failed(step, e))?;
	session
		.run(&device::write_file(
			&format!("{}/latest-version", device::LACROS_COMPONENT_DIR),
			&version,
		))
		.await
		.map_err(|e| ProvisionError::failed(step, e))?;

	session
		.run(&format!("test -s {image_dest}"))
		.await
		.map_err(|e| ProvisionError::failed("Lacros verification", e))?;

	info!(%version, "Lacros installed");
	Ok(LacrosOutcome {
		dut_name: session.dut_name().to_string(),
		version,
	})
}
