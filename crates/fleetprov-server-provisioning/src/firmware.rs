// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use tracing::{info, instrument, warn};

use crate::device;
use crate::error::{ProvisionError, Result};
use crate::session::ProvisioningSession;

/// Firmware version the installed OS ships for this device's model.
async fn expected_version(session: &ProvisioningSession) -> std::result::Result<String, String> {
	let hwid = session
		.run_output(device::HARDWARE_ID)
		.await
		.map_err(|e| format!("reading hwid: {e}"))?;
	let model = device::model_from_hwid(&hwid).ok_or_else(|| format!("no model in hwid {hwid:?}"))?;
	let manifest = session
		.run_output(&format!("{} --manifest", device::FIRMWARE_UPDATER))
		.await
		.map_err(|e| format!("reading firmware manifest: {e}"))?;
	device::firmware_version_from_manifest(&manifest, &model)
		.ok_or_else(|| format!("firmware manifest has no entry for model {model}"))
}

async fn current_version(session: &ProvisioningSession) -> Result<String> {
	session
		.run_output(device::FIRMWARE_ID)
		.await
		.map(|v| v.trim().to_string())
		.map_err(|e| ProvisionError::UpdateFirmware(format!("reading current firmware: {e}")))
}

/// Run the on-device firmware updater when requested and present.
///
/// Skipped silently when the updater binary is missing. A manifest that
/// cannot be read only disables the post-update version check.
#[instrument(skip(session), fields(dut = %session.dut_name()))]
pub async fn update_firmware(session: &mut ProvisioningSession) -> Result<()> {
	if !session.flags().update_firmware {
		return Ok(());
	}
	let present = session
		.test(&device::is_executable(device::FIRMWARE_UPDATER))
		.await
		.map_err(|e| ProvisionError::UpdateFirmware(e.to_string()))?;
	if !present {
		info!("no firmware updater on device, skipping firmware update");
		return Ok(());
	}

	let expected = expected_version(session).await;
	let before = current_version(session).await?;
	let changed = match &expected {
		Ok(version) => *version != before,
		Err(_) => true,
	};

	info!(current = %before, "running firmware updater");
	session
		.run(&format!("{} --mode=autoupdate", device::FIRMWARE_UPDATER))
		.await
		.map_err(|e| ProvisionError::UpdateFirmware(e.to_string()))?;

	let prevent_reboot = session.flags().prevent_reboot;
	if changed && !prevent_reboot {
		session.reboot("reconnect after firmware update").await?;
	}
	if prevent_reboot {
		return Ok(());
	}

	match expected {
		Ok(expected) => {
			let current = current_version(session).await?;
			if current != expected {
				return Err(ProvisionError::UpdateFirmware(format!(
					"device runs firmware {current}, OS image ships {expected}"
				)));
			}
			info!(firmware = %current, "firmware matches OS image");
		}
		Err(e) => warn!(error = %e, "skipping firmware version check"),
	}
	Ok(())
}
