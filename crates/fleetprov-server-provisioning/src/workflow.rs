// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The OS provisioning workflow.
//!
//! Phases run strictly in order and the first fatal error ends the run,
//! leaving the provision-failed marker on the device. A phase is refused
//! unless its longest wait still fits before the outer deadline.

use std::time::Duration;

use fleetprov_server_wiring::Resolver;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::device;
use crate::error::{ProvisionError, Result};
use crate::firmware;
use crate::request::DlcSpec;
use crate::session::{should_install_os, ProvisioningSession};

/// Success payload deposited into the operation registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionOutcome {
	pub dut_name: String,
	pub builder_path: String,
	pub installed_os: bool,
	pub repaired_stateful: bool,
	pub boot_id: Option<String>,
}

/// Drive the device to the requested build.
#[instrument(skip_all, fields(dut = %session.dut_name(), image = %session.image().url()))]
pub async fn provision(
	session: &mut ProvisioningSession,
	resolver: &dyn Resolver,
	dlc_specs: &[DlcSpec],
) -> Result<ProvisionOutcome> {
	let initial = session.timeouts().initial_connect;
	session
		.connect_within(initial)
		.await
		.map_err(|e| ProvisionError::DutUnreachable(e.to_string()))?;
	info!("connected");

	session
		.run(&device::touch(device::PROVISION_FAILED_MARKER))
		.await
		.map_err(|e| ProvisionError::failed("write provision marker", e))?;

	session.check_deadline("virtualization check", Duration::ZERO)?;
	check_virtualization(session).await?;

	session.check_deadline("install decision", Duration::ZERO)?;
	let install = decide_install(session).await?;
	session.set_should_install(install);

	let mut repaired = false;
	if install {
		install_os(session, resolver).await?;
	} else if needs_stateful_repair(session).await? {
		repair_stateful(session, resolver).await?;
		repaired = true;
	} else {
		info!("device already runs the requested build");
	}

	session.check_deadline("DLC provisioning", Duration::ZERO)?;
	for spec in dlc_specs {
		provision_dlc(session, resolver, spec).await?;
	}

	session.check_deadline("miniOS provisioning", Duration::ZERO)?;
	if let Err(e) = provision_minios(session, resolver).await {
		warn!(error = %e, "miniOS provisioning failed, continuing");
	}

	if let Err(e) = session.run(&device::remove(device::PROVISION_FAILED_MARKER)).await {
		warn!(error = %e, "failed to remove provision marker");
	}
	let boot_id = match session.boot_id().await {
		Ok(id) => {
			info!(boot_id = %id, "provisioning complete");
			Some(id)
		}
		Err(e) => {
			warn!(error = %e, "could not read boot id");
			None
		}
	};

	Ok(ProvisionOutcome {
		dut_name: session.dut_name().to_string(),
		builder_path: session.image().builder_path.clone(),
		installed_os: install,
		repaired_stateful: repaired,
		boot_id,
	})
}

async fn check_virtualization(session: &ProvisioningSession) -> Result<()> {
	let enabled = session
		.test(device::VIRTUALIZATION_CHECK)
		.await
		.map_err(|e| ProvisionError::failed("virtualization check", e))?;
	if !enabled {
		return Err(ProvisionError::failed(
			"virtualization check",
			"hardware virtualization is not enabled",
		));
	}
	Ok(())
}

async fn decide_install(session: &ProvisioningSession) -> Result<bool> {
	let step = "install decision";
	let current = session
		.builder_path()
		.await
		.map_err(|e| ProvisionError::failed(step, e))?;
	let force_marker = session
		.test(&device::exists(device::FORCE_PROVISION_MARKER))
		.await
		.map_err(|e| ProvisionError::failed(step, e))?;
	let target = &session.image().builder_path;
	let install = should_install_os(
		current.as_deref(),
		target,
		force_marker,
		session.flags().force,
	);
	info!(
		current = current.as_deref().unwrap_or("<none>"),
		target = %target,
		force_marker,
		install,
		"install decision"
	);
	Ok(install)
}

async fn needs_stateful_repair(session: &ProvisioningSession) -> Result<bool> {
	let step = "stateful check";
	let corrupt = session
		.test(&device::exists(device::CORRUPT_STATEFUL_MARKER))
		.await
		.map_err(|e| ProvisionError::failed(step, e))?;
	if corrupt {
		info!("stateful partition marked corrupt");
		return Ok(true);
	}
	let stateful = session
		.output(&device::cat(device::STATEFUL_BUILDER_PATH))
		.await
		.map_err(|e| ProvisionError::failed(step, e))?;
	let recorded = stateful.stdout_lossy();
	let matches = stateful.success() && recorded.trim() == session.image().builder_path;
	if !matches {
		info!(recorded = %recorded.trim(), "stateful payload does not match the OS build");
	}
	Ok(!matches)
}

#[instrument(skip_all)]
async fn install_os(session: &mut ProvisioningSession, resolver: &dyn Resolver) -> Result<()> {
	session.check_deadline("OS install", Duration::ZERO)?;
	let booted = current_kernel(session, "OS install").await?;
	info!(disk = %booted.0, partition = booted.1, "installing OS");
	session.set_booted_kernel(booted);
	let payload = resolver
		.cache_artifact(&session.image().url(), session.dut_name())
		.await
		.map_err(|e| ProvisionError::failed("OS install", e))?;
	session
		.run(&device::install_os(&session.image().builder_path, &payload))
		.await
		.map_err(|e| ProvisionError::failed("OS install", e))?;

	// The new OS only runs after this reboot, so prevent_reboot does not apply.
	session.reboot("reconnect after OS install").await?;

	let timeouts = *session.timeouts();
	session.check_deadline("UI stabilization", timeouts.ui_stabilize)?;
	wait_for_stable_ui(session).await?;

	session.check_deadline("firmware update", Duration::ZERO)?;
	firmware::update_firmware(session).await?;

	session.check_deadline("kernel stickiness", timeouts.kernel_stickiness)?;
	verify_kernel_sticky(session).await?;

	session.check_deadline("stateful provisioning", Duration::ZERO)?;
	provision_stateful(session, resolver).await?;

	if !session.flags().prevent_reboot {
		session.check_deadline("verification", timeouts.verify)?;
		verify_installed_build(session).await?;
	}
	Ok(())
}

#[instrument(skip_all)]
async fn repair_stateful(session: &mut ProvisioningSession, resolver: &dyn Resolver) -> Result<()> {
	let flags = session.flags();
	if !flags.preserve_stateful && !flags.prevent_reboot {
		session.check_deadline("stateful wipe", Duration::ZERO)?;
		info!("wiping stateful partition");
		session
			.run(&device::write_file(device::FACTORY_RESET_FILE, "fast safe"))
			.await
			.map_err(|e| ProvisionError::failed("stateful wipe", e))?;
		session.reboot("reconnect after stateful wipe").await?;
		// The wipe takes the marker with it.
		session
			.run(&device::touch(device::PROVISION_FAILED_MARKER))
			.await
			.map_err(|e| ProvisionError::failed("write provision marker", e))?;
	}

	session.check_deadline("stateful provisioning", Duration::ZERO)?;
	provision_stateful(session, resolver).await
}

/// Wait until system services report running twice in a row on the same
/// boot. Devices may reboot on their own after an install.
async fn wait_for_stable_ui(session: &mut ProvisioningSession) -> Result<()> {
	let step = "UI stabilization";
	let window = session.timeouts().ui_stabilize;
	let poll = session.timeouts().poll_interval;
	let until = Instant::now() + window;
	let mut ready_on: Option<String> = None;

	loop {
		if !session.is_connected() {
			let left = until.saturating_duration_since(Instant::now());
			if let Err(e) = session.connect_within(left).await {
				return Err(ProvisionError::failed(step, format!("reconnect failed: {e}")));
			}
		}

		match session.output(device::SYSTEM_SERVICES_STATUS).await {
			Ok(out) if out.success() && out.stdout_lossy().contains("start/running") => {
				match session.boot_id().await {
					Ok(boot) if ready_on.as_deref() == Some(boot.as_str()) => {
						info!("system services stable");
						return Ok(());
					}
					Ok(boot) => ready_on = Some(boot),
					Err(_) => session.disconnect(),
				}
			}
			Ok(_) => ready_on = None,
			Err(e) if e.is_connection_error() => {
				ready_on = None;
				session.disconnect();
			}
			Err(_) => ready_on = None,
		}

		if Instant::now() + poll >= until {
			return Err(ProvisionError::failed(
				step,
				format!("system services did not stabilize within {window:?}"),
			));
		}
		tokio::time::sleep(poll).await;
	}
}

/// Disk and kernel partition paired with the running root partition.
async fn current_kernel(session: &ProvisioningSession, step: &str) -> Result<(String, u32)> {
	let root = session
		.run_output(device::ROOT_DEVICE)
		.await
		.map_err(|e| ProvisionError::failed(step, e))?;
	device::kernel_partition_for_root(&root)
		.ok_or_else(|| ProvisionError::failed(step, format!("unexpected root device {:?}", root.trim())))
}

/// Confirm the device keeps running the freshly installed kernel slot, and
/// that the slot stays marked successful, for the whole stickiness window.
/// Booting the pre-install slot again means the firmware rolled the update
/// back.
async fn verify_kernel_sticky(session: &ProvisioningSession) -> Result<()> {
	let step = "kernel stickiness";
	let window = session.timeouts().kernel_stickiness;
	let poll = session.timeouts().poll_interval;
	let until = Instant::now() + window;
	let mut marked: Option<u32> = None;
	loop {
		let (disk, partition) = current_kernel(session, step).await?;
		if let Some((_, previous)) = session.booted_kernel() {
			if *previous == partition {
				return Err(ProvisionError::failed(
					step,
					format!("device rolled back to kernel partition {partition}"),
				));
			}
		}
		if let Some(seen) = marked.filter(|seen| *seen != partition) {
			return Err(ProvisionError::failed(
				step,
				format!("device moved from kernel partition {seen} to {partition}"),
			));
		}

		let flag = session
			.run_output(&device::kernel_successful(&disk, partition))
			.await
			.map_err(|e| ProvisionError::failed(step, e))?;
		match (flag.trim() == "1", marked) {
			(true, None) => {
				info!(%disk, partition, "kernel marked successful");
				marked = Some(partition);
			}
			(true, Some(_)) => {}
			(false, Some(_)) => {
				return Err(ProvisionError::failed(
					step,
					format!("kernel partition {partition} lost its successful mark"),
				));
			}
			(false, None) => {}
		}

		if Instant::now() + poll >= until {
			return match marked {
				Some(partition) => {
					info!(partition, ?window, "kernel stayed active");
					Ok(())
				}
				None => Err(ProvisionError::failed(
					step,
					format!("kernel partition {partition} not marked successful within {window:?}"),
				)),
			};
		}
		tokio::time::sleep(poll).await;
	}
}

#[instrument(skip_all)]
async fn provision_stateful(session: &mut ProvisioningSession, resolver: &dyn Resolver) -> Result<()> {
	let step = "stateful provisioning";
	info!("provisioning stateful partition");
	let payload = resolver
		.cache_artifact(&session.image().artifact("stateful.tgz"), session.dut_name())
		.await
		.map_err(|e| ProvisionError::failed(step, e))?;
	session
		.run(&device::install_stateful(&payload))
		.await
		.map_err(|e| ProvisionError::failed(step, e))?;
	session
		.run(&device::write_file(
			device::STATEFUL_BUILDER_PATH,
			&session.image().builder_path,
		))
		.await
		.map_err(|e| ProvisionError::failed(step, e))?;

	if !session.flags().prevent_reboot {
		session.reboot("reconnect after stateful provisioning").await?;
	}
	Ok(())
}

/// Confirm the device reports the requested build, reconnecting through
/// any late reboots.
async fn verify_installed_build(session: &mut ProvisioningSession) -> Result<()> {
	let step = "verification";
	let window = session.timeouts().verify;
	let poll = session.timeouts().poll_interval;
	let until = Instant::now() + window;
	let target = session.image().builder_path.clone();
	let mut last_seen = None;

	loop {
		if !session.is_connected() {
			let left = until.saturating_duration_since(Instant::now());
			if let Err(e) = session.connect_within(left).await {
				return Err(ProvisionError::failed(step, format!("reconnect failed: {e}")));
			}
		}
		match session.builder_path().await {
			Ok(Some(current)) if current == target => {
				info!(builder_path = %current, "installed build verified");
				return Ok(());
			}
			Ok(current) => last_seen = current,
			Err(e) if e.is_connection_error() => session.disconnect(),
			Err(e) => warn!(error = %e, "reading installed build failed"),
		}
		if Instant::now() + poll >= until {
			return Err(ProvisionError::failed(
				step,
				format!(
					"device reports {}, expected {target}",
					last_seen.as_deref().unwrap_or("no build")
				),
			));
		}
		tokio::time::sleep(poll).await;
	}
}

async fn provision_dlc(
	session: &ProvisioningSession,
	resolver: &dyn Resolver,
	spec: &DlcSpec,
) -> Result<()> {
	let step = format!("DLC {}", spec.id);
	info!(dlc = %spec.id, "provisioning DLC");
	let url = resolver
		.cache_artifact(
			&session.image().artifact(&format!("dlc/{}/package/dlc.img", spec.id)),
			session.dut_name(),
		)
		.await
		.map_err(|e| ProvisionError::failed(&step, e))?;
	let dest = format!("{}/{}/package/dlc.img", device::DLC_IMAGE_DIR, spec.id);
	session
		.run(&device::download(&url, &dest))
		.await
		.map_err(|e| ProvisionError::failed(&step, e))?;
	session
		.run(&format!("dlcservice_util --deploy --id={}", spec.id))
		.await
		.map_err(|e| ProvisionError::failed(&step, e))?;
	Ok(())
}

/// Write the recovery image to both miniOS partitions, if the disk has them.
async fn provision_minios(session: &ProvisioningSession, resolver: &dyn Resolver) -> Result<()> {
	let step = "miniOS provisioning";
	let disk = session
		.run_output(device::ROOT_DISK)
		.await
		.map_err(|e| ProvisionError::failed(step, e))?;
	let disk = disk.trim();
	let supported = session
		.test(&device::find_partition(disk, device::MINIOS_PARTITIONS[0].0))
		.await
		.map_err(|e| ProvisionError::failed(step, e))?;
	if !supported {
		info!("device has no miniOS partitions");
		return Ok(());
	}

	let url = resolver
		.cache_artifact(
			&session.image().artifact("full_dev_part_MINIOS.bin.gz"),
			session.dut_name(),
		)
		.await
		.map_err(|e| ProvisionError::failed(step, e))?;
	for (label, number) in device::MINIOS_PARTITIONS {
		let target = device::partition_device(disk, number);
		session
			.run(&device::write_partition(&url, &target))
			.await
			.map_err(|e| ProvisionError::failed(format!("{step} ({label})"), e))?;
	}
	info!("miniOS partitions updated");
	Ok(())
}
