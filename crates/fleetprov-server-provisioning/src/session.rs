// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use fleetprov_common_ssh::{
	CommandOutput, ConnectionPool, PooledConnection, RemoteShell, SshClient, SshError,
};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::device;
use crate::error::{ProvisionError, Result};
use crate::request::{ImagePath, ProvisionFlags};
use crate::timeouts::ProvisionTimeouts;

/// Whether the OS image must be (re)installed.
pub fn should_install_os(
	current_builder_path: Option<&str>,
	target_builder_path: &str,
	force_marker_present: bool,
	force_flag: bool,
) -> bool {
	force_flag || force_marker_present || current_builder_path != Some(target_builder_path)
}

/// Name of the phase a session is in. Clones share the value, so the task
/// that owns a workflow can still name its phase after cancelling it.
#[derive(Debug, Clone)]
pub struct CurrentPhase(Arc<Mutex<String>>);

impl CurrentPhase {
	fn new(phase: &str) -> Self {
		Self(Arc::new(Mutex::new(phase.to_string())))
	}

	pub fn get(&self) -> String {
		self.0.lock().clone()
	}

	fn set(&self, phase: &str) {
		*self.0.lock() = phase.to_string();
	}
}

/// Per-operation provisioning state.
///
/// Owns at most one pooled connection at a time. Reconnecting drops the
/// current checkout before taking a new one, and dropping the session
/// returns whatever it holds to the pool.
pub struct ProvisioningSession {
	pool: Arc<dyn ConnectionPool>,
	dut_name: String,
	address: String,
	image: ImagePath,
	flags: ProvisionFlags,
	timeouts: ProvisionTimeouts,
	deadline: Instant,
	conn: Option<PooledConnection>,
	should_install: Option<bool>,
	reboots: u32,
	phase: CurrentPhase,
	booted_kernel: Option<(String, u32)>,
}

impl ProvisioningSession {
	pub fn new(
		pool: Arc<dyn ConnectionPool>,
		dut_name: impl Into<String>,
		address: impl Into<String>,
		image: ImagePath,
		flags: ProvisionFlags,
		timeouts: ProvisionTimeouts,
	) -> Self {
		Self {
			pool,
			dut_name: dut_name.into(),
			address: address.into(),
			image,
			flags,
			deadline: Instant::now() + timeouts.overall,
			timeouts,
			conn: None,
			should_install: None,
			reboots: 0,
			phase: CurrentPhase::new("connect"),
			booted_kernel: None,
		}
	}

	pub fn dut_name(&self) -> &str {
		&self.dut_name
	}

	pub fn image(&self) -> &ImagePath {
		&self.image
	}

	pub fn flags(&self) -> ProvisionFlags {
		self.flags
	}

	pub fn timeouts(&self) -> &ProvisionTimeouts {
		&self.timeouts
	}

	pub fn should_install(&self) -> Option<bool> {
		self.should_install
	}

	pub(crate) fn set_should_install(&mut self, decision: bool) {
		self.should_install = Some(decision);
	}

	/// Reboot commands issued by this session.
	pub fn reboots(&self) -> u32 {
		self.reboots
	}

	/// Shared handle on the phase name.
	pub fn current_phase(&self) -> CurrentPhase {
		self.phase.clone()
	}

	pub fn enter_phase(&self, phase: &str) {
		self.phase.set(phase);
	}

	/// Kernel partition the device booted from before the OS install.
	pub fn booted_kernel(&self) -> Option<&(String, u32)> {
		self.booted_kernel.as_ref()
	}

	pub(crate) fn set_booted_kernel(&mut self, kernel: (String, u32)) {
		self.booted_kernel = Some(kernel);
	}

	pub fn is_connected(&self) -> bool {
		self.conn.is_some()
	}

	pub fn remaining(&self) -> Duration {
		self.deadline.saturating_duration_since(Instant::now())
	}

	/// Enter `phase`, failing with a timeout unless `window` still fits
	/// before the outer deadline.
	///
	/// `window` is the longest bounded wait the phase may make. Pass
	/// [`Duration::ZERO`] for phases that only issue commands.
	pub fn check_deadline(&self, phase: &str, window: Duration) -> Result<()> {
		self.enter_phase(phase);
		let now = Instant::now();
		if now >= self.deadline || self.deadline - now < window {
			warn!(
				dut = %self.dut_name,
				phase,
				remaining = ?self.deadline.saturating_duration_since(now),
				needed = ?window,
				"phase cannot finish before the outer deadline"
			);
			return Err(ProvisionError::TimedOut {
				phase: phase.to_string(),
			});
		}
		Ok(())
	}

	/// Release the current connection, if any.
	pub fn disconnect(&mut self) {
		if self.conn.take().is_some() {
			debug!(dut = %self.dut_name, "released connection");
		}
	}

	/// Check out and connect, retrying until `window` runs out.
	#[instrument(skip(self), fields(dut = %self.dut_name))]
	pub async fn connect_within(&mut self, window: Duration) -> std::result::Result<(), SshError> {
		self.disconnect();
		let until = Instant::now() + window;
		loop {
			let attempt = tokio::time::timeout_at(
				until,
				PooledConnection::checkout(Arc::clone(&self.pool), &self.address),
			)
			.await;
			let err = match attempt {
				Ok(Ok(conn)) => {
					self.conn = Some(conn);
					return Ok(());
				}
				Ok(Err(e)) => e,
				Err(_) => SshError::Connect {
					address: self.address.clone(),
					message: format!("not reachable within {window:?}"),
				},
			};
			if Instant::now() + self.timeouts.poll_interval >= until {
				return Err(err);
			}
			debug!(error = %err, "connect attempt failed, retrying");
			tokio::time::sleep(self.timeouts.poll_interval).await;
		}
	}

	fn client(&self) -> std::result::Result<&dyn SshClient, SshError> {
		self.conn.as_deref().ok_or_else(|| SshError::Connect {
			address: self.address.clone(),
			message: "no open connection".to_string(),
		})
	}

	pub async fn output(&self, command: &str) -> std::result::Result<CommandOutput, SshError> {
		self.client()?.output(command).await
	}

	pub async fn run(&self, command: &str) -> std::result::Result<(), SshError> {
		self.client()?.run(command).await
	}

	pub async fn run_output(&self, command: &str) -> std::result::Result<String, SshError> {
		self.client()?.run_output(command).await
	}

	/// Whether `command` exits 0. Session failures are errors, a non-zero
	/// exit is `false`.
	pub async fn test(&self, command: &str) -> std::result::Result<bool, SshError> {
		Ok(self.output(command).await?.success())
	}

	pub async fn boot_id(&self) -> std::result::Result<String, SshError> {
		Ok(self.run_output(device::BOOT_ID).await?.trim().to_string())
	}

	pub async fn builder_path(&self) -> std::result::Result<Option<String>, SshError> {
		let lsb = self.run_output(&device::cat(device::LSB_RELEASE)).await?;
		Ok(device::parse_builder_path(&lsb))
	}

	/// Reboot the device and wait for it to come back with a new boot id.
	///
	/// `step` names the reconnect in the error if the device stays away.
	#[instrument(skip(self), fields(dut = %self.dut_name))]
	pub async fn reboot(&mut self, step: &str) -> Result<()> {
		self.check_deadline(step, self.timeouts.reboot_reconnect)?;
		let before = self.boot_id().await.map_err(|e| ProvisionError::failed(step, e))?;
		self.reboots += 1;
		info!(reboot = self.reboots, "rebooting device");
		if let Err(e) = self.run(device::REBOOT).await {
			// The session may be torn down by the reboot itself.
			debug!(error = %e, "reboot command did not complete cleanly");
		}
		self.wait_for_new_boot(&before, step).await
	}

	async fn wait_for_new_boot(&mut self, previous_boot_id: &str, step: &str) -> Result<()> {
		self.disconnect();
		let window = self.timeouts.reboot_reconnect;
		let until = Instant::now() + window;
		loop {
			let left = until.saturating_duration_since(Instant::now());
			if left.is_zero() {
				return Err(ProvisionError::failed(
					step,
					format!("device did not come back within {window:?}"),
				));
			}
			if let Err(e) = self.connect_within(left).await {
				return Err(ProvisionError::failed(
					step,
					format!("reconnect failed: {e}"),
				));
			}
			match self.boot_id().await {
				Ok(id) if id != previous_boot_id => {
					info!(boot_id = %id, "device is back");
					return Ok(());
				}
				Ok(_) => debug!("device has not rebooted yet"),
				Err(e) => debug!(error = %e, "boot id read failed"),
			}
			self.disconnect();
			tokio::time::sleep(self.timeouts.poll_interval).await;
		}
	}
}
