// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scripted device, pool and resolver for workflow tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetprov_common_ssh::{
	ConnectionPool, RemoteExitStatus, RemoteProcess, SshClient, SshError,
};
use fleetprov_server_operations::{Operation, OperationStore};
use fleetprov_server_provisioning::device;
use fleetprov_server_provisioning::{ProvisionRequest, ProvisionTimeouts, ProvisioningService};
use fleetprov_server_wiring::StaticResolver;
use parking_lot::Mutex;

pub const DUT: &str = "dut-1";
pub const TARGET_IMAGE: &str = "gs://chromeos-image-archive/eve-release/R120-15662.0.0";
pub const TARGET_BUILDER_PATH: &str = "eve-release/R120-15662.0.0";
pub const OLD_BUILDER_PATH: &str = "eve-release/R119-15633.0.0";
pub const LACROS_VERSION: &str = "120.0.6099.5";

/// Mutable state of the simulated device.
#[derive(Debug, Clone)]
pub struct DutState {
	pub files: HashMap<String, String>,
	pub builder_path: String,
	pub pending_builder_path: Option<String>,
	pub boot: u32,
	pub reachable: bool,
	pub unreachable_after_reboot: bool,
	pub kvm: bool,
	pub firmware_updater: bool,
	pub fwid: String,
	pub manifest_fwid: String,
	pub pending_fwid: Option<String>,
	pub firmware_sticks: bool,
	pub kernel_sticky: bool,
	/// The kernel loses its successful flag at the n-th flag read.
	pub kernel_mark_lost_on_check: Option<usize>,
	/// Root partition of the running slot, 3 for A and 5 for B.
	pub root_partition: u32,
	pub pending_root_partition: Option<u32>,
	/// The next reboot falls back to the running slot and build.
	pub rollback: bool,
	/// The device reboots by itself when system services are polled for
	/// the n-th time.
	pub spontaneous_reboot_on_poll: Option<usize>,
	/// Commands containing this never finish.
	pub hang_on: Option<String>,
	pub minios: bool,
	pub fail_minios: bool,
	pub fail_dlc: bool,
	pub reboots: u32,
	pub commands: Vec<String>,
	/// Each command with whether the provision-failed marker existed when
	/// it ran.
	pub marker_trace: Vec<(String, bool)>,
}

impl Default for DutState {
	fn default() -> Self {
		Self {
			files: HashMap::new(),
			builder_path: OLD_BUILDER_PATH.to_string(),
			pending_builder_path: None,
			boot: 1,
			reachable: true,
			unreachable_after_reboot: false,
			kvm: true,
			firmware_updater: false,
			fwid: "Google_Eve.9584.1".to_string(),
			manifest_fwid: "Google_Eve.9584.2".to_string(),
			pending_fwid: None,
			firmware_sticks: true,
			kernel_sticky: true,
			kernel_mark_lost_on_check: None,
			root_partition: 3,
			pending_root_partition: None,
			rollback: false,
			spontaneous_reboot_on_poll: None,
			hang_on: None,
			minios: false,
			fail_minios: false,
			fail_dlc: false,
			reboots: 0,
			commands: Vec::new(),
			marker_trace: Vec::new(),
		}
	}
}

impl DutState {
	/// The device already runs the target build with a matching stateful.
	pub fn up_to_date(mut self) -> Self {
		self.builder_path = TARGET_BUILDER_PATH.to_string();
		self.files.insert(
			device::STATEFUL_BUILDER_PATH.to_string(),
			TARGET_BUILDER_PATH.to_string(),
		);
		self
	}

	pub fn has_marker(&self) -> bool {
		self.files.contains_key(device::PROVISION_FAILED_MARKER)
	}

	pub fn ran(&self, needle: &str) -> bool {
		self.commands.iter().any(|c| c.contains(needle))
	}

	pub fn services_polls(&self) -> usize {
		self.commands
			.iter()
			.filter(|c| c.as_str() == device::SYSTEM_SERVICES_STATUS)
			.count()
	}

	fn reboot(&mut self) {
		self.boot += 1;
		self.reboots += 1;
		if self.rollback {
			self.pending_builder_path = None;
			self.pending_root_partition = None;
		}
		if let Some(path) = self.pending_builder_path.take() {
			self.builder_path = path;
		}
		if let Some(root) = self.pending_root_partition.take() {
			self.root_partition = root;
		}
		if let Some(fwid) = self.pending_fwid.take() {
			self.fwid = fwid;
		}
		if self.files.contains_key(device::FACTORY_RESET_FILE) {
			self.files
				.retain(|path, _| !path.starts_with(device::STATEFUL_DIR) && !path.starts_with("/var/"));
		}
		if self.unreachable_after_reboot {
			self.reachable = false;
		}
	}

	fn interpret(&mut self, command: &str) -> (i32, String) {
		let ok = |out: &str| (0, out.to_string());
		let status = |pass: bool| if pass { (0, String::new()) } else { (1, String::new()) };
		let updater = device::FIRMWARE_UPDATER;

		if command == device::BOOT_ID {
			return ok(&format!("boot-{}\n", self.boot));
		}
		if command == device::REBOOT {
			self.reboot();
			return ok("");
		}
		if command == device::VIRTUALIZATION_CHECK {
			return status(self.kvm);
		}
		if command == device::cat(device::LSB_RELEASE) {
			return ok(&format!(
				"CHROMEOS_RELEASE_BOARD=eve\nCHROMEOS_RELEASE_BUILDER_PATH={}\n",
				self.builder_path
			));
		}
		if command == device::is_executable(updater) {
			return status(self.firmware_updater);
		}
		if command == format!("{updater} --manifest") {
			return ok(&format!(
				r#"{{"eve": {{"host": {{"versions": {{"ro": "Google_Eve.9584.0", "rw": "{}"}}}}}}}}"#,
				self.manifest_fwid
			));
		}
		if command == format!("{updater} --mode=autoupdate") {
			if self.firmware_sticks {
				self.pending_fwid = Some(self.manifest_fwid.clone());
			}
			return ok("");
		}
		if command == device::FIRMWARE_ID {
			return ok(&self.fwid.clone());
		}
		if command == device::HARDWARE_ID {
			return ok("EVE E25-Q2A-B2B");
		}
		if command == device::ROOT_DEVICE {
			return ok(&format!("/dev/nvme0n1p{}\n", self.root_partition));
		}
		if command == device::ROOT_DISK {
			return ok("/dev/nvme0n1\n");
		}
		if command == device::SYSTEM_SERVICES_STATUS {
			if self.spontaneous_reboot_on_poll == Some(self.services_polls()) {
				self.boot += 1;
			}
			return ok("system-services start/running, process 42\n");
		}
		if let Some(rest) = command.strip_prefix("cgpt show -S -i ") {
			let checks = self.commands.iter().filter(|c| c.starts_with("cgpt show -S")).count();
			if self.kernel_mark_lost_on_check == Some(checks) {
				self.kernel_sticky = false;
			}
			let partition: Option<u32> = rest.split_whitespace().next().and_then(|p| p.parse().ok());
			let booted = partition == Some(self.root_partition - 1);
			return ok(if self.kernel_sticky && booted { "1\n" } else { "0\n" });
		}
		if command.starts_with("cgpt find -l MINIOS") {
			return status(self.minios);
		}
		if command.contains("dd of=") {
			return status(!self.fail_minios);
		}
		if command.starts_with("dlcservice_util") {
			return status(!self.fail_dlc);
		}
		if let Some(rest) = command.strip_prefix("quick-provision --noreboot ") {
			let builder = rest.split_whitespace().next().map(unquote).unwrap_or_default();
			self.pending_builder_path = Some(builder);
			self.pending_root_partition = Some(if self.root_partition == 3 { 5 } else { 3 });
			return ok("");
		}
		if let Some(rest) = command.strip_prefix("printf '%s' ") {
			if let Some((contents, path)) = rest.rsplit_once(" > ") {
				self.files.insert(path.to_string(), unquote(contents));
				return ok("");
			}
		}
		if command.starts_with("sha256sum ") {
			return ok(&format!("{}\n", "ab".repeat(32)));
		}
		if command.contains("curl") {
			if command.contains("metadata.json") {
				return ok(&format!(r#"{{"content": {{"version": "{LACROS_VERSION}"}}}}"#));
			}
			if let Some(dest) = command
				.split_whitespace()
				.skip_while(|t| *t != "-o")
				.nth(1)
			{
				self.files.insert(dest.to_string(), "payload".to_string());
			}
			return ok("");
		}
		for prefix in ["test -e ", "test -s "] {
			if let Some(path) = command.strip_prefix(prefix) {
				return status(self.files.contains_key(path));
			}
		}
		if let Some(path) = command.strip_prefix("touch ") {
			self.files.entry(path.to_string()).or_default();
			return ok("");
		}
		if let Some(path) = command.strip_prefix("rm -f ") {
			self.files.remove(path);
			return ok("");
		}
		if let Some(path) = command.strip_prefix("cat ") {
			return match self.files.get(path) {
				Some(contents) => ok(contents),
				None => (1, String::new()),
			};
		}
		ok("")
	}
}

fn unquote(s: &str) -> String {
	match s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
		Some(inner) => inner.replace(r"'\''", "'"),
		None => s.to_string(),
	}
}

/// Simulated device that interprets the workflow's shell commands.
pub struct FakeDut {
	state: Mutex<DutState>,
}

impl FakeDut {
	pub fn new(state: DutState) -> Arc<Self> {
		Arc::new(Self {
			state: Mutex::new(state),
		})
	}

	pub fn state(&self) -> DutState {
		self.state.lock().clone()
	}

	pub fn update(&self, f: impl FnOnce(&mut DutState)) {
		f(&mut self.state.lock());
	}

	fn unreachable() -> SshError {
		SshError::Connect {
			address: "10.0.0.5:22".to_string(),
			message: "connection refused".to_string(),
		}
	}
}

#[async_trait]
impl SshClient for FakeDut {
	fn address(&self) -> &str {
		"10.0.0.5:22"
	}

	async fn connect(&self) -> fleetprov_common_ssh::Result<()> {
		if !self.state.lock().reachable {
			return Err(Self::unreachable());
		}
		Ok(())
	}

	async fn exec(&self, command: &str) -> fleetprov_common_ssh::Result<RemoteProcess> {
		let hang = {
			let state = self.state.lock();
			state.hang_on.as_deref().is_some_and(|h| command.contains(h))
		};
		if hang {
			std::future::pending::<()>().await;
		}
		let mut state = self.state.lock();
		if !state.reachable {
			return Err(Self::unreachable());
		}
		let marker = state.has_marker();
		state.commands.push(command.to_string());
		state.marker_trace.push((command.to_string(), marker));
		let (code, stdout) = state.interpret(command);
		drop(state);

		Ok(RemoteProcess::new(
			None,
			Box::new(Cursor::new(stdout.into_bytes())),
			Box::new(Cursor::new(Vec::new())),
			async move { Ok(RemoteExitStatus::exited(code)) },
		))
	}
}

/// Pool that always hands out the same fake device and counts checkouts.
pub struct FakePool {
	dut: Arc<FakeDut>,
	outstanding: AtomicI64,
}

impl FakePool {
	pub fn new(dut: Arc<FakeDut>) -> Arc<Self> {
		Arc::new(Self {
			dut,
			outstanding: AtomicI64::new(0),
		})
	}

	pub fn outstanding(&self) -> i64 {
		self.outstanding.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl ConnectionPool for FakePool {
	async fn get(&self, _address: &str) -> fleetprov_common_ssh::Result<Arc<dyn SshClient>> {
		self.outstanding.fetch_add(1, Ordering::SeqCst);
		Ok(self.dut.clone() as Arc<dyn SshClient>)
	}

	fn put(&self, _address: &str, _conn: Arc<dyn SshClient>) {
		self.outstanding.fetch_sub(1, Ordering::SeqCst);
	}
}

pub fn resolver() -> StaticResolver {
	let mut hosts = HashMap::new();
	hosts.insert(DUT.to_string(), "10.0.0.5".to_string());
	StaticResolver::new(hosts, "10.0.0.1").with_cache_base("http://cache:8082")
}

pub fn fast_timeouts() -> ProvisionTimeouts {
	ProvisionTimeouts {
		overall: Duration::from_secs(20),
		initial_connect: Duration::from_millis(200),
		reboot_reconnect: Duration::from_millis(300),
		ui_stabilize: Duration::from_secs(1),
		kernel_stickiness: Duration::from_millis(300),
		verify: Duration::from_secs(1),
		poll_interval: Duration::from_millis(5),
		timeout_marker: Duration::from_millis(100),
	}
}

pub struct Harness {
	pub dut: Arc<FakeDut>,
	pub pool: Arc<FakePool>,
	pub operations: Arc<OperationStore>,
	pub service: ProvisioningService,
}

impl Harness {
	pub fn new(state: DutState) -> Self {
		Self::with_timeouts(state, fast_timeouts())
	}

	pub fn with_timeouts(state: DutState, timeouts: ProvisionTimeouts) -> Self {
		let dut = FakeDut::new(state);
		let pool = FakePool::new(Arc::clone(&dut));
		let operations = Arc::new(OperationStore::new());
		let service = ProvisioningService::new(
			pool.clone(),
			Arc::new(resolver()),
			Arc::clone(&operations),
			timeouts,
		);
		Self {
			dut,
			pool,
			operations,
			service,
		}
	}

	/// Admit `request` and wait for the operation to finish.
	pub async fn provision(&self, request: ProvisionRequest) -> Operation {
		let name = self.service.admit(request).await.unwrap();
		self.wait(&name).await
	}

	pub async fn wait(&self, name: &str) -> Operation {
		let op = self
			.operations
			.wait(name, Duration::from_secs(30))
			.await
			.unwrap();
		assert!(op.done, "operation {name} did not finish");
		// The task releases its connection as it returns.
		for _ in 0..100 {
			if self.pool.outstanding() == 0 {
				break;
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
		op
	}
}

pub fn request() -> ProvisionRequest {
	ProvisionRequest {
		dut_name: DUT.to_string(),
		image_path: TARGET_IMAGE.to_string(),
		..Default::default()
	}
}

pub fn reason(op: &Operation) -> String {
	op.error
		.as_ref()
		.map(|e| e.reason.clone())
		.unwrap_or_default()
}
