// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod support;

use std::sync::Arc;
use std::time::Duration;

use fleetprov_server_operations::OperationState;
use fleetprov_server_provisioning::{
	device, provision, DlcSpec, ImagePath, LacrosRequest, ProvisionError, ProvisionFlags,
	ProvisioningSession,
};
use support::*;

#[tokio::test]
async fn test_empty_image_is_rejected_before_dispatch() {
	let h = Harness::new(DutState::default());
	let mut req = request();
	req.image_path = String::new();

	let err = h.service.admit(req).await.unwrap_err();
	assert!(matches!(err, ProvisionError::InvalidRequest(_)));
	assert!(h.operations.is_empty());
	assert!(h.dut.state().commands.is_empty());
}

#[tokio::test]
async fn test_empty_dut_name_is_rejected_before_dispatch() {
	let h = Harness::new(DutState::default());
	let mut req = request();
	req.dut_name = String::new();

	assert!(matches!(
		h.service.admit(req).await,
		Err(ProvisionError::InvalidRequest(_))
	));
	assert!(h.operations.is_empty());
}

#[tokio::test]
async fn test_unresolvable_dut_is_invalid_request() {
	let h = Harness::new(DutState::default());
	let mut req = request();
	req.dut_name = "not-in-lab".to_string();

	assert!(matches!(
		h.service.admit(req).await,
		Err(ProvisionError::InvalidRequest(_))
	));
	assert!(h.operations.is_empty());
}

#[tokio::test]
async fn test_full_install_succeeds_and_marker_spans_the_run() {
	let h = Harness::new(DutState::default());
	let op = h.provision(request()).await;

	assert_eq!(op.state, OperationState::Succeeded, "{:?}", op.error);
	let result = op.result.unwrap();
	assert_eq!(result["installed_os"], true);
	assert_eq!(result["builder_path"], TARGET_BUILDER_PATH);

	let state = h.dut.state();
	assert!(!state.has_marker());
	assert_eq!(state.builder_path, TARGET_BUILDER_PATH);
	assert!(state.ran("quick-provision"));
	assert_eq!(
		state.files.get(device::STATEFUL_BUILDER_PATH).map(String::as_str),
		Some(TARGET_BUILDER_PATH)
	);
	// OS install reboot plus stateful reboot.
	assert_eq!(state.reboots, 2);

	let touch = device::touch(device::PROVISION_FAILED_MARKER);
	let remove = device::remove(device::PROVISION_FAILED_MARKER);
	let first = state
		.marker_trace
		.iter()
		.position(|(c, _)| *c == touch)
		.unwrap();
	let last = state
		.marker_trace
		.iter()
		.position(|(c, _)| *c == remove)
		.unwrap();
	assert_eq!(first, 0, "marker must be written right after connecting");
	assert!(state.marker_trace[first + 1..=last]
		.iter()
		.all(|(_, present)| *present));

	assert_eq!(h.pool.outstanding(), 0);
}

#[tokio::test]
async fn test_prevent_reboot_allows_only_the_install_reboot() {
	let mut state = DutState::default();
	state.firmware_updater = true;
	let h = Harness::new(state);

	let mut req = request();
	req.prevent_reboot = true;
	req.update_firmware = true;
	let op = h.provision(req).await;

	assert_eq!(op.state, OperationState::Succeeded, "{:?}", op.error);
	let state = h.dut.state();
	assert_eq!(state.reboots, 1);
	assert!(state.ran("--mode=autoupdate"));
	let reboot_at = state
		.commands
		.iter()
		.position(|c| c == device::REBOOT)
		.unwrap();
	assert!(state.commands[..reboot_at]
		.iter()
		.any(|c| c.starts_with("quick-provision")));
}

#[tokio::test]
async fn test_firmware_update_skipped_without_updater() {
	let h = Harness::new(DutState::default());
	let mut req = request();
	req.update_firmware = true;
	let op = h.provision(req).await;

	assert_eq!(op.state, OperationState::Succeeded);
	let state = h.dut.state();
	assert!(!state.ran("--mode=autoupdate"));
	assert!(!state.ran("--manifest"));
}

#[tokio::test]
async fn test_firmware_update_reboots_and_verifies() {
	let mut state = DutState::default();
	state.firmware_updater = true;
	let h = Harness::new(state);
	let mut req = request();
	req.update_firmware = true;
	let op = h.provision(req).await;

	assert_eq!(op.state, OperationState::Succeeded, "{:?}", op.error);
	let state = h.dut.state();
	assert_eq!(state.fwid, state.manifest_fwid);
	// Install, firmware, stateful.
	assert_eq!(state.reboots, 3);
}

#[tokio::test]
async fn test_firmware_mismatch_is_fatal() {
	let mut state = DutState::default();
	state.firmware_updater = true;
	state.firmware_sticks = false;
	let h = Harness::new(state);
	let mut req = request();
	req.update_firmware = true;
	let op = h.provision(req).await;

	assert_eq!(op.state, OperationState::Failed);
	assert_eq!(reason(&op), "REASON_UPDATE_FIRMWARE_FAILED");
	let state = h.dut.state();
	assert!(state.has_marker());
	assert!(!state.ran("tar --overwrite"));
}

#[tokio::test]
async fn test_current_build_runs_only_trailing_phases() {
	let h = Harness::new(DutState::default().up_to_date());
	let mut req = request();
	req.dlc_specs = vec![DlcSpec {
		id: "sample-dlc".to_string(),
	}];
	let op = h.provision(req).await;

	assert_eq!(op.state, OperationState::Succeeded, "{:?}", op.error);
	let result = op.result.unwrap();
	assert_eq!(result["installed_os"], false);
	assert_eq!(result["repaired_stateful"], false);

	let state = h.dut.state();
	assert!(!state.ran("quick-provision"));
	assert!(!state.ran("tar --overwrite"));
	assert!(state.ran("dlcservice_util --deploy --id=sample-dlc"));
	assert_eq!(state.reboots, 0);
	assert!(!state.has_marker());
}

#[tokio::test]
async fn test_force_flag_reinstalls_current_build() {
	let h = Harness::new(DutState::default().up_to_date());
	let mut req = request();
	req.force = true;
	let op = h.provision(req).await;

	assert_eq!(op.state, OperationState::Succeeded, "{:?}", op.error);
	assert!(h.dut.state().ran("quick-provision"));
}

#[tokio::test]
async fn test_force_marker_reinstalls_current_build() {
	let mut state = DutState::default().up_to_date();
	state
		.files
		.insert(device::FORCE_PROVISION_MARKER.to_string(), String::new());
	let h = Harness::new(state);
	let op = h.provision(request()).await;

	assert_eq!(op.state, OperationState::Succeeded, "{:?}", op.error);
	assert!(h.dut.state().ran("quick-provision"));
}

#[tokio::test]
async fn test_unreachable_after_install_reboot_names_reconnect_step() {
	let mut state = DutState::default();
	state.unreachable_after_reboot = true;
	let h = Harness::new(state);
	let op = h.provision(request()).await;

	assert_eq!(op.state, OperationState::Failed);
	assert_eq!(reason(&op), "REASON_PROVISIONING_FAILED");
	let message = op.error.unwrap().message;
	assert!(message.contains("reconnect after OS install"), "{message}");
	assert!(h.dut.state().has_marker());
	assert_eq!(h.pool.outstanding(), 0);
}

#[tokio::test]
async fn test_unreachable_before_provisioning() {
	let mut state = DutState::default();
	state.reachable = false;
	let h = Harness::new(state);
	let op = h.provision(request()).await;

	assert_eq!(reason(&op), "REASON_DUT_UNREACHABLE_PRE_PROVISION");
	assert_eq!(op.error.unwrap().code, "unavailable");
	assert!(h.dut.state().commands.is_empty());
	assert_eq!(h.pool.outstanding(), 0);
}

#[tokio::test]
async fn test_missing_virtualization_fails_permanently() {
	let mut state = DutState::default();
	state.kvm = false;
	let h = Harness::new(state);
	let op = h.provision(request()).await;

	assert_eq!(reason(&op), "REASON_PROVISIONING_FAILED");
	assert!(!h.dut.state().ran("quick-provision"));
}

#[tokio::test]
async fn test_corrupt_stateful_is_wiped_and_reprovisioned() {
	let mut state = DutState::default().up_to_date();
	state
		.files
		.insert(device::CORRUPT_STATEFUL_MARKER.to_string(), String::new());
	let h = Harness::new(state);
	let op = h.provision(request()).await;

	assert_eq!(op.state, OperationState::Succeeded, "{:?}", op.error);
	assert_eq!(op.result.unwrap()["repaired_stateful"], true);
	let state = h.dut.state();
	assert!(!state.ran("quick-provision"));
	assert!(state.ran(device::FACTORY_RESET_FILE));
	assert!(state.ran("tar --overwrite"));
	assert!(!state.files.contains_key(device::CORRUPT_STATEFUL_MARKER));
	assert!(!state.has_marker());
	// Wipe reboot plus stateful reboot.
	assert_eq!(state.reboots, 2);
}

#[tokio::test]
async fn test_stale_stateful_with_preserve_skips_wipe() {
	let mut state = DutState::default().up_to_date();
	state.files.insert(
		device::STATEFUL_BUILDER_PATH.to_string(),
		OLD_BUILDER_PATH.to_string(),
	);
	let h = Harness::new(state);
	let mut req = request();
	req.preserve_stateful = true;
	let op = h.provision(req).await;

	assert_eq!(op.state, OperationState::Succeeded, "{:?}", op.error);
	let state = h.dut.state();
	assert!(!state.ran(device::FACTORY_RESET_FILE));
	assert!(state.ran("tar --overwrite"));
	assert_eq!(state.reboots, 1);
}

#[tokio::test]
async fn test_dlc_failure_is_fatal() {
	let mut state = DutState::default().up_to_date();
	state.fail_dlc = true;
	let h = Harness::new(state);
	let mut req = request();
	req.dlc_specs = vec![DlcSpec {
		id: "sample-dlc".to_string(),
	}];
	let op = h.provision(req).await;

	assert_eq!(reason(&op), "REASON_PROVISIONING_FAILED");
	let state = h.dut.state();
	assert!(state.has_marker());
	assert!(!state.ran("cgpt find"));
}

#[tokio::test]
async fn test_minios_failure_is_not_fatal() {
	let mut state = DutState::default().up_to_date();
	state.minios = true;
	state.fail_minios = true;
	let h = Harness::new(state);
	let op = h.provision(request()).await;

	assert_eq!(op.state, OperationState::Succeeded, "{:?}", op.error);
	assert!(h.dut.state().ran("dd of=/dev/nvme0n1p9"));
}

#[tokio::test]
async fn test_minios_written_to_both_partitions() {
	let mut state = DutState::default().up_to_date();
	state.minios = true;
	let h = Harness::new(state);
	let op = h.provision(request()).await;

	assert_eq!(op.state, OperationState::Succeeded);
	let state = h.dut.state();
	assert!(state.ran("dd of=/dev/nvme0n1p9"));
	assert!(state.ran("dd of=/dev/nvme0n1p10"));
}

#[tokio::test]
async fn test_reboot_that_cannot_fit_is_refused_as_timeout() {
	let mut timeouts = fast_timeouts();
	timeouts.overall = Duration::from_millis(300);
	timeouts.reboot_reconnect = Duration::from_secs(30);
	let h = Harness::with_timeouts(DutState::default(), timeouts);

	let op = h.provision(request()).await;
	assert_eq!(reason(&op), "REASON_PROVISIONING_TIMEDOUT");
	let error = op.error.unwrap();
	assert_eq!(error.code, "deadline_exceeded");
	assert!(error.message.contains("reconnect after OS install"), "{}", error.message);
	let state = h.dut.state();
	assert_eq!(state.reboots, 0);
	assert!(state.has_marker());
	assert_eq!(h.pool.outstanding(), 0);
}

#[tokio::test]
async fn test_outer_deadline_names_the_running_phase() {
	let mut state = DutState::default();
	state.hang_on = Some(device::SYSTEM_SERVICES_STATUS.to_string());
	let mut timeouts = fast_timeouts();
	timeouts.overall = Duration::from_millis(1500);
	let h = Harness::with_timeouts(state, timeouts);

	let op = h.provision(request()).await;
	assert_eq!(reason(&op), "REASON_PROVISIONING_TIMEDOUT");
	let message = op.error.unwrap().message;
	assert!(message.contains("UI stabilization"), "{message}");
	assert!(h.dut.state().has_marker());
	assert_eq!(h.pool.outstanding(), 0);
}

#[tokio::test]
async fn test_non_sticky_kernel_fails_provisioning() {
	let mut state = DutState::default();
	state.kernel_sticky = false;
	let h = Harness::new(state);
	let op = h.provision(request()).await;

	assert_eq!(op.state, OperationState::Failed);
	assert_eq!(reason(&op), "REASON_PROVISIONING_FAILED");
	let message = op.error.unwrap().message;
	assert!(message.contains("kernel stickiness"), "{message}");
	assert!(message.contains("partition 4"), "{message}");
	let state = h.dut.state();
	assert_eq!(state.root_partition, 5);
	assert!(state.has_marker());
	assert!(!state.ran("stateful.tgz"));
}

#[tokio::test]
async fn test_rollback_to_previous_kernel_is_detected() {
	let mut state = DutState::default();
	state.rollback = true;
	let h = Harness::new(state);
	let op = h.provision(request()).await;

	assert_eq!(op.state, OperationState::Failed);
	assert_eq!(reason(&op), "REASON_PROVISIONING_FAILED");
	let message = op.error.unwrap().message;
	assert!(message.contains("kernel stickiness"), "{message}");
	assert!(message.contains("rolled back to kernel partition 2"), "{message}");
	let state = h.dut.state();
	assert_eq!(state.root_partition, 3);
	assert_eq!(state.builder_path, OLD_BUILDER_PATH);
	assert!(state.has_marker());
}

#[tokio::test]
async fn test_kernel_losing_its_mark_inside_the_window_fails() {
	let mut state = DutState::default();
	state.kernel_mark_lost_on_check = Some(3);
	let h = Harness::new(state);
	let op = h.provision(request()).await;

	assert_eq!(op.state, OperationState::Failed);
	let message = op.error.unwrap().message;
	assert!(message.contains("kernel partition 4 lost its successful mark"), "{message}");
}

#[tokio::test]
async fn test_install_switches_slot_and_checks_new_kernel() {
	let mut state = DutState::default();
	state.root_partition = 5;
	let h = Harness::new(state);
	let op = h.provision(request()).await;

	assert_eq!(op.state, OperationState::Succeeded, "{:?}", op.error);
	let state = h.dut.state();
	assert_eq!(state.root_partition, 3);
	assert!(state.ran("cgpt show -S -i 2 /dev/nvme0n1"));
}

#[tokio::test]
async fn test_spontaneous_reboot_during_ui_wait_is_tolerated() {
	let mut state = DutState::default();
	state.spontaneous_reboot_on_poll = Some(2);
	let h = Harness::new(state);
	let op = h.provision(request()).await;

	assert_eq!(op.state, OperationState::Succeeded, "{:?}", op.error);
	let state = h.dut.state();
	// One poll on the install boot, then two on the boot that followed.
	assert_eq!(state.services_polls(), 3);
	assert_eq!(state.reboots, 2);
	assert_eq!(state.boot, 4);
	assert_eq!(state.builder_path, TARGET_BUILDER_PATH);
}

#[tokio::test]
async fn test_phase_longer_than_remaining_budget_is_refused() {
	let dut = FakeDut::new(DutState::default());
	let pool = FakePool::new(Arc::clone(&dut));
	let mut timeouts = fast_timeouts();
	timeouts.overall = Duration::from_secs(1);
	timeouts.ui_stabilize = Duration::from_secs(5);
	let mut session = ProvisioningSession::new(
		pool.clone(),
		DUT,
		"10.0.0.5:22",
		ImagePath::parse(TARGET_IMAGE).unwrap(),
		ProvisionFlags::default(),
		timeouts,
	);
	let phase = session.current_phase();

	let err = provision(&mut session, &resolver(), &[]).await.unwrap_err();
	assert!(matches!(err, ProvisionError::TimedOut { ref phase } if phase == "UI stabilization"));
	assert_eq!(phase.get(), "UI stabilization");
	assert_eq!(dut.state().services_polls(), 0);
	drop(session);
	assert_eq!(pool.outstanding(), 0);
}

#[tokio::test]
async fn test_expired_deadline_stops_before_next_phase() {
	let dut = FakeDut::new(DutState::default());
	let pool = FakePool::new(Arc::clone(&dut));
	let mut timeouts = fast_timeouts();
	timeouts.overall = Duration::ZERO;
	let mut session = ProvisioningSession::new(
		pool.clone(),
		DUT,
		"10.0.0.5:22",
		ImagePath::parse(TARGET_IMAGE).unwrap(),
		ProvisionFlags::default(),
		timeouts,
	);

	let err = provision(&mut session, &resolver(), &[]).await.unwrap_err();
	assert!(matches!(err, ProvisionError::TimedOut { ref phase } if phase == "virtualization check"));
	assert!(dut.state().has_marker());
	drop(session);
	assert_eq!(pool.outstanding(), 0);
}

#[tokio::test]
async fn test_lacros_install_writes_component() {
	let h = Harness::new(DutState::default());
	let name = h
		.service
		.admit_lacros(LacrosRequest {
			dut_name: DUT.to_string(),
			port: None,
			image_path: "gs://chrome-unsigned/desktop-5c0tCh/120.0.6099.5/lacros-arm64".to_string(),
		})
		.await
		.unwrap();
	let op = h.wait(&name).await;

	assert_eq!(op.state, OperationState::Succeeded, "{:?}", op.error);
	assert_eq!(op.result.unwrap()["version"], LACROS_VERSION);
	let state = h.dut.state();
	let dir = format!("{}/{}", device::LACROS_COMPONENT_DIR, LACROS_VERSION);
	assert!(state.files.contains_key(&format!("{dir}/image.squash")));
	let manifest: serde_json::Value =
		serde_json::from_str(&state.files[&format!("{dir}/imageloader.json")]).unwrap();
	assert_eq!(manifest["image-sha256-hash"], "ab".repeat(32));
	assert_eq!(
		state.files[&format!("{}/latest-version", device::LACROS_COMPONENT_DIR)],
		LACROS_VERSION
	);
	assert_eq!(state.reboots, 0);
}

#[tokio::test]
async fn test_lacros_rejects_bad_image_path() {
	let h = Harness::new(DutState::default());
	let err = h
		.service
		.admit_lacros(LacrosRequest {
			dut_name: DUT.to_string(),
			port: None,
			image_path: "lacros-arm64".to_string(),
		})
		.await
		.unwrap_err();
	assert!(matches!(err, ProvisionError::InvalidRequest(_)));
	assert!(h.operations.is_empty());
}
