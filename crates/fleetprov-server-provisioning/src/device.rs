// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Well-known paths on the device and the shell commands built from them.

use fleetprov_common_ssh::shell_quote;

pub const STATEFUL_DIR: &str = "/mnt/stateful_partition";

/// Present from the first connection until provisioning completes.
pub const PROVISION_FAILED_MARKER: &str = "/var/tmp/provision_failed";
pub const FORCE_PROVISION_MARKER: &str = "/mnt/stateful_partition/.force_provision";
pub const CORRUPT_STATEFUL_MARKER: &str = "/mnt/stateful_partition/.corrupt_stateful";
/// Builder path of the last stateful payload written to the device.
pub const STATEFUL_BUILDER_PATH: &str = "/mnt/stateful_partition/.provisioned_builder_path";
/// Picked up at boot to wipe the stateful partition.
pub const FACTORY_RESET_FILE: &str = "/mnt/stateful_partition/factory_install_reset";

pub const LSB_RELEASE: &str = "/etc/lsb-release";
pub const FIRMWARE_UPDATER: &str = "/usr/sbin/chromeos-firmwareupdate";
pub const DLC_IMAGE_DIR: &str = "/var/cache/dlc-images";
pub const LACROS_COMPONENT_DIR: &str = "/var/lib/imageloader/lacros";

pub const BOOT_ID: &str = "cat /proc/sys/kernel/random/boot_id";
pub const REBOOT: &str = "(sleep 1 && reboot) > /dev/null 2>&1 &";
pub const VIRTUALIZATION_CHECK: &str = "test -c /dev/kvm";
pub const SYSTEM_SERVICES_STATUS: &str = "status system-services";
pub const ROOT_DEVICE: &str = "rootdev -s";
pub const ROOT_DISK: &str = "rootdev -s -d";
pub const FIRMWARE_ID: &str = "crossystem fwid";
pub const HARDWARE_ID: &str = "crossystem hwid";

const BUILDER_PATH_KEY: &str = "CHROMEOS_RELEASE_BUILDER_PATH";

/// miniOS partition labels and their numbers on the boot disk.
pub const MINIOS_PARTITIONS: [(&str, u32); 2] = [("MINIOS-A", 9), ("MINIOS-B", 10)];

pub fn exists(path: &str) -> String {
	format!("test -e {path}")
}

pub fn is_executable(path: &str) -> String {
	format!("test -x {path}")
}

pub fn touch(path: &str) -> String {
	format!("touch {path}")
}

pub fn remove(path: &str) -> String {
	format!("rm -f {path}")
}

pub fn cat(path: &str) -> String {
	format!("cat {path}")
}

pub fn write_file(path: &str, contents: &str) -> String {
	format!("printf '%s' {} > {path}", shell_quote(contents))
}

pub fn install_os(builder_path: &str, payload_url: &str) -> String {
	format!(
		"quick-provision --noreboot {} {}",
		shell_quote(builder_path),
		shell_quote(payload_url)
	)
}

pub fn install_stateful(payload_url: &str) -> String {
	format!(
		"curl -fsS --retry 3 {} | tar --overwrite --directory={STATEFUL_DIR} -xzf -",
		shell_quote(payload_url)
	)
}

pub fn kernel_successful(disk: &str, partition: u32) -> String {
	format!("cgpt show -S -i {partition} {disk}")
}

pub fn find_partition(disk: &str, label: &str) -> String {
	format!("cgpt find -l {label} {disk}")
}

pub fn write_partition(payload_url: &str, device: &str) -> String {
	format!(
		"curl -fsS --retry 3 {} | gzip -d | dd of={device} bs=4M conv=fsync status=none",
		shell_quote(payload_url)
	)
}

pub fn download(url: &str, dest: &str) -> String {
	format!(
		"mkdir -p $(dirname {dest}) && curl -fsS --retry 3 -o {dest} {}",
		shell_quote(url)
	)
}

/// Extract the builder path from `/etc/lsb-release` contents.
pub fn parse_builder_path(lsb_release: &str) -> Option<String> {
	lsb_release.lines().find_map(|line| {
		let (key, value) = line.split_once('=')?;
		(key.trim() == BUILDER_PATH_KEY)
			.then(|| value.trim().to_string())
			.filter(|v| !v.is_empty())
	})
}

/// Split a root partition device into its disk and the kernel partition that
/// boots it (`/dev/nvme0n1p3` -> `/dev/nvme0n1`, 2).
pub fn kernel_partition_for_root(root: &str) -> Option<(String, u32)> {
	let root = root.trim();
	let digits = root.len() - root.trim_end_matches(|c: char| c.is_ascii_digit()).len();
	if digits == 0 {
		return None;
	}
	let (prefix, number) = root.split_at(root.len() - digits);
	let number: u32 = number.parse().ok()?;
	let disk = match prefix.strip_suffix('p') {
		Some(disk) if disk.ends_with(|c: char| c.is_ascii_digit()) => disk,
		_ => prefix,
	};
	if disk.is_empty() || number < 2 {
		return None;
	}
	Some((disk.to_string(), number - 1))
}

/// Device node for partition `number` on `disk`.
pub fn partition_device(disk: &str, number: u32) -> String {
	if disk.ends_with(|c: char| c.is_ascii_digit()) {
		format!("{disk}p{number}")
	} else {
		format!("{disk}{number}")
	}
}

/// Firmware manifest key for a hardware id (`EVE E25-Q2A` -> `eve`).
pub fn model_from_hwid(hwid: &str) -> Option<String> {
	hwid.split(|c: char| c.is_whitespace() || c == '-')
		.find(|s| !s.is_empty())
		.map(str::to_lowercase)
}

/// RW firmware version for `model` in the updater's JSON manifest.
pub fn firmware_version_from_manifest(manifest: &str, model: &str) -> Option<String> {
	let value: serde_json::Value = serde_json::from_str(manifest).ok()?;
	let versions = value.get(model)?.get("host")?.get("versions")?;
	versions
		.get("rw")
		.or_else(|| versions.get("ro"))?
		.as_str()
		.map(str::to_string)
}
