// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! [`SshClient`] backed by the system OpenSSH client.
//!
//! A connection is an OpenSSH control master. Every remote session is a
//! separate `ssh` invocation multiplexed over that master, so opening a
//! session costs a local socket round trip rather than a new handshake.

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::address::{parse_address, DeviceAddress};
use crate::client::{RemoteExitStatus, RemoteProcess, SshClient};
use crate::error::{Result, SshError};

/// Options shared by every connection the pool opens.
#[derive(Debug, Clone)]
pub struct SshOptions {
	pub user: String,
	pub default_port: u16,
	pub identity_file: Option<PathBuf>,
	pub connect_timeout: Duration,
	pub control_dir: PathBuf,
	pub control_persist: Duration,
	pub strict_host_key_checking: bool,
}

impl Default for SshOptions {
	fn default() -> Self {
		Self {
			user: "root".to_string(),
			default_port: 22,
			identity_file: None,
			connect_timeout: Duration::from_secs(10),
			control_dir: std::env::temp_dir().join("fleetprov-ssh"),
			control_persist: Duration::from_secs(60),
			strict_host_key_checking: false,
		}
	}
}

/// A multiplexed OpenSSH connection to one device.
pub struct OpenSshClient {
	address: String,
	target: DeviceAddress,
	options: SshOptions,
}

impl OpenSshClient {
	pub fn new(address: impl Into<String>, options: SshOptions) -> Result<Self> {
		let address = address.into();
		let target = parse_address(&address)?;
		Ok(Self {
			address,
			target,
			options,
		})
	}

	fn control_path(&self) -> PathBuf {
		self.options.control_dir.join("%C")
	}

	fn base_command(&self) -> Command {
		let mut cmd = Command::new("ssh");
		cmd
			.arg("-o")
			.arg("BatchMode=yes")
			.arg("-o")
			.arg(format!(
				"ConnectTimeout={}",
				self.options.connect_timeout.as_secs().max(1)
			))
			.arg("-o")
			.arg(format!("ControlPath={}", self.control_path().display()))
			.arg("-o")
			.arg(format!(
				"ControlPersist={}",
				self.options.control_persist.as_secs().max(1)
			))
			.arg("-o")
			.arg("ServerAliveInterval=5")
			.arg("-o")
			.arg("ServerAliveCountMax=3")
			.arg("-p")
			.arg(
				self
					.target
					.port
					.unwrap_or(self.options.default_port)
					.to_string(),
			)
			.arg("-l")
			.arg(&self.options.user);

		if self.options.strict_host_key_checking {
			cmd.arg("-o").arg("StrictHostKeyChecking=yes");
		} else {
			cmd
				.arg("-o")
				.arg("StrictHostKeyChecking=no")
				.arg("-o")
				.arg("UserKnownHostsFile=/dev/null")
				.arg("-o")
				.arg("LogLevel=ERROR");
		}

		if let Some(identity) = &self.options.identity_file {
			cmd.arg("-i").arg(identity);
		}

		cmd.kill_on_drop(true);
		cmd
	}

	async fn master_alive(&self) -> bool {
		let mut cmd = self.base_command();
		cmd
			.arg("-O")
			.arg("check")
			.arg(&self.target.host)
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null());
		matches!(cmd.status().await, Ok(status) if status.success())
	}
}

#[async_trait]
impl SshClient for OpenSshClient {
	fn address(&self) -> &str {
		&self.address
	}

	#[instrument(skip(self), fields(address = %self.address))]
	async fn connect(&self) -> Result<()> {
		if self.master_alive().await {
			return Ok(());
		}

		tokio::fs::create_dir_all(&self.options.control_dir).await?;

		let mut cmd = self.base_command();
		cmd
			.arg("-o")
			.arg("ControlMaster=yes")
			.arg("-f")
			.arg("-N")
			.arg(&self.target.host)
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::piped());

		debug!("starting ssh control master");
		let output = cmd.output().await.map_err(SshError::Spawn)?;
		if !output.status.success() {
			return Err(SshError::Connect {
				address: self.address.clone(),
				message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
			});
		}

		info!("ssh control master established");
		Ok(())
	}

	async fn exec(&self, command: &str) -> Result<RemoteProcess> {
		self.connect().await?;

		let mut cmd = self.base_command();
		cmd
			.arg("-o")
			.arg("ControlMaster=no")
			.arg(&self.target.host)
			.arg("--")
			.arg(command)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped());

		let mut child = cmd.spawn().map_err(SshError::Spawn)?;
		let stdin = child.stdin.take();
		let stdout = child
			.stdout
			.take()
			.ok_or_else(|| SshError::Spawn(std::io::Error::other("stdout not captured")))?;
		let stderr = child
			.stderr
			.take()
			.ok_or_else(|| SshError::Spawn(std::io::Error::other("stderr not captured")))?;

		let exit = async move {
			let status = child.wait().await?;
			Ok(match (status.code(), status.signal()) {
				(Some(code), _) => RemoteExitStatus::exited(code),
				(None, Some(signal)) => RemoteExitStatus::signaled(signal),
				(None, None) => RemoteExitStatus {
					code: None,
					signal: None,
				},
			})
		};

		Ok(RemoteProcess::new(
			stdin.map(|s| Box::new(s) as Box<dyn tokio::io::AsyncWrite + Send + Unpin>),
			Box::new(stdout),
			Box::new(stderr),
			exit,
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_new_rejects_bad_address() {
		assert!(OpenSshClient::new("", SshOptions::default()).is_err());
	}

	#[test]
	fn test_base_command_uses_explicit_port() {
		let client = OpenSshClient::new("dut-1:2200", SshOptions::default()).unwrap();
		let cmd = client.base_command();
		let args: Vec<String> = cmd
			.as_std()
			.get_args()
			.map(|a| a.to_string_lossy().into_owned())
			.collect();
		let port_idx = args.iter().position(|a| a == "-p").unwrap();
		assert_eq!(args[port_idx + 1], "2200");
		assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
	}

	#[test]
	fn test_base_command_falls_back_to_default_port() {
		let options = SshOptions {
			default_port: 22,
			identity_file: Some(PathBuf::from("/keys/testing_rsa")),
			..Default::default()
		};
		let client = OpenSshClient::new("dut-1", options).unwrap();
		let args: Vec<String> = client
			.base_command()
			.as_std()
			.get_args()
			.map(|a| a.to_string_lossy().into_owned())
			.collect();
		let port_idx = args.iter().position(|a| a == "-p").unwrap();
		assert_eq!(args[port_idx + 1], "22");
		assert!(args.contains(&"/keys/testing_rsa".to_string()));
	}
}
