// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Run-to-completion helpers layered on [`SshClient`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::client::{CommandOutput, SshClient};
use crate::error::{Result, SshError};

const BASE_RETRY_DELAY_MS: u64 = 500;
const MAX_RETRY_DELAY_MS: u64 = 30_000;
const RETRY_FACTOR: f64 = 2.0;

/// How many times to retry a command and how long to wait in between.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
	pub attempts: u32,
	pub base_delay: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			attempts: 3,
			base_delay: Duration::from_millis(BASE_RETRY_DELAY_MS),
		}
	}
}

impl RetryPolicy {
	pub fn new(attempts: u32, base_delay: Duration) -> Self {
		Self {
			attempts: attempts.max(1),
			base_delay,
		}
	}

	pub(crate) fn delay_for(&self, retry: u32) -> Duration {
		let delay =
			self.base_delay.as_millis() as f64 * RETRY_FACTOR.powi(retry.saturating_sub(1) as i32);
		Duration::from_millis((delay as u64).min(MAX_RETRY_DELAY_MS))
	}
}

/// Command helpers available on every connection.
#[async_trait]
pub trait RemoteShell {
	/// Run `command` and capture everything, whatever the exit status.
	async fn output(&self, command: &str) -> Result<CommandOutput>;

	/// Run `command` to completion, failing unless it exits 0.
	async fn run(&self, command: &str) -> Result<()>;

	/// Run `command` and return its stdout, failing unless it exits 0.
	async fn run_output(&self, command: &str) -> Result<String>;

	/// Run `command`, retrying failures according to `policy`.
	async fn run_with_retry(&self, command: &str, policy: RetryPolicy) -> Result<()>;
}

#[async_trait]
impl<T: SshClient + ?Sized> RemoteShell for T {
	async fn output(&self, command: &str) -> Result<CommandOutput> {
		debug!(address = %self.address(), command, "running remote command");
		let process = self.exec(command).await?;
		let (stdin, mut stdout, mut stderr, exit) = process.into_parts();
		drop(stdin);

		let mut out = Vec::new();
		let mut err = Vec::new();
		let (out_res, err_res) = tokio::join!(stdout.read_to_end(&mut out), stderr.read_to_end(&mut err));
		out_res?;
		err_res?;
		let status = exit.await?;

		Ok(CommandOutput {
			stdout: out,
			stderr: err,
			status,
		})
	}

	async fn run(&self, command: &str) -> Result<()> {
		self.run_output(command).await.map(|_| ())
	}

	async fn run_output(&self, command: &str) -> Result<String> {
		let output = self.output(command).await?;
		if !output.success() {
			return Err(SshError::CommandFailed {
				command: command.to_string(),
				status: output.status,
				stderr: output.stderr_lossy().trim().to_string(),
			});
		}
		Ok(output.stdout_lossy())
	}

	async fn run_with_retry(&self, command: &str, policy: RetryPolicy) -> Result<()> {
		let mut retry = 0u32;
		loop {
			match self.run(command).await {
				Ok(()) => return Ok(()),
				Err(e) if retry + 1 < policy.attempts => {
					retry += 1;
					let delay = policy.delay_for(retry);
					warn!(
						address = %self.address(),
						command,
						retry,
						delay_ms = delay.as_millis() as u64,
						error = %e,
						"remote command failed, retrying"
					);
					tokio::time::sleep(delay).await;
				}
				Err(e) => return Err(e),
			}
		}
	}
}
