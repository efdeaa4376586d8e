// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Streams one remote command's output back to the caller.
//!
//! The command runs in a single remote session. Stdout and stderr are
//! drained concurrently into chunks of at most `chunk_size` bytes, in order
//! within each stream. A single [`ExecEvent::Exit`] is sent last, after both
//! drains and the exit status have completed.

use fleetprov_common_ssh::{shell_quote, RemoteExitStatus, SshClient};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

/// Exit status reported when the session never started.
pub const NOT_STARTED_STATUS: i32 = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
	Stdout(Vec<u8>),
	Stderr(Vec<u8>),
	Exit(ExecExit),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecExit {
	pub started: bool,
	pub status: i32,
	pub signaled: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl ExecExit {
	pub fn not_started(error: impl Into<String>) -> Self {
		Self {
			started: false,
			status: NOT_STARTED_STATUS,
			signaled: false,
			error: Some(error.into()),
		}
	}

	fn from_status(status: RemoteExitStatus) -> Self {
		match (status.code, status.signal) {
			(Some(code), _) => Self {
				started: true,
				status: code,
				signaled: false,
				error: (code != 0).then(|| format!("exited with status {code}")),
			},
			(None, Some(signal)) => Self {
				started: true,
				status: 128 + signal,
				signaled: true,
				error: Some(format!("terminated by signal {signal}")),
			},
			(None, None) => Self {
				started: true,
				status: NOT_STARTED_STATUS,
				signaled: false,
				error: Some("remote process ended without an exit status".to_string()),
			},
		}
	}
}

/// `command` followed by each of `args`, shell-quoted.
pub fn command_line(command: &str, args: &[String]) -> String {
	let mut line = command.to_string();
	for arg in args {
		line.push(' ');
		line.push_str(&shell_quote(arg));
	}
	line
}

async fn drain<R>(
	mut reader: R,
	chunk_size: usize,
	tx: mpsc::Sender<ExecEvent>,
	wrap: fn(Vec<u8>) -> ExecEvent,
) -> std::io::Result<u64>
where
	R: AsyncRead + Unpin,
{
	let mut buf = vec![0u8; chunk_size];
	let mut total = 0u64;
	let mut forwarding = true;
	loop {
		let n = reader.read(&mut buf).await?;
		if n == 0 {
			return Ok(total);
		}
		total += n as u64;
		// Keep reading after the receiver goes away so the remote side never
		// blocks on a full pipe.
		if forwarding && tx.send(wrap(buf[..n].to_vec())).await.is_err() {
			forwarding = false;
		}
	}
}

/// Run `command` on `client`, sending output chunks and a final exit event
/// to `tx`.
#[instrument(skip(client, stdin, tx), fields(address = %client.address(), stdin_len = stdin.len()))]
pub async fn stream_exec(
	client: &dyn SshClient,
	command: &str,
	stdin: Vec<u8>,
	chunk_size: usize,
	tx: mpsc::Sender<ExecEvent>,
) {
	let chunk_size = chunk_size.max(1);
	let process = match client.exec(command).await {
		Ok(process) => process,
		Err(e) => {
			warn!(error = %e, "failed to start remote command");
			let _ = tx.send(ExecEvent::Exit(ExecExit::not_started(e.to_string()))).await;
			return;
		}
	};
	let (input, stdout, stderr, exit) = process.into_parts();

	let feed = async move {
		if let Some(mut input) = input {
			if !stdin.is_empty() {
				if let Err(e) = input.write_all(&stdin).await {
					debug!(error = %e, "remote stdin closed early");
				}
			}
			let _ = input.shutdown().await;
		}
	};

	let (_, out, err, status) = tokio::join!(
		feed,
		drain(stdout, chunk_size, tx.clone(), ExecEvent::Stdout),
		drain(stderr, chunk_size, tx.clone(), ExecEvent::Stderr),
		exit,
	);

	let mut result = match status {
		Ok(status) => ExecExit::from_status(status),
		Err(e) => ExecExit {
			started: true,
			status: NOT_STARTED_STATUS,
			signaled: false,
			error: Some(e.to_string()),
		},
	};
	for (stream, drained) in [("stdout", out), ("stderr", err)] {
		match drained {
			Ok(bytes) => debug!(stream, bytes, "stream drained"),
			Err(e) if result.error.is_none() => {
				result.error = Some(format!("reading {stream}: {e}"));
			}
			Err(e) => warn!(stream, error = %e, "stream read failed"),
		}
	}

	debug!(status = result.status, signaled = result.signaled, "remote command finished");
	let _ = tx.send(ExecEvent::Exit(result)).await;
}
