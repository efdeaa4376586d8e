// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The connection trait and the remote process handle it produces.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// A live connection to one device.
///
/// Each call to [`SshClient::exec`] opens exactly one remote session.
#[async_trait]
pub trait SshClient: Send + Sync {
	/// Address this connection was opened against.
	fn address(&self) -> &str;

	/// Establish (or confirm) the underlying transport.
	async fn connect(&self) -> Result<()>;

	/// Start `command` in a new remote session.
	///
	/// Fails only if the session itself could not be created; a command that
	/// starts and exits non-zero is reported through the exit future from
	/// [`RemoteProcess::into_parts`].
	async fn exec(&self, command: &str) -> Result<RemoteProcess>;
}

/// How a remote process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemoteExitStatus {
	pub code: Option<i32>,
	pub signal: Option<i32>,
}

impl RemoteExitStatus {
	pub fn exited(code: i32) -> Self {
		Self {
			code: Some(code),
			signal: None,
		}
	}

	pub fn signaled(signal: i32) -> Self {
		Self {
			code: None,
			signal: Some(signal),
		}
	}

	pub fn success(&self) -> bool {
		self.code == Some(0)
	}
}

impl fmt::Display for RemoteExitStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match (self.code, self.signal) {
			(Some(code), _) => write!(f, "exit status {code}"),
			(None, Some(signal)) => write!(f, "signal {signal}"),
			(None, None) => write!(f, "unknown status"),
		}
	}
}

/// Handle to a process started by [`SshClient::exec`].
pub struct RemoteProcess {
	pub stdin: Option<Box<dyn AsyncWrite + Send + Unpin>>,
	pub stdout: Box<dyn AsyncRead + Send + Unpin>,
	pub stderr: Box<dyn AsyncRead + Send + Unpin>,
	exit: BoxFuture<'static, Result<RemoteExitStatus>>,
}

impl RemoteProcess {
	pub fn new(
		stdin: Option<Box<dyn AsyncWrite + Send + Unpin>>,
		stdout: Box<dyn AsyncRead + Send + Unpin>,
		stderr: Box<dyn AsyncRead + Send + Unpin>,
		exit: impl Future<Output = Result<RemoteExitStatus>> + Send + 'static,
	) -> Self {
		Self {
			stdin,
			stdout,
			stderr,
			exit: exit.boxed(),
		}
	}

	/// Split into stdin, stdout, stderr and the exit future.
	#[allow(clippy::type_complexity)]
	pub fn into_parts(
		self,
	) -> (
		Option<Box<dyn AsyncWrite + Send + Unpin>>,
		Box<dyn AsyncRead + Send + Unpin>,
		Box<dyn AsyncRead + Send + Unpin>,
		BoxFuture<'static, Result<RemoteExitStatus>>,
	) {
		(self.stdin, self.stdout, self.stderr, self.exit)
	}
}

/// Fully captured result of a remote command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
	pub stdout: Vec<u8>,
	pub stderr: Vec<u8>,
	pub status: RemoteExitStatus,
}

impl CommandOutput {
	pub fn success(&self) -> bool {
		self.status.success()
	}

	pub fn stdout_lossy(&self) -> String {
		String::from_utf8_lossy(&self.stdout).into_owned()
	}

	pub fn stderr_lossy(&self) -> String {
		String::from_utf8_lossy(&self.stderr).into_owned()
	}
}
