// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Remote shell primitives for fleetprov.
//!
//! This crate provides:
//! - [`SshClient`]: a single live connection to a device that can start remote processes
//! - [`RemoteShell`]: run-to-completion, run-with-retry and capture-output helpers on top of it
//! - [`ConnectionPool`] / [`SshPool`]: a keyed, reference-counted cache of connections
//! - [`PooledConnection`]: a scoped checkout that returns its connection on drop
//! - [`OpenSshClient`]: an implementation backed by the system OpenSSH client with
//!   connection multiplexing

pub mod address;
pub mod client;
pub mod error;
pub mod openssh;
pub mod pool;
pub mod shell;

pub use address::{parse_address, shell_quote, DeviceAddress};
pub use client::{CommandOutput, RemoteExitStatus, RemoteProcess, SshClient};
pub use error::{Result, SshError};
pub use openssh::{OpenSshClient, SshOptions};
pub use pool::{ConnectionPool, PooledConnection, SshPool};
pub use shell::{RemoteShell, RetryPolicy};
