// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Keyed, reference-counted connection pool.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::client::SshClient;
use crate::error::Result;
use crate::openssh::{OpenSshClient, SshOptions};

/// Cache of live connections keyed by device address.
///
/// Checkouts are shared, not exclusive: two callers asking for the same
/// address receive the same connection.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
	/// Check out a connection to `address`, opening one if needed.
	async fn get(&self, address: &str) -> Result<Arc<dyn SshClient>>;

	/// Return a connection previously obtained from [`ConnectionPool::get`].
	fn put(&self, address: &str, conn: Arc<dyn SshClient>);
}

/// A connection checked out of a pool for the duration of a scope.
///
/// The connection goes back to the pool when this value is dropped, on
/// every exit path.
pub struct PooledConnection {
	pool: Arc<dyn ConnectionPool>,
	address: String,
	conn: Arc<dyn SshClient>,
}

impl PooledConnection {
	/// Check out and connect.
	pub async fn checkout(pool: Arc<dyn ConnectionPool>, address: &str) -> Result<Self> {
		let conn = pool.get(address).await?;
		let guard = Self {
			pool,
			address: address.to_string(),
			conn,
		};
		guard.connect().await?;
		Ok(guard)
	}

	pub fn address(&self) -> &str {
		&self.address
	}

	/// Shared handle to the underlying connection.
	pub fn client(&self) -> Arc<dyn SshClient> {
		Arc::clone(&self.conn)
	}
}

impl Deref for PooledConnection {
	type Target = dyn SshClient;

	fn deref(&self) -> &Self::Target {
		self.conn.as_ref()
	}
}

impl Drop for PooledConnection {
	fn drop(&mut self) {
		self.pool.put(&self.address, Arc::clone(&self.conn));
	}
}

struct PoolEntry {
	client: Arc<OpenSshClient>,
	refs: usize,
}

/// [`ConnectionPool`] over multiplexed OpenSSH connections.
pub struct SshPool {
	options: SshOptions,
	entries: Mutex<HashMap<String, PoolEntry>>,
}

impl SshPool {
	pub fn new(options: SshOptions) -> Self {
		Self {
			options,
			entries: Mutex::new(HashMap::new()),
		}
	}

	/// Number of outstanding checkouts for `address`.
	pub fn checkouts(&self, address: &str) -> usize {
		self.entries.lock().get(address).map_or(0, |e| e.refs)
	}

	/// Number of addresses with a cached connection.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}
}

#[async_trait]
impl ConnectionPool for SshPool {
	#[instrument(skip(self))]
	async fn get(&self, address: &str) -> Result<Arc<dyn SshClient>> {
		let mut entries = self.entries.lock();
		if let Some(entry) = entries.get_mut(address) {
			entry.refs += 1;
			return Ok(entry.client.clone() as Arc<dyn SshClient>);
		}

		debug!(address, "opening new pooled connection");
		let client = Arc::new(OpenSshClient::new(address, self.options.clone())?);
		entries.insert(
			address.to_string(),
			PoolEntry {
				client: Arc::clone(&client),
				refs: 1,
			},
		);
		Ok(client as Arc<dyn SshClient>)
	}

	/// The last checkout of an address evicts its entry. The OpenSSH control
	/// master outlives it for `control_persist`, so a prompt re-checkout still
	/// reuses the multiplexed session.
	fn put(&self, address: &str, _conn: Arc<dyn SshClient>) {
		let mut entries = self.entries.lock();
		let Some(entry) = entries.get_mut(address) else {
			return;
		};
		entry.refs = entry.refs.saturating_sub(1);
		if entry.refs == 0 {
			entries.remove(address);
			debug!(address, "evicted idle pooled connection");
		}
	}
}
