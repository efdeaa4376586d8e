// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{ResourceError, Result};

/// A resource that holds something that must be released explicitly.
#[async_trait]
pub trait Closable: Send + Sync {
	async fn close(&self) -> Result<()>;
}

/// Generate a unique resource name in the `kind` namespace (`kind/<uuid>`).
pub fn generate_name(kind: &str) -> String {
	format!("{kind}/{}", Uuid::new_v4())
}

/// Named registry of live ephemeral resources.
///
/// Removal happens under the lock, so concurrent deletes of the same name
/// see exactly one winner and the resource is closed once.
#[derive(Default)]
pub struct ResourceRegistry {
	resources: Mutex<HashMap<String, Arc<dyn Closable>>>,
}

impl ResourceRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn create(&self, name: &str, resource: Arc<dyn Closable>) -> Result<()> {
		let mut resources = self.resources.lock();
		if resources.contains_key(name) {
			return Err(ResourceError::AlreadyExists(name.to_string()));
		}
		resources.insert(name.to_string(), resource);
		info!(resource = name, "resource registered");
		Ok(())
	}

	pub fn get(&self, name: &str) -> Option<Arc<dyn Closable>> {
		self.resources.lock().get(name).cloned()
	}

	/// Remove `name` and hand the resource back to the caller.
	pub fn delete(&self, name: &str) -> Result<Arc<dyn Closable>> {
		self.resources
			.lock()
			.remove(name)
			.ok_or_else(|| ResourceError::NotFound(name.to_string()))
	}

	/// Remove `name` and close it. A close failure is returned but the
	/// resource stays unregistered.
	#[instrument(skip(self))]
	pub async fn delete_and_close(&self, name: &str) -> Result<()> {
		let resource = self.delete(name)?;
		resource.close().await.map_err(|e| {
			warn!(resource = name, error = %e, "closing resource failed");
			ResourceError::Close {
				name: name.to_string(),
				message: e.to_string(),
			}
		})?;
		info!(resource = name, "resource closed");
		Ok(())
	}

	/// Close every registered resource. Returns the number that failed.
	#[instrument(skip(self))]
	pub async fn close_all(&self) -> usize {
		let drained: Vec<(String, Arc<dyn Closable>)> = self.resources.lock().drain().collect();
		let mut failures = 0;
		for (name, resource) in drained {
			if let Err(e) = resource.close().await {
				warn!(resource = %name, error = %e, "closing resource during shutdown failed");
				failures += 1;
			}
		}
		failures
	}

	pub fn names(&self) -> Vec<String> {
		let mut names: Vec<String> = self.resources.lock().keys().cloned().collect();
		names.sort();
		names
	}

	pub fn len(&self) -> usize {
		self.resources.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.resources.lock().is_empty()
	}
}
