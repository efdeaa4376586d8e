// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::store::OperationStore;

/// Periodic task that drops terminal operations past their retention.
pub struct RetentionCleaner {
	shutdown_tx: broadcast::Sender<()>,
	handle: Mutex<Option<JoinHandle<()>>>,
}

impl RetentionCleaner {
	#[instrument(skip(store))]
	pub fn start(store: Arc<OperationStore>, interval: Duration, retention: Duration) -> Self {
		let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

		let handle = tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = tokio::time::sleep(interval) => {
						let removed = store.cleanup_expired(retention);
						if removed > 0 {
							info!(removed, "Removed expired operations");
						} else {
							debug!("No expired operations");
						}
					}
					_ = shutdown_rx.recv() => {
						info!("Shutting down operation retention cleaner");
						break;
					}
				}
			}
		});

		Self {
			shutdown_tx,
			handle: Mutex::new(Some(handle)),
		}
	}

	pub async fn shutdown(&self) {
		let _ = self.shutdown_tx.send(());
		if let Some(handle) = self.handle.lock().await.take() {
			let _ = handle.await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[tokio::test(start_paused = true)]
	async fn test_cleaner_collects_and_shuts_down() {
		let store = Arc::new(OperationStore::new());
		let name = store.new_operation(None);
		store.set_result(&name, json!({})).unwrap();

		let cleaner = RetentionCleaner::start(
			Arc::clone(&store),
			Duration::from_secs(10),
			Duration::from_secs(5),
		);

		tokio::time::sleep(Duration::from_secs(11)).await;
		tokio::task::yield_now().await;
		assert!(store.is_empty());

		cleaner.shutdown().await;
	}
}
