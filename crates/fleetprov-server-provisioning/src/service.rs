// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Admission and dispatch of provisioning workflows.

use std::future::Future;
use std::sync::Arc;

use fleetprov_common_ssh::{ConnectionPool, PooledConnection, RemoteShell};
use fleetprov_server_operations::{OperationStore, StructuredOperationError};
use fleetprov_server_wiring::Resolver;
use serde::Serialize;
use tracing::{error, info, instrument, warn, Instrument};

use crate::device;
use crate::error::{ProvisionError, Result};
use crate::lacros::provision_lacros;
use crate::request::{LacrosRequest, ProvisionFlags, ProvisionRequest};
use crate::session::{CurrentPhase, ProvisioningSession};
use crate::timeouts::ProvisionTimeouts;
use crate::workflow::provision;

/// Admits provisioning requests and runs each as a detached task whose only
/// link to the caller is the returned operation name.
#[derive(Clone)]
pub struct ProvisioningService {
	pool: Arc<dyn ConnectionPool>,
	resolver: Arc<dyn Resolver>,
	operations: Arc<OperationStore>,
	timeouts: ProvisionTimeouts,
}

impl ProvisioningService {
	pub fn new(
		pool: Arc<dyn ConnectionPool>,
		resolver: Arc<dyn Resolver>,
		operations: Arc<OperationStore>,
		timeouts: ProvisionTimeouts,
	) -> Self {
		Self {
			pool,
			resolver,
			operations,
			timeouts,
		}
	}

	pub fn operations(&self) -> &Arc<OperationStore> {
		&self.operations
	}

	async fn resolve(&self, dut_name: &str, port: Option<u16>) -> Result<String> {
		self.resolver
			.resolve(dut_name, port)
			.await
			.map_err(|e| ProvisionError::InvalidRequest(format!("cannot resolve {dut_name}: {e}")))
	}

	/// Validate `request`, allocate an operation and start the workflow.
	#[instrument(skip(self, request), fields(dut = %request.dut_name))]
	pub async fn admit(&self, request: ProvisionRequest) -> Result<String> {
		let image = request.validate()?;
		let address = self.resolve(&request.dut_name, request.port).await?;
		let name = self.operations.new_operation(Some(serde_json::json!({
			"kind": "provision",
			"dut": request.dut_name,
			"image": request.image_path,
		})));
		info!(operation = %name, %address, "provisioning admitted");

		let resolver = Arc::clone(&self.resolver);
		let mut session = ProvisioningSession::new(
			Arc::clone(&self.pool),
			request.dut_name.clone(),
			address.clone(),
			image,
			request.flags(),
			self.timeouts,
		);
		let dlc_specs = request.dlc_specs;
		let phase = session.current_phase();
		self.dispatch(name.clone(), address, phase, async move {
			provision(&mut session, resolver.as_ref(), &dlc_specs).await
		});
		Ok(name)
	}

	/// Validate and start a Lacros component install.
	#[instrument(skip(self, request), fields(dut = %request.dut_name))]
	pub async fn admit_lacros(&self, request: LacrosRequest) -> Result<String> {
		let image = request.validate()?;
		let address = self.resolve(&request.dut_name, request.port).await?;
		let name = self.operations.new_operation(Some(serde_json::json!({
			"kind": "provision_lacros",
			"dut": request.dut_name,
			"image": request.image_path,
		})));
		info!(operation = %name, %address, "Lacros provisioning admitted");

		let resolver = Arc::clone(&self.resolver);
		let mut session = ProvisioningSession::new(
			Arc::clone(&self.pool),
			request.dut_name.clone(),
			address.clone(),
			image,
			ProvisionFlags::default(),
			self.timeouts,
		);
		let phase = session.current_phase();
		self.dispatch(name.clone(), address, phase, async move {
			provision_lacros(&mut session, resolver.as_ref()).await
		});
		Ok(name)
	}

	fn dispatch<F, T>(&self, name: String, address: String, phase: CurrentPhase, workflow: F)
	where
		F: Future<Output = Result<T>> + Send + 'static,
		T: Serialize + Send + 'static,
	{
		let operations = Arc::clone(&self.operations);
		let pool = Arc::clone(&self.pool);
		let timeouts = self.timeouts;
		let span = tracing::info_span!("operation", operation = %name);

		tokio::spawn(
			async move {
				if let Err(e) = operations.mark_running(&name) {
					error!(error = %e, "operation vanished before it started");
					return;
				}

				let outcome = match tokio::time::timeout(timeouts.overall, workflow).await {
					Ok(outcome) => outcome,
					Err(_) => {
						let phase = phase.get();
						warn!(%phase, "outer deadline cut the workflow off");
						mark_failed_after_timeout(pool, &address, timeouts).await;
						Err(ProvisionError::TimedOut { phase })
					}
				};

				let written = match outcome {
					Ok(result) => match serde_json::to_value(&result) {
						Ok(payload) => operations.set_result(&name, payload),
						Err(e) => operations.set_error(
							&name,
							StructuredOperationError::from(&ProvisionError::failed("encode result", e)),
						),
					},
					Err(e) => {
						warn!(error = %e, reason = %e.reason(), "provisioning failed");
						operations.set_error(&name, StructuredOperationError::from(&e))
					}
				};
				if let Err(e) = written {
					error!(error = %e, "could not record operation outcome");
				}
			}
			.instrument(span),
		);
	}
}

/// Best-effort: leave the provision-failed marker on a device whose workflow
/// was cut off by the outer deadline.
async fn mark_failed_after_timeout(
	pool: Arc<dyn ConnectionPool>,
	address: &str,
	timeouts: ProvisionTimeouts,
) {
	let attempt = async {
		let conn = PooledConnection::checkout(pool, address).await?;
		conn.run(&device::touch(device::PROVISION_FAILED_MARKER)).await
	};
	match tokio::time::timeout(timeouts.timeout_marker, attempt).await {
		Ok(Ok(())) => info!("provision marker written after timeout"),
		Ok(Err(e)) => warn!(error = %e, "could not write provision marker after timeout"),
		Err(_) => warn!("timed out writing provision marker after timeout"),
	}
}
