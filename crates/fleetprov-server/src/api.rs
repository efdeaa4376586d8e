// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application state and router.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use fleetprov_common_ssh::{ConnectionPool, SshOptions, SshPool};
use fleetprov_server_config::{ServerConfig, WiringConfig};
use fleetprov_server_operations::OperationStore;
use fleetprov_server_provisioning::{ProvisionTimeouts, ProvisioningService};
use fleetprov_server_resources::{FakeOriginConfig, ResourceRegistry};
use fleetprov_server_wiring::{CacheAnnotations, HttpWiringClient, Resolver, StaticResolver};
use tracing::info;

use crate::error::ServerError;
use crate::routes;

const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(10 * 60);

/// Shared collaborators, one instance per process.
#[derive(Clone)]
pub struct AppState {
	pub pool: Arc<dyn ConnectionPool>,
	pub resolver: Arc<dyn Resolver>,
	pub operations: Arc<OperationStore>,
	pub provisioning: ProvisioningService,
	pub resources: Arc<ResourceRegistry>,
	pub fake_origin: Arc<FakeOriginConfig>,
	pub exec_chunk_size: usize,
	/// Cap on the timeout a caller may request when waiting on an operation.
	pub max_wait: Duration,
}

impl AppState {
	pub fn new(
		pool: Arc<dyn ConnectionPool>,
		resolver: Arc<dyn Resolver>,
		timeouts: ProvisionTimeouts,
	) -> Self {
		let operations = Arc::new(OperationStore::new());
		let provisioning = ProvisioningService::new(
			Arc::clone(&pool),
			Arc::clone(&resolver),
			Arc::clone(&operations),
			timeouts,
		);
		Self {
			pool,
			resolver,
			operations,
			provisioning,
			resources: Arc::new(ResourceRegistry::new()),
			fake_origin: Arc::new(FakeOriginConfig::default()),
			exec_chunk_size: DEFAULT_CHUNK_SIZE,
			max_wait: DEFAULT_MAX_WAIT,
		}
	}
}

fn ssh_options(config: &ServerConfig) -> SshOptions {
	SshOptions {
		user: config.ssh.user.clone(),
		default_port: config.ssh.port,
		identity_file: config.ssh.identity_file.clone(),
		connect_timeout: config.ssh.connect_timeout,
		control_dir: config.ssh.control_dir.clone(),
		control_persist: config.ssh.control_persist,
		strict_host_key_checking: config.ssh.strict_host_key_checking,
	}
}

fn provision_timeouts(config: &ServerConfig) -> ProvisionTimeouts {
	let p = &config.provision;
	ProvisionTimeouts {
		overall: p.overall_timeout,
		initial_connect: p.initial_connect_timeout,
		reboot_reconnect: p.reboot_reconnect_timeout,
		ui_stabilize: p.ui_stabilize_timeout,
		kernel_stickiness: p.kernel_stickiness_timeout,
		verify: p.verify_timeout,
		poll_interval: p.poll_interval,
		..ProvisionTimeouts::default()
	}
}

fn build_resolver(wiring: &WiringConfig) -> Result<Arc<dyn Resolver>, ServerError> {
	let annotations = CacheAnnotations {
		task_id: wiring.task_id.clone(),
		build_id: wiring.build_id.clone(),
	};
	if let Some(base_url) = &wiring.base_url {
		info!(%base_url, "using wiring service for device resolution");
		let client = HttpWiringClient::new(base_url.as_str())?.with_annotations(annotations);
		return Ok(Arc::new(client));
	}

	info!(hosts = wiring.hosts.len(), "using static device map");
	let mut resolver = StaticResolver::new(wiring.hosts.clone(), wiring.advertise_host.clone())
		.with_annotations(annotations);
	if let Some(cache_base) = &wiring.cache_base {
		resolver = resolver.with_cache_base(cache_base.as_str());
	}
	Ok(Arc::new(resolver))
}

/// Build the process-wide state from resolved configuration.
pub fn create_app_state(config: &ServerConfig) -> Result<AppState, ServerError> {
	let pool: Arc<dyn ConnectionPool> = Arc::new(SshPool::new(ssh_options(config)));
	let resolver = build_resolver(&config.wiring)?;

	let mut state = AppState::new(pool, resolver, provision_timeouts(config));
	state.fake_origin = Arc::new(FakeOriginConfig {
		binary: config.fake_origin.binary.clone(),
		runtime_root: config.fake_origin.runtime_root.clone(),
		bind_host: config.fake_origin.bind_host.clone(),
		startup_timeout: config.fake_origin.startup_timeout,
	});
	state.exec_chunk_size = config.exec.chunk_size;
	state.max_wait = config.operations.max_wait;
	Ok(state)
}

pub fn create_router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(routes::health::health_check))
		.route("/v1/provision", post(routes::provision::provision))
		.route(
			"/v1/provision-lacros",
			post(routes::provision::provision_lacros),
		)
		.route("/v1/operations/{id}", get(routes::operations::get_operation))
		.route(
			"/v1/operations/{id}/wait",
			post(routes::operations::wait_operation),
		)
		.route("/v1/exec", post(routes::exec::exec))
		.route("/v1/fake-origins", post(routes::resources::create_fake_origin))
		.route(
			"/v1/resources/{kind}/{id}",
			delete(routes::resources::delete_resource),
		)
		.with_state(state)
}
