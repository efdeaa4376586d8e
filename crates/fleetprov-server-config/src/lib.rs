// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the fleetprov server.
//!
//! Layered from built-in defaults, a TOML file and `FLEETPROV_*`
//! environment variables, in increasing precedence.
//!
//! ```ignore
//! use fleetprov_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("listening on {}", config.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub ssh: SshConfig,
	pub provision: ProvisionConfig,
	pub operations: OperationsConfig,
	pub wiring: WiringConfig,
	pub fake_origin: FakeOriginConfig,
	pub exec: ExecConfig,
	pub logging: LoggingConfig,
}

impl ServerConfig {
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`FLEETPROV_*`)
/// 2. Config file (`/etc/fleetprov/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let config = ServerConfig {
		http: layer.http.unwrap_or_default().finalize(),
		ssh: layer.ssh.unwrap_or_default().finalize(),
		provision: layer.provision.unwrap_or_default().finalize(),
		operations: layer.operations.unwrap_or_default().finalize(),
		wiring: layer.wiring.unwrap_or_default().finalize(),
		fake_origin: layer.fake_origin.unwrap_or_default().finalize(),
		exec: layer.exec.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		host = %config.http.host,
		port = config.http.port,
		ssh_user = %config.ssh.user,
		wiring_service = config.wiring.base_url.is_some(),
		static_hosts = config.wiring.hosts.len(),
		overall_timeout_secs = config.provision.overall_timeout.as_secs(),
		retention_secs = config.operations.retention.as_secs(),
		"Server configuration loaded"
	);

	Ok(config)
}

fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
	config.provision.validate()?;
	config.wiring.validate()?;
	config.exec.validate()?;

	if config.operations.retention.is_zero() {
		return Err(ConfigError::Validation(
			"operations.retention_secs must be greater than zero".to_string(),
		));
	}

	Ok(())
}
