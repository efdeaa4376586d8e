// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	ExecConfigLayer, FakeOriginConfigLayer, HttpConfigLayer, LogFormat, LoggingConfigLayer,
	OperationsConfigLayer, ProvisionConfigLayer, SshConfigLayer, WiringConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file yields an empty layer.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/fleetprov/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: FLEETPROV_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			http: Some(load_http_from_env()?),
			ssh: Some(load_ssh_from_env()?),
			provision: Some(load_provision_from_env()?),
			operations: Some(load_operations_from_env()?),
			wiring: Some(load_wiring_from_env()?),
			fake_origin: Some(load_fake_origin_from_env()?),
			exec: Some(load_exec_from_env()?),
			logging: Some(load_logging_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_parse<T: std::str::FromStr>(name: &str, kind: &str) -> Result<Option<T>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid {kind} value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_u16(name: &str) -> Result<Option<u16>, ConfigError> {
	env_parse(name, "u16")
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	env_parse(name, "u64")
}

fn env_usize(name: &str) -> Result<Option<usize>, ConfigError> {
	env_parse(name, "usize")
}

/// Parses `name=address` pairs separated by commas.
fn parse_host_map(key: &str, raw: &str) -> Result<HashMap<String, String>, ConfigError> {
	let mut hosts = HashMap::new();
	for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
		let (name, address) = entry
			.split_once('=')
			.map(|(n, a)| (n.trim(), a.trim()))
			.filter(|(n, a)| !n.is_empty() && !a.is_empty())
			.ok_or_else(|| ConfigError::InvalidValue {
				key: key.to_string(),
				message: format!("expected name=address, got '{entry}'"),
			})?;
		hosts.insert(name.to_string(), address.to_string());
	}
	Ok(hosts)
}

fn load_http_from_env() -> Result<HttpConfigLayer, ConfigError> {
	Ok(HttpConfigLayer {
		host: env_var("FLEETPROV_HOST"),
		port: env_u16("FLEETPROV_PORT")?,
	})
}

fn load_ssh_from_env() -> Result<SshConfigLayer, ConfigError> {
	Ok(SshConfigLayer {
		user: env_var("FLEETPROV_SSH_USER"),
		port: env_u16("FLEETPROV_SSH_PORT")?,
		identity_file: env_var("FLEETPROV_SSH_IDENTITY_FILE").map(PathBuf::from),
		connect_timeout_secs: env_u64("FLEETPROV_SSH_CONNECT_TIMEOUT_SECS")?,
		control_dir: env_var("FLEETPROV_SSH_CONTROL_DIR").map(PathBuf::from),
		control_persist_secs: env_u64("FLEETPROV_SSH_CONTROL_PERSIST_SECS")?,
		strict_host_key_checking: env_bool("FLEETPROV_SSH_STRICT_HOST_KEY_CHECKING"),
	})
}

fn load_provision_from_env() -> Result<ProvisionConfigLayer, ConfigError> {
	Ok(ProvisionConfigLayer {
		overall_timeout_secs: env_u64("FLEETPROV_PROVISION_OVERALL_TIMEOUT_SECS")?,
		initial_connect_timeout_secs: env_u64("FLEETPROV_PROVISION_INITIAL_CONNECT_TIMEOUT_SECS")?,
		reboot_reconnect_timeout_secs: env_u64(
			"FLEETPROV_PROVISION_REBOOT_RECONNECT_TIMEOUT_SECS",
		)?,
		ui_stabilize_timeout_secs: env_u64("FLEETPROV_PROVISION_UI_STABILIZE_TIMEOUT_SECS")?,
		kernel_stickiness_timeout_secs: env_u64(
			"FLEETPROV_PROVISION_KERNEL_STICKINESS_TIMEOUT_SECS",
		)?,
		verify_timeout_secs: env_u64("FLEETPROV_PROVISION_VERIFY_TIMEOUT_SECS")?,
		poll_interval_ms: env_u64("FLEETPROV_PROVISION_POLL_INTERVAL_MS")?,
	})
}

fn load_operations_from_env() -> Result<OperationsConfigLayer, ConfigError> {
	Ok(OperationsConfigLayer {
		retention_secs: env_u64("FLEETPROV_OPERATIONS_RETENTION_SECS")?,
		cleanup_interval_secs: env_u64("FLEETPROV_OPERATIONS_CLEANUP_INTERVAL_SECS")?,
		max_wait_secs: env_u64("FLEETPROV_OPERATIONS_MAX_WAIT_SECS")?,
	})
}

fn load_wiring_from_env() -> Result<WiringConfigLayer, ConfigError> {
	let hosts = match env_var("FLEETPROV_WIRING_HOSTS") {
		Some(raw) => Some(parse_host_map("FLEETPROV_WIRING_HOSTS", &raw)?),
		None => None,
	};

	Ok(WiringConfigLayer {
		base_url: env_var("FLEETPROV_WIRING_BASE_URL"),
		hosts,
		advertise_host: env_var("FLEETPROV_WIRING_ADVERTISE_HOST"),
		cache_base: env_var("FLEETPROV_WIRING_CACHE_BASE"),
		task_id: env_var("FLEETPROV_WIRING_TASK_ID"),
		build_id: env_var("FLEETPROV_WIRING_BUILD_ID"),
	})
}

fn load_fake_origin_from_env() -> Result<FakeOriginConfigLayer, ConfigError> {
	Ok(FakeOriginConfigLayer {
		binary: env_var("FLEETPROV_FAKE_ORIGIN_BINARY").map(PathBuf::from),
		runtime_root: env_var("FLEETPROV_FAKE_ORIGIN_RUNTIME_ROOT").map(PathBuf::from),
		bind_host: env_var("FLEETPROV_FAKE_ORIGIN_BIND_HOST"),
		startup_timeout_secs: env_u64("FLEETPROV_FAKE_ORIGIN_STARTUP_TIMEOUT_SECS")?,
	})
}

fn load_exec_from_env() -> Result<ExecConfigLayer, ConfigError> {
	Ok(ExecConfigLayer {
		chunk_size: env_usize("FLEETPROV_EXEC_CHUNK_SIZE")?,
	})
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	let format = match env_var("FLEETPROV_LOG_FORMAT") {
		Some(v) => Some(v.parse::<LogFormat>()?),
		None => None,
	};

	Ok(LoggingConfigLayer {
		level: env_var("FLEETPROV_LOG_LEVEL"),
		format,
	})
}
