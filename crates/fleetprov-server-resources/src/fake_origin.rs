// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fake update-origin servers.
//!
//! A fake origin is a local update server process that answers a device's
//! update checks with payloads taken from an image storage prefix. It binds
//! an ephemeral port on this host, which is then exposed to the device
//! through the reachability resolver.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetprov_server_wiring::{ExposedPort, Resolver};
use serde::Deserialize;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{ResourceError, Result};
use crate::registry::{generate_name, Closable, ResourceRegistry};

pub const FAKE_ORIGIN_KIND: &str = "fakeOrigin";

#[derive(Debug, Clone)]
pub struct FakeOriginConfig {
	/// Update server executable.
	pub binary: PathBuf,
	/// Parent directory for per-server runtime directories.
	pub runtime_root: PathBuf,
	pub bind_host: String,
	pub startup_timeout: Duration,
}

impl Default for FakeOriginConfig {
	fn default() -> Self {
		Self {
			binary: PathBuf::from("/usr/local/bin/fake-update-origin"),
			runtime_root: std::env::temp_dir().join("fleetprov-fake-origin"),
			bind_host: "127.0.0.1".to_string(),
			startup_timeout: Duration::from_secs(30),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FakeOriginRequest {
	pub dut_name: String,
	/// Storage prefix of the build whose payloads are served.
	pub image_path: String,
	/// Payload kinds to serve (`full`, `stateful`, ...). Empty means all.
	#[serde(default)]
	pub payloads: Vec<String>,
	#[serde(default)]
	pub require_proxy: bool,
	/// Mark the offered update as critical so the device installs it.
	#[serde(default)]
	pub critical_update: bool,
	/// Answer every check with no-update.
	#[serde(default)]
	pub no_update: bool,
	/// Start answering no-update after this many update checks.
	#[serde(default)]
	pub return_noupdate_starting: Option<u32>,
}

/// Result of creating a fake origin: its resource name and the URL the
/// device should use as its update server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeOrigin {
	pub name: String,
	pub update_url: String,
}

/// A running fake origin process.
pub struct FakeOriginServer {
	port: u16,
	child: Mutex<Option<Child>>,
	runtime_dir: Mutex<Option<TempDir>>,
}

impl FakeOriginServer {
	/// Spawn the server on an ephemeral port and wait until it reports the
	/// port it bound.
	#[instrument(skip(config, payloads), fields(binary = %config.binary.display()))]
	pub async fn start(config: &FakeOriginConfig, source_url: &str, payloads: &[String]) -> Result<Self> {
		tokio::fs::create_dir_all(&config.runtime_root).await?;
		let runtime_dir = tempfile::Builder::new()
			.prefix("origin-")
			.tempdir_in(&config.runtime_root)?;

		let mut command = Command::new(&config.binary);
		command
			.arg("--host")
			.arg(&config.bind_host)
			.arg("--port")
			.arg("0")
			.arg("--runtime-root")
			.arg(runtime_dir.path())
			.arg("--payload-url")
			.arg(source_url);
		if !payloads.is_empty() {
			command.arg("--payloads").arg(payloads.join(","));
		}
		command
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);

		let mut child = command.spawn().map_err(ResourceError::Spawn)?;
		let stdout = child.stdout.take().ok_or(ResourceError::EarlyExit)?;
		let mut lines = BufReader::new(stdout).lines();

		let port = match tokio::time::timeout(config.startup_timeout, read_port(&mut lines)).await {
			Ok(Ok(port)) => port,
			Ok(Err(e)) => {
				let _ = child.kill().await;
				return Err(e);
			}
			Err(_) => {
				let _ = child.kill().await;
				return Err(ResourceError::StartupTimeout(config.startup_timeout));
			}
		};

		tokio::spawn(forward_output(lines, "stdout"));
		if let Some(stderr) = child.stderr.take() {
			tokio::spawn(forward_output(BufReader::new(stderr).lines(), "stderr"));
		}

		info!(port, "fake origin listening");
		Ok(Self {
			port,
			child: Mutex::new(Some(child)),
			runtime_dir: Mutex::new(Some(runtime_dir)),
		})
	}

	pub fn port(&self) -> u16 {
		self.port
	}
}

#[async_trait]
impl Closable for FakeOriginServer {
	async fn close(&self) -> Result<()> {
		if let Some(mut child) = self.child.lock().await.take() {
			child.kill().await?;
			debug!(port = self.port, "fake origin stopped");
		}
		if let Some(dir) = self.runtime_dir.lock().await.take() {
			dir.close()?;
		}
		Ok(())
	}
}

async fn read_port(lines: &mut Lines<BufReader<ChildStdout>>) -> Result<u16> {
	while let Some(line) = lines.next_line().await? {
		debug!(%line, "fake origin output");
		if let Some(port) = parse_listening_port(&line) {
			return Ok(port);
		}
	}
	Err(ResourceError::EarlyExit)
}

async fn forward_output<R: AsyncRead + Unpin>(mut lines: Lines<BufReader<R>>, stream: &'static str) {
	while let Ok(Some(line)) = lines.next_line().await {
		debug!(stream, %line, "fake origin output");
	}
}

/// Extract the port from a line like `Listening on http://127.0.0.1:41234`.
fn parse_listening_port(line: &str) -> Option<u16> {
	let lower = line.to_lowercase();
	if !(lower.contains("listening") || lower.contains("started")) {
		return None;
	}
	let start = line.find("http://")?;
	let rest = &line[start..];
	let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
	Url::parse(&rest[..end]).ok()?.port()
}

/// Build the update URL a device should use to reach `exposed`.
pub fn build_update_url(exposed: &ExposedPort, request: &FakeOriginRequest) -> Result<String> {
	let host = if exposed.address.contains(':') && !exposed.address.starts_with('[') {
		format!("[{}]", exposed.address)
	} else {
		exposed.address.clone()
	};
	let mut url = Url::parse(&format!("http://{host}:{}/update", exposed.port))
		.map_err(|e| ResourceError::InvalidRequest(format!("bad exposed address: {e}")))?;
	{
		let mut query = url.query_pairs_mut();
		if request.critical_update {
			query.append_pair("critical_update", "True");
		}
		if request.no_update {
			query.append_pair("no_update", "True");
		}
		if let Some(n) = request.return_noupdate_starting {
			query.append_pair("return_noupdate_starting", &n.to_string());
		}
	}
	let out = url.to_string();
	Ok(out.strip_suffix('?').map(str::to_string).unwrap_or(out))
}

/// Start a fake origin for `request`, expose it to the device and register
/// it under a generated `fakeOrigin/<uuid>` name.
#[instrument(skip_all, fields(dut = %request.dut_name))]
pub async fn create_fake_origin(
	registry: &ResourceRegistry,
	resolver: &dyn Resolver,
	config: &FakeOriginConfig,
	request: &FakeOriginRequest,
) -> Result<FakeOrigin> {
	if request.dut_name.is_empty() {
		return Err(ResourceError::InvalidRequest("dut name is required".to_string()));
	}
	if request.image_path.is_empty() {
		return Err(ResourceError::InvalidRequest("image path is required".to_string()));
	}

	let source_url = resolver
		.cache_artifact(&request.image_path, &request.dut_name)
		.await?;
	let server = FakeOriginServer::start(config, &source_url, &request.payloads).await?;

	let exposed = match resolver
		.expose_local_port(&request.dut_name, server.port(), request.require_proxy)
		.await
	{
		Ok(exposed) => exposed,
		Err(e) => {
			if let Err(close_err) = server.close().await {
				warn!(error = %close_err, "failed to stop fake origin after expose failure");
			}
			return Err(e.into());
		}
	};

	let update_url = match build_update_url(&exposed, request) {
		Ok(url) => url,
		Err(e) => {
			let _ = server.close().await;
			return Err(e);
		}
	};

	let name = generate_name(FAKE_ORIGIN_KIND);
	registry.create(&name, Arc::new(server))?;
	info!(resource = %name, %update_url, "fake origin created");

	Ok(FakeOrigin { name, update_url })
}

#[cfg(test)]
mod tests {
	use super::*;
	use fleetprov_server_wiring::StaticResolver;
	use std::collections::HashMap;
	use std::os::unix::fs::PermissionsExt;

	fn write_script(dir: &std::path::Path, body: &str) -> PathBuf {
		let path = dir.join("origin.sh");
		std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
		std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
		path
	}

	fn config(dir: &std::path::Path, binary: PathBuf) -> FakeOriginConfig {
		FakeOriginConfig {
			binary,
			runtime_root: dir.join("runtime"),
			bind_host: "127.0.0.1".to_string(),
			startup_timeout: Duration::from_secs(5),
		}
	}

	fn resolver() -> StaticResolver {
		let mut hosts = HashMap::new();
		hosts.insert("dut-1".to_string(), "10.0.0.5".to_string());
		StaticResolver::new(hosts, "10.0.0.1").with_cache_base("http://cache:8082")
	}

	#[test]
	fn test_parse_listening_port() {
		assert_eq!(
			parse_listening_port("INFO Listening on http://127.0.0.1:41234 now"),
			Some(41234)
		);
		assert_eq!(parse_listening_port("Server started at http://[::1]:9000"), Some(9000));
		assert_eq!(parse_listening_port("loading payloads from http://x:1"), None);
	}

	#[test]
	fn test_build_update_url_query() {
		let exposed = ExposedPort {
			address: "192.168.0.2".to_string(),
			port: 9001,
		};
		let request = FakeOriginRequest {
			critical_update: true,
			return_noupdate_starting: Some(2),
			..Default::default()
		};
		assert_eq!(
			build_update_url(&exposed, &request).unwrap(),
			"http://192.168.0.2:9001/update?critical_update=True&return_noupdate_starting=2"
		);
	}

	#[test]
	fn test_build_update_url_plain_and_v6() {
		let exposed = ExposedPort {
			address: "fd00::2".to_string(),
			port: 80,
		};
		assert_eq!(
			build_update_url(&exposed, &FakeOriginRequest::default()).unwrap(),
			"http://[fd00::2]:80/update"
		);
	}

	#[tokio::test]
	async fn test_start_reads_port_and_close_kills() {
		let dir = tempfile::tempdir().unwrap();
		let binary = write_script(dir.path(), "echo 'Listening on http://127.0.0.1:45678'\nexec sleep 30");
		let server = FakeOriginServer::start(&config(dir.path(), binary), "http://cache/x", &[])
			.await
			.unwrap();
		assert_eq!(server.port(), 45678);
		server.close().await.unwrap();
		server.close().await.unwrap();
	}

	#[tokio::test]
	async fn test_start_fails_when_process_exits() {
		let dir = tempfile::tempdir().unwrap();
		let binary = write_script(dir.path(), "echo starting up\nexit 1");
		let err = FakeOriginServer::start(&config(dir.path(), binary), "http://cache/x", &[])
			.await
			.err()
			.unwrap();
		assert!(matches!(err, ResourceError::EarlyExit));
	}

	#[tokio::test]
	async fn test_start_times_out() {
		let dir = tempfile::tempdir().unwrap();
		let binary = write_script(dir.path(), "exec sleep 30");
		let mut cfg = config(dir.path(), binary);
		cfg.startup_timeout = Duration::from_millis(200);
		let err = FakeOriginServer::start(&cfg, "http://cache/x", &[])
			.await
			.err()
			.unwrap();
		assert!(matches!(err, ResourceError::StartupTimeout(_)));
	}

	#[tokio::test]
	async fn test_create_registers_and_delete_closes() {
		let dir = tempfile::tempdir().unwrap();
		let binary = write_script(dir.path(), "echo 'Listening on http://127.0.0.1:45679'\nexec sleep 30");
		let registry = ResourceRegistry::new();
		let request = FakeOriginRequest {
			dut_name: "dut-1".to_string(),
			image_path: "gs://images/eve-release/R120".to_string(),
			no_update: true,
			..Default::default()
		};

		let origin = create_fake_origin(&registry, &resolver(), &config(dir.path(), binary), &request)
			.await
			.unwrap();
		assert!(origin.name.starts_with("fakeOrigin/"));
		assert_eq!(origin.update_url, "http://10.0.0.1:45679/update?no_update=True");

		registry.delete_and_close(&origin.name).await.unwrap();
		assert!(matches!(
			registry.delete_and_close(&origin.name).await,
			Err(ResourceError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn test_create_validates_request() {
		let dir = tempfile::tempdir().unwrap();
		let registry = ResourceRegistry::new();
		let err = create_fake_origin(
			&registry,
			&resolver(),
			&config(dir.path(), PathBuf::from("/nonexistent")),
			&FakeOriginRequest::default(),
		)
		.await
		.err()
		.unwrap();
		assert!(matches!(err, ResourceError::InvalidRequest(_)));
		assert!(registry.is_empty());
	}
}
