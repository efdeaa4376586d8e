// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Resolver over a fixed host map, for labs without a wiring service.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{Result, WiringError};
use crate::resolver::{annotate_cache_url, CacheAnnotations, ExposedPort, Resolver};

const DEFAULT_SSH_PORT: u16 = 22;

/// [`Resolver`] backed by a static `name -> host` map.
///
/// Devices are assumed to reach this host directly at `advertise_host`, so
/// exposing a local port is the identity mapping.
#[derive(Debug, Clone)]
pub struct StaticResolver {
	hosts: HashMap<String, String>,
	advertise_host: String,
	cache_base: Option<String>,
	annotations: CacheAnnotations,
}

impl StaticResolver {
	pub fn new(hosts: HashMap<String, String>, advertise_host: impl Into<String>) -> Self {
		Self {
			hosts,
			advertise_host: advertise_host.into(),
			cache_base: None,
			annotations: CacheAnnotations::default(),
		}
	}

	/// Base URL of the artifact cache (`http://cache:8082`).
	pub fn with_cache_base(mut self, cache_base: impl Into<String>) -> Self {
		self.cache_base = Some(cache_base.into().trim_end_matches('/').to_string());
		self
	}

	pub fn with_annotations(mut self, annotations: CacheAnnotations) -> Self {
		self.annotations = annotations;
		self
	}
}

fn has_port(host: &str) -> bool {
	if let Some(rest) = host.strip_prefix('[') {
		return rest.contains("]:");
	}
	host.matches(':').count() == 1
}

fn bare_host(host: &str) -> &str {
	if has_port(host) {
		host.rsplit_once(':').map_or(host, |(h, _)| h)
	} else {
		host
	}
}

fn join_host_port(host: &str, port: u16) -> String {
	let host = bare_host(host);
	if host.contains(':') && !host.starts_with('[') {
		format!("[{host}]:{port}")
	} else {
		format!("{host}:{port}")
	}
}

#[async_trait]
impl Resolver for StaticResolver {
	#[instrument(skip(self))]
	async fn resolve(&self, name: &str, port: Option<u16>) -> Result<String> {
		let host = self
			.hosts
			.get(name)
			.ok_or_else(|| WiringError::UnknownDevice(name.to_string()))?;
		let address = match port {
			Some(port) => join_host_port(host, port),
			None if has_port(host) => host.clone(),
			None => join_host_port(host, DEFAULT_SSH_PORT),
		};
		debug!(dut = name, %address, "resolved from static map");
		Ok(address)
	}

	async fn expose_local_port(
		&self,
		name: &str,
		local_port: u16,
		_require_proxy: bool,
	) -> Result<ExposedPort> {
		if !self.hosts.contains_key(name) {
			return Err(WiringError::UnknownDevice(name.to_string()));
		}
		Ok(ExposedPort {
			address: self.advertise_host.clone(),
			port: local_port,
		})
	}

	async fn cache_artifact(&self, url: &str, _name: &str) -> Result<String> {
		let cache_base = self.cache_base.as_ref().ok_or(WiringError::CacheUnavailable)?;
		let parsed = Url::parse(url)?;
		if parsed.scheme() != "gs" {
			return Err(WiringError::InvalidUrl {
				url: url.to_string(),
				message: "expected a gs:// URL".to_string(),
			});
		}
		let bucket = parsed.host_str().ok_or_else(|| WiringError::InvalidUrl {
			url: url.to_string(),
			message: "missing bucket".to_string(),
		})?;
		let cached = format!("{cache_base}/download/{bucket}{}", parsed.path());
		annotate_cache_url(&cached, &self.annotations)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn resolver() -> StaticResolver {
		let mut hosts = HashMap::new();
		hosts.insert("dut-1".to_string(), "10.0.0.5".to_string());
		hosts.insert("dut-2".to_string(), "10.0.0.6:2200".to_string());
		hosts.insert("dut-v6".to_string(), "fe80::1".to_string());
		StaticResolver::new(hosts, "10.0.0.1").with_cache_base("http://cache:8082/")
	}

	#[tokio::test]
	async fn test_resolve_defaults_to_ssh_port() {
		assert_eq!(resolver().resolve("dut-1", None).await.unwrap(), "10.0.0.5:22");
	}

	#[tokio::test]
	async fn test_resolve_explicit_port_overrides_map() {
		let r = resolver();
		assert_eq!(r.resolve("dut-2", None).await.unwrap(), "10.0.0.6:2200");
		assert_eq!(r.resolve("dut-2", Some(22)).await.unwrap(), "10.0.0.6:22");
	}

	#[tokio::test]
	async fn test_resolve_brackets_ipv6() {
		assert_eq!(
			resolver().resolve("dut-v6", None).await.unwrap(),
			"[fe80::1]:22"
		);
	}

	#[tokio::test]
	async fn test_resolve_unknown() {
		assert!(matches!(
			resolver().resolve("nope", None).await,
			Err(WiringError::UnknownDevice(_))
		));
	}

	#[tokio::test]
	async fn test_expose_uses_advertise_host() {
		let exposed = resolver().expose_local_port("dut-1", 4100, false).await.unwrap();
		assert_eq!(exposed.address, "10.0.0.1");
		assert_eq!(exposed.port, 4100);
	}

	#[tokio::test]
	async fn test_cache_rewrites_gs_url() {
		let url = resolver()
			.with_annotations(CacheAnnotations {
				task_id: Some("t".to_string()),
				build_id: Some("b".to_string()),
			})
			.cache_artifact("gs://images/eve-release/R120/full.bin", "dut-1")
			.await
			.unwrap();
		assert_eq!(
			url,
			"http://cache:8082/download/images/eve-release/R120/full.bin?task_id=t&build_id=b"
		);
	}

	#[tokio::test]
	async fn test_cache_rejects_non_gs() {
		assert!(matches!(
			resolver().cache_artifact("http://x/y", "dut-1").await,
			Err(WiringError::InvalidUrl { .. })
		));
	}

	#[tokio::test]
	async fn test_cache_without_base() {
		let r = StaticResolver::new(HashMap::new(), "h");
		assert!(matches!(
			r.cache_artifact("gs://a/b", "d").await,
			Err(WiringError::CacheUnavailable)
		));
	}
}
