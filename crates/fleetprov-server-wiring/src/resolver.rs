// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;

/// Address and port a device can use to reach a port exposed on this host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposedPort {
	pub address: String,
	pub port: u16,
}

/// Identifiers attached to cache URLs so downloads can be traced back to the
/// task and build that requested them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheAnnotations {
	pub task_id: Option<String>,
	pub build_id: Option<String>,
}

/// Turns logical device names into reachable endpoints.
#[async_trait]
pub trait Resolver: Send + Sync {
	/// Resolve `name` (and an optional explicit SSH port) to `host:port`.
	async fn resolve(&self, name: &str, port: Option<u16>) -> Result<String>;

	/// Make `local_port` on this host reachable from device `name`.
	async fn expose_local_port(
		&self,
		name: &str,
		local_port: u16,
		require_proxy: bool,
	) -> Result<ExposedPort>;

	/// Rewrite storage `url` so device `name` fetches it through the cache.
	async fn cache_artifact(&self, url: &str, name: &str) -> Result<String>;
}

/// Append task/build annotations to a cache URL.
pub fn annotate_cache_url(url: &str, annotations: &CacheAnnotations) -> Result<String> {
	let mut parsed = Url::parse(url)?;
	{
		let mut pairs = parsed.query_pairs_mut();
		if let Some(task_id) = &annotations.task_id {
			pairs.append_pair("task_id", task_id);
		}
		if let Some(build_id) = &annotations.build_id {
			pairs.append_pair("build_id", build_id);
		}
	}
	let out = parsed.to_string();
	Ok(out.strip_suffix('?').map(str::to_string).unwrap_or(out))
}
