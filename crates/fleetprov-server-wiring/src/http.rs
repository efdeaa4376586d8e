// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client for the lab wiring service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::error::{Result, WiringError};
use crate::resolver::{annotate_cache_url, CacheAnnotations, ExposedPort, Resolver};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`Resolver`] backed by the wiring service HTTP API.
#[derive(Debug, Clone)]
pub struct HttpWiringClient {
	http_client: Client,
	base_url: String,
	annotations: CacheAnnotations,
}

#[derive(Debug, Deserialize)]
struct AddressResponse {
	address: String,
}

#[derive(Debug, Serialize)]
struct ExposeRequest {
	local_port: u16,
	require_proxy: bool,
}

#[derive(Debug, Serialize)]
struct CacheRequest<'a> {
	url: &'a str,
}

#[derive(Debug, Deserialize)]
struct CacheResponse {
	url: String,
}

impl HttpWiringClient {
	pub fn new(base_url: impl Into<String>) -> Result<Self> {
		let http_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
		Ok(Self {
			http_client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			annotations: CacheAnnotations::default(),
		})
	}

	/// Task and build identifiers appended to every cache URL.
	pub fn with_annotations(mut self, annotations: CacheAnnotations) -> Self {
		self.annotations = annotations;
		self
	}

	fn dut_url(&self, name: &str, action: &str) -> String {
		format!("{}/v1/duts/{}/{}", self.base_url, name, action)
	}

	async fn check(response: reqwest::Response, name: &str) -> Result<reqwest::Response> {
		let status = response.status();
		if status.is_success() {
			return Ok(response);
		}
		if status == reqwest::StatusCode::NOT_FOUND {
			return Err(WiringError::UnknownDevice(name.to_string()));
		}
		let message = response.text().await.unwrap_or_default();
		error!(status = %status, dut = name, "wiring service returned an error");
		Err(WiringError::Api {
			status: status.as_u16(),
			message,
		})
	}
}

#[async_trait]
impl Resolver for HttpWiringClient {
	#[instrument(skip(self))]
	async fn resolve(&self, name: &str, port: Option<u16>) -> Result<String> {
		let mut request = self.http_client.get(self.dut_url(name, "address"));
		if let Some(port) = port {
			request = request.query(&[("port", port)]);
		}
		let response = Self::check(request.send().await?, name).await?;
		let body: AddressResponse = response.json().await?;
		debug!(dut = name, address = %body.address, "resolved device address");
		Ok(body.address)
	}

	#[instrument(skip(self))]
	async fn expose_local_port(
		&self,
		name: &str,
		local_port: u16,
		require_proxy: bool,
	) -> Result<ExposedPort> {
		let response = self
			.http_client
			.post(self.dut_url(name, "expose"))
			.json(&ExposeRequest {
				local_port,
				require_proxy,
			})
			.send()
			.await?;
		let exposed: ExposedPort = Self::check(response, name).await?.json().await?;
		debug!(dut = name, address = %exposed.address, port = exposed.port, "exposed local port");
		Ok(exposed)
	}

	#[instrument(skip(self))]
	async fn cache_artifact(&self, url: &str, name: &str) -> Result<String> {
		let response = self
			.http_client
			.post(self.dut_url(name, "cache"))
			.json(&CacheRequest { url })
			.send()
			.await?;
		let body: CacheResponse = Self::check(response, name).await?.json().await?;
		annotate_cache_url(&body.url, &self.annotations)
	}
}
