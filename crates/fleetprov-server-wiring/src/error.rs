// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WiringError>;

/// Errors returned by reachability resolvers.
#[derive(Error, Debug)]
pub enum WiringError {
	#[error("unknown device: {0}")]
	UnknownDevice(String),

	#[error("invalid storage URL {url}: {message}")]
	InvalidUrl { url: String, message: String },

	#[error("artifact cache is not configured")]
	CacheUnavailable,

	#[error("HTTP request failed: {0}")]
	Http(#[from] reqwest::Error),

	#[error("wiring service error: {status} - {message}")]
	Api { status: u16, message: String },

	#[error("URL parse error: {0}")]
	UrlParse(#[from] url::ParseError),
}
