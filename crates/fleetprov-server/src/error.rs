// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fleetprov_server_operations::OperationError;
use fleetprov_server_provisioning::{ProvisionError, ReasonTag};
use fleetprov_server_resources::ResourceError;
use fleetprov_server_wiring::WiringError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
	#[error("bad request: {0}")]
	BadRequest(String),
	#[error("not found: {0}")]
	NotFound(String),
	#[error("conflict: {0}")]
	Conflict(String),
	#[error("internal error: {0}")]
	Internal(String),
	#[error(transparent)]
	Provision(#[from] ProvisionError),
	#[error(transparent)]
	Operation(#[from] OperationError),
	#[error(transparent)]
	Resource(#[from] ResourceError),
	#[error(transparent)]
	Wiring(#[from] WiringError),
	#[error(transparent)]
	Config(#[from] fleetprov_server_config::ConfigError),
	#[error(transparent)]
	Ssh(#[from] fleetprov_common_ssh::SshError),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
	pub error: String,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
}

impl ServerError {
	fn parts(&self) -> (StatusCode, &'static str, Option<ReasonTag>) {
		match self {
			ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_argument", None),
			ServerError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", None),
			ServerError::Conflict(_) => (StatusCode::CONFLICT, "already_exists", None),
			ServerError::Internal(_) | ServerError::Config(_) | ServerError::Ssh(_) => {
				(StatusCode::INTERNAL_SERVER_ERROR, "internal", None)
			}
			ServerError::Provision(e) => {
				let reason = e.reason();
				let status = match reason {
					ReasonTag::InvalidRequest => StatusCode::BAD_REQUEST,
					ReasonTag::DutUnreachablePreProvision => StatusCode::SERVICE_UNAVAILABLE,
					ReasonTag::ProvisioningFailed => StatusCode::INTERNAL_SERVER_ERROR,
					ReasonTag::ProvisioningTimedOut => StatusCode::GATEWAY_TIMEOUT,
					ReasonTag::UpdateFirmwareFailed => StatusCode::PRECONDITION_FAILED,
				};
				(status, reason.code(), Some(reason))
			}
			ServerError::Operation(e) => match e {
				OperationError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", None),
				OperationError::AlreadyDone { .. } => {
					(StatusCode::CONFLICT, "failed_precondition", None)
				}
			},
			ServerError::Resource(e) => match e {
				ResourceError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", None),
				ResourceError::AlreadyExists(_) => (StatusCode::CONFLICT, "already_exists", None),
				ResourceError::InvalidRequest(_) => {
					(StatusCode::BAD_REQUEST, "invalid_argument", None)
				}
				ResourceError::Wiring(WiringError::UnknownDevice(_)) => {
					(StatusCode::BAD_REQUEST, "invalid_argument", None)
				}
				ResourceError::StartupTimeout(_) => {
					(StatusCode::GATEWAY_TIMEOUT, "deadline_exceeded", None)
				}
				_ => (StatusCode::INTERNAL_SERVER_ERROR, "internal", None),
			},
			ServerError::Wiring(e) => match e {
				WiringError::UnknownDevice(_) | WiringError::InvalidUrl { .. } => {
					(StatusCode::BAD_REQUEST, "invalid_argument", None)
				}
				_ => (StatusCode::BAD_GATEWAY, "unavailable", None),
			},
		}
	}
}

impl IntoResponse for ServerError {
	fn into_response(self) -> Response {
		let (status, code, reason) = self.parts();
		if status.is_server_error() {
			tracing::error!(error = %self, code, "request failed");
		} else {
			tracing::debug!(error = %self, code, "request rejected");
		}
		let body = ErrorResponse {
			error: code.to_string(),
			message: self.to_string(),
			reason: reason.map(|r| r.as_str().to_string()),
		};
		(status, Json(body)).into_response()
	}
}
