// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Provisioning admission. Both handlers return as soon as the operation
//! exists; the workflow runs detached.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use fleetprov_server_provisioning::{LacrosRequest, ProvisionRequest};
use serde::Serialize;

use crate::api::AppState;
use crate::error::ServerError;

#[derive(Debug, Serialize)]
pub struct AdmittedResponse {
	pub operation: String,
}

/// POST /v1/provision
#[tracing::instrument(skip(state, request), fields(dut = %request.dut_name))]
pub async fn provision(
	State(state): State<AppState>,
	Json(request): Json<ProvisionRequest>,
) -> Result<(StatusCode, Json<AdmittedResponse>), ServerError> {
	let operation = state.provisioning.admit(request).await?;
	Ok((StatusCode::ACCEPTED, Json(AdmittedResponse { operation })))
}

/// POST /v1/provision-lacros
#[tracing::instrument(skip(state, request), fields(dut = %request.dut_name))]
pub async fn provision_lacros(
	State(state): State<AppState>,
	Json(request): Json<LacrosRequest>,
) -> Result<(StatusCode, Json<AdmittedResponse>), ServerError> {
	let operation = state.provisioning.admit_lacros(request).await?;
	Ok((StatusCode::ACCEPTED, Json(AdmittedResponse { operation })))
}
