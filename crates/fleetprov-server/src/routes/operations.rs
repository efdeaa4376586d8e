// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::Json;
use fleetprov_server_operations::Operation;
use serde::Deserialize;

use crate::api::AppState;
use crate::error::ServerError;

const DEFAULT_WAIT_SECS: u64 = 60;

fn operation_name(id: &str) -> String {
	format!("operations/{id}")
}

/// GET /v1/operations/{id}
pub async fn get_operation(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<Operation>, ServerError> {
	Ok(Json(state.operations.get(&operation_name(&id))?))
}

#[derive(Debug, Deserialize)]
pub struct WaitParams {
	pub timeout_secs: Option<u64>,
}

/// POST /v1/operations/{id}/wait
///
/// Blocks until the operation is terminal or the timeout passes, then
/// returns whatever snapshot is current.
#[tracing::instrument(skip(state), fields(operation = %id))]
pub async fn wait_operation(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Query(params): Query<WaitParams>,
) -> Result<Json<Operation>, ServerError> {
	let timeout = Duration::from_secs(params.timeout_secs.unwrap_or(DEFAULT_WAIT_SECS))
		.min(state.max_wait);
	Ok(Json(
		state.operations.wait(&operation_name(&id), timeout).await?,
	))
}
