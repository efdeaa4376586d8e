// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::extract::State;
use axum::Json;
use fleetprov_server_operations::OperationCounts;
use serde::Serialize;

use crate::api::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
	pub status: &'static str,
	pub version: &'static str,
	pub operations: OperationCounts,
	pub resources: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
	Json(HealthResponse {
		status: "ok",
		version: crate::version::VERSION,
		operations: state.operations.counts(),
		resources: state.resources.len(),
	})
}
