// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ephemeral resource endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use fleetprov_server_resources::{fake_origin, FakeOriginRequest};
use serde::Serialize;

use crate::api::AppState;
use crate::error::ServerError;

#[derive(Debug, Serialize)]
pub struct FakeOriginResponse {
	pub name: String,
	pub update_url: String,
}

/// POST /v1/fake-origins
#[tracing::instrument(skip(state, request), fields(dut = %request.dut_name))]
pub async fn create_fake_origin(
	State(state): State<AppState>,
	Json(request): Json<FakeOriginRequest>,
) -> Result<(StatusCode, Json<FakeOriginResponse>), ServerError> {
	let origin = fake_origin::create_fake_origin(
		&state.resources,
		state.resolver.as_ref(),
		&state.fake_origin,
		&request,
	)
	.await?;
	Ok((
		StatusCode::CREATED,
		Json(FakeOriginResponse {
			name: origin.name,
			update_url: origin.update_url,
		}),
	))
}

/// DELETE /v1/resources/{kind}/{id}
///
/// The resource is unregistered before it is closed; a close failure is
/// reported but the name stays free.
#[tracing::instrument(skip(state))]
pub async fn delete_resource(
	State(state): State<AppState>,
	Path((kind, id)): Path<(String, String)>,
) -> Result<StatusCode, ServerError> {
	state
		.resources
		.delete_and_close(&format!("{kind}/{id}"))
		.await?;
	Ok(StatusCode::NO_CONTENT)
}
