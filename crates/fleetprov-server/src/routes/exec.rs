// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! POST /v1/exec: remote command output as Server-Sent Events.
//!
//! Events are `stdout` and `stderr` (base64 chunk payloads) followed by a
//! single `exit` event carrying the JSON exit descriptor.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use fleetprov_common_ssh::PooledConnection;
use futures::stream::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{warn, Instrument};

use crate::api::AppState;
use crate::error::ServerError;
use crate::exec::{command_line, stream_exec, ExecEvent, ExecExit};

const EVENT_BUFFER: usize = 32;

#[derive(Debug, Deserialize)]
pub struct ExecRequest {
	pub dut_name: String,
	#[serde(default)]
	pub port: Option<u16>,
	pub command: String,
	#[serde(default)]
	pub args: Vec<String>,
	/// Base64 bytes written to the command's stdin.
	#[serde(default)]
	pub stdin: Option<String>,
}

fn to_sse(event: ExecEvent) -> Event {
	match event {
		ExecEvent::Stdout(bytes) => Event::default().event("stdout").data(STANDARD.encode(bytes)),
		ExecEvent::Stderr(bytes) => Event::default().event("stderr").data(STANDARD.encode(bytes)),
		ExecEvent::Exit(exit) => match Event::default().event("exit").json_data(&exit) {
			Ok(event) => event,
			Err(e) => Event::default().event("error").data(e.to_string()),
		},
	}
}

#[tracing::instrument(skip(state, request), fields(dut = %request.dut_name, command = %request.command))]
pub async fn exec(
	State(state): State<AppState>,
	Json(request): Json<ExecRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
	if request.dut_name.trim().is_empty() {
		return Err(ServerError::BadRequest("dut_name is empty".to_string()));
	}
	if request.command.trim().is_empty() {
		return Err(ServerError::BadRequest("command is empty".to_string()));
	}
	let stdin = match &request.stdin {
		Some(encoded) => STANDARD
			.decode(encoded)
			.map_err(|e| ServerError::BadRequest(format!("stdin is not valid base64: {e}")))?,
		None => Vec::new(),
	};
	let address = state.resolver.resolve(&request.dut_name, request.port).await?;
	let line = command_line(&request.command, &request.args);

	let (tx, rx) = mpsc::channel(EVENT_BUFFER);
	let pool = Arc::clone(&state.pool);
	let chunk_size = state.exec_chunk_size;
	tokio::spawn(
		async move {
			let conn = match PooledConnection::checkout(pool, &address).await {
				Ok(conn) => conn,
				Err(e) => {
					warn!(error = %e, "connect failed");
					let _ = tx.send(ExecEvent::Exit(ExecExit::not_started(e.to_string()))).await;
					return;
				}
			};
			stream_exec(&*conn, &line, stdin, chunk_size, tx).await;
		}
		.in_current_span(),
	);

	Ok(Sse::new(ReceiverStream::new(rx).map(|e| Ok(to_sse(e)))))
}
