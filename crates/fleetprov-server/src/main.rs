// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! fleetprov server binary.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use fleetprov_server::{create_app_state, create_router, version};
use fleetprov_server_config::LogFormat;
use fleetprov_server_operations::RetentionCleaner;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Fleet device provisioning control plane.
#[derive(Parser, Debug)]
#[command(name = "fleetprov-server", about = "Fleet device provisioning server", version)]
struct Args {
	/// Configuration file (defaults to /etc/fleetprov/server.toml)
	#[arg(long, env = "FLEETPROV_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version and build information
	Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	let config = match &args.config {
		Some(path) => fleetprov_server_config::load_config_with_file(path.clone())?,
		None => fleetprov_server_config::load_config()?,
	};

	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| config.logging.level.clone().into());
	match config.logging.format {
		LogFormat::Json => tracing_subscriber::registry()
			.with(filter)
			.with(tracing_subscriber::fmt::layer().json())
			.init(),
		LogFormat::Text => tracing_subscriber::registry()
			.with(filter)
			.with(tracing_subscriber::fmt::layer())
			.init(),
	}

	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		"starting fleetprov-server"
	);

	let state = create_app_state(&config)?;
	let resources = Arc::clone(&state.resources);
	let cleaner = RetentionCleaner::start(
		Arc::clone(&state.operations),
		config.operations.cleanup_interval,
		config.operations.retention,
	);

	let app = create_router(state).layer(TraceLayer::new_for_http());

	let addr = config.socket_addr();
	tracing::info!("listening on {}", addr);
	let listener = tokio::net::TcpListener::bind(&addr).await?;

	tokio::select! {
		result = axum::serve(listener, app) => {
			if let Err(e) = result {
				tracing::error!(error = %e, "Server error");
			}
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("Received shutdown signal");
		}
	}

	let failed = resources.close_all().await;
	if failed > 0 {
		tracing::warn!(failed, "some resources failed to close");
	}
	cleaner.shutdown().await;

	tracing::info!("Server shutdown complete");
	Ok(())
}
