//! Main entry point for the courier dispatch service.
//!
//! Loads configuration, assembles the dispatch engine from the built-in
//! storage and broker implementations, and serves the HTTP API until
//! interrupted.

use clap::Parser;
use dispatch_config::Config;
use dispatch_core::{DispatchBuilder, DispatchFactories};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod apis;
mod server;

/// Command-line arguments for the dispatch service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml", env = "DISPATCH_CONFIG")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started dispatch service");

	let config_path = args
		.config
		.to_str()
		.ok_or_else(|| format!("Config path is not valid UTF-8: {}", args.config.display()))?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.dispatch.id);

	let api_config = match config.api.clone() {
		Some(api) if api.enabled => api,
		_ => {
			tracing::warn!("API server disabled in configuration, nothing to serve");
			return Ok(());
		},
	};

	let engine = Arc::new(DispatchBuilder::new(config).build(DispatchFactories::builtin())?);

	let shutdown = CancellationToken::new();
	let signal = shutdown.clone();
	tokio::spawn(async move {
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::error!(error = %e, "Failed to listen for shutdown signal");
			return;
		}
		tracing::info!("Shutdown signal received");
		signal.cancel();
	});

	server::start_server(api_config, engine, shutdown).await?;

	tracing::info!("Stopped dispatch service");
	Ok(())
}
