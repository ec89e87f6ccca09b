//! HTTP server for the dispatch API.

use crate::apis::{order, status};
use axum::{
	extract::DefaultBodyLimit,
	http::HeaderValue,
	routing::{get, patch, post},
	Router,
};
use dispatch_config::ApiConfig;
use dispatch_core::DispatchEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
	cors::{AllowOrigin, Any, CorsLayer},
	timeout::TimeoutLayer,
	trace::TraceLayer,
};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<DispatchEngine>,
	/// Cancelled on shutdown. Status changes that have not written yet give up.
	pub shutdown: CancellationToken,
}

fn cors_layer(api_config: &ApiConfig) -> CorsLayer {
	let Some(cors) = &api_config.cors else {
		return CorsLayer::permissive();
	};

	let origins: Vec<HeaderValue> = cors
		.allowed_origins
		.iter()
		.filter_map(|origin| match HeaderValue::from_str(origin) {
			Ok(value) => Some(value),
			Err(e) => {
				tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
				None
			},
		})
		.collect();

	CorsLayer::new()
		.allow_origin(AllowOrigin::list(origins))
		.allow_methods(Any)
		.allow_headers(Any)
}

/// Builds the API router with all routes under `/api`.
pub fn router(state: AppState, api_config: &ApiConfig) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/orders", post(order::create_order))
				.route("/orders/{id}", get(order::get_order))
				.route("/orders/{id}/status", patch(order::change_order_status))
				.route(
					"/orders/{id}/driver-status",
					patch(order::change_driver_status),
				)
				.route("/statuses/{kind}/{value}", get(status::get_status_display)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(TimeoutLayer::new(Duration::from_secs(
					api_config.timeout_seconds,
				)))
				.layer(cors_layer(api_config)),
		)
		.layer(DefaultBodyLimit::max(api_config.max_request_size))
		.with_state(state)
}

/// Starts the HTTP server and serves until `shutdown` is cancelled.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<DispatchEngine>,
	shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
	let state = AppState {
		engine,
		shutdown: shutdown.clone(),
	};
	let app = router(state, &api_config);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Dispatch API server starting on {}", bind_address);

	axum::serve(listener, app)
		.with_graceful_shutdown(async move {
			shutdown.cancelled().await;
			tracing::info!("Shutting down API server");
		})
		.await?;

	Ok(())
}
