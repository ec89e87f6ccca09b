//! Order endpoints.
//!
//! The acting party is taken from the `x-actor-role` and `x-actor-id`
//! headers on every request. Authentication happens upstream; this service
//! trusts whatever identity the gateway forwards.

use super::ApiError;
use crate::server::AppState;
use axum::{
	extract::{FromRequestParts, Path, State},
	http::{request::Parts, StatusCode},
	response::Json,
};
use dispatch_core::{format_status, StatusDisplay};
use dispatch_types::{truncate_id, Actor, DriverStatus, NewOrder, Order, OrderStatus, Role};
use serde::{Deserialize, Serialize};

pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const ACTOR_ID_HEADER: &str = "x-actor-id";

/// Actor extracted from request headers.
#[derive(Debug, Clone)]
pub struct RequestActor(pub Actor);

impl<S> FromRequestParts<S> for RequestActor
where
	S: Send + Sync,
{
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let header = |name: &str| -> Result<Option<String>, ApiError> {
			parts
				.headers
				.get(name)
				.map(|value| {
					value
						.to_str()
						.map(|s| s.trim().to_string())
						.map_err(|_| ApiError::InvalidActor(format!("{} is not valid text", name)))
				})
				.transpose()
		};

		let role = header(ACTOR_ROLE_HEADER)?
			.ok_or_else(|| ApiError::InvalidActor(format!("{} header is required", ACTOR_ROLE_HEADER)))?
			.parse::<Role>()
			.map_err(|e| ApiError::InvalidActor(e.to_string()))?;

		let mut actor = Actor::new(role);
		if let Some(id) = header(ACTOR_ID_HEADER)?.filter(|id| !id.is_empty()) {
			actor = actor.with_user_id(id);
		}
		Ok(RequestActor(actor))
	}
}

/// Order together with presentation data for its statuses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
	#[serde(flatten)]
	pub order: Order,
	pub status_display: StatusDisplay,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub driver_status_display: Option<StatusDisplay>,
}

impl From<Order> for OrderResponse {
	fn from(order: Order) -> Self {
		Self {
			status_display: format_status(order.status),
			driver_status_display: order.driver_status.map(format_status),
			order,
		}
	}
}

/// Statuses are taken as text so unknown values get a domain error rather
/// than a generic body rejection.
#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
	pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDriverStatusRequest {
	pub driver_status: String,
}

/// Handles POST /api/orders.
pub async fn create_order(
	State(state): State<AppState>,
	RequestActor(actor): RequestActor,
	Json(request): Json<NewOrder>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
	if !actor.role.is_staff() {
		return Err(ApiError::CreateForbidden);
	}

	let order = state
		.engine
		.store()
		.create_order(request)
		.await
		.map_err(ApiError::Create)?;
	tracing::info!(
		order_id = %truncate_id(&order.id),
		order_number = %order.order_number,
		status = %order.status,
		"Created order"
	);

	Ok((StatusCode::CREATED, Json(order.into())))
}

/// Handles GET /api/orders/{id}.
pub async fn get_order(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
	let order = state.engine.coordinator().get_order(&id).await?;
	Ok(Json(order.into()))
}

/// Handles PATCH /api/orders/{id}/status.
pub async fn change_order_status(
	State(state): State<AppState>,
	Path(id): Path<String>,
	RequestActor(actor): RequestActor,
	Json(request): Json<ChangeStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
	let requested: OrderStatus = request.status.parse()?;
	let order = state
		.engine
		.coordinator()
		.change_order_status(&id, requested, &actor, &state.shutdown)
		.await?;
	Ok(Json(order.into()))
}

/// Handles PATCH /api/orders/{id}/driver-status.
pub async fn change_driver_status(
	State(state): State<AppState>,
	Path(id): Path<String>,
	RequestActor(actor): RequestActor,
	Json(request): Json<ChangeDriverStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
	let requested: DriverStatus = request.driver_status.parse()?;
	let order = state
		.engine
		.coordinator()
		.change_driver_status(&id, requested, &actor, &state.shutdown)
		.await?;
	Ok(Json(order.into()))
}
