//! Status presentation endpoint.

use super::ApiError;
use axum::{extract::Path, response::Json};
use dispatch_core::{format_status_str, StatusDisplay, StatusKind};

fn parse_kind(kind: &str) -> Result<StatusKind, ApiError> {
	match kind {
		"order" => Ok(StatusKind::Order),
		"driver" => Ok(StatusKind::Driver),
		other => Err(ApiError::UnknownStatusKind(other.to_string())),
	}
}

/// Handles GET /api/statuses/{kind}/{value}.
pub async fn get_status_display(
	Path((kind, value)): Path<(String, String)>,
) -> Result<Json<StatusDisplay>, ApiError> {
	let display = format_status_str(parse_kind(&kind)?, &value)?;
	Ok(Json(display))
}
