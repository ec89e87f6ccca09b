//! HTTP API of the dispatch service.
//!
//! Every failure leaves the service as an [`ErrorResponse`] with a stable
//! `error` code, so clients can branch on the code rather than the message.

pub mod order;
pub mod status;

use axum::{
	http::StatusCode,
	response::{IntoResponse, Json, Response},
};
use dispatch_core::CoordinatorError;
use dispatch_storage::StorageError;
use dispatch_types::StatusError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error code
	pub error: String,
	/// Human-readable description
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
	/// Suggested retry delay in seconds
	#[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
	pub retry_after: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ApiError {
	#[error(transparent)]
	Coordinator(#[from] CoordinatorError),
	#[error("Invalid actor: {0}")]
	InvalidActor(String),
	#[error("Unknown status kind: {0}")]
	UnknownStatusKind(String),
	#[error("Unknown status: {0}")]
	UnknownStatus(String),
	#[error("Only staff may create orders")]
	CreateForbidden,
	#[error("Order creation failed: {0}")]
	Create(StorageError),
}

impl From<StatusError> for ApiError {
	fn from(err: StatusError) -> Self {
		match err {
			StatusError::UnknownStatus { value } => ApiError::UnknownStatus(value),
		}
	}
}

impl ApiError {
	fn status_code(&self) -> StatusCode {
		match self {
			ApiError::Coordinator(e) => match e {
				CoordinatorError::InvalidTransition { .. } | CoordinatorError::UnknownStatus { .. } => {
					StatusCode::BAD_REQUEST
				},
				CoordinatorError::Forbidden { .. } => StatusCode::FORBIDDEN,
				CoordinatorError::NotFound { .. } => StatusCode::NOT_FOUND,
				CoordinatorError::Conflict { .. } => StatusCode::CONFLICT,
				CoordinatorError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
				CoordinatorError::PersistenceFailure { .. }
				| CoordinatorError::PartialFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
			},
			ApiError::InvalidActor(_)
			| ApiError::UnknownStatusKind(_)
			| ApiError::UnknownStatus(_) => StatusCode::BAD_REQUEST,
			ApiError::CreateForbidden => StatusCode::FORBIDDEN,
			ApiError::Create(e) => match e {
				StorageError::InvalidData(_) => StatusCode::BAD_REQUEST,
				StorageError::Conflict(_) => StatusCode::CONFLICT,
				_ => StatusCode::INTERNAL_SERVER_ERROR,
			},
		}
	}

	fn code(&self) -> &'static str {
		match self {
			ApiError::Coordinator(e) => e.code(),
			ApiError::InvalidActor(_) => "INVALID_ACTOR",
			ApiError::UnknownStatusKind(_) => "UNKNOWN_STATUS_KIND",
			ApiError::UnknownStatus(_) => "UNKNOWN_STATUS",
			ApiError::CreateForbidden => "FORBIDDEN",
			ApiError::Create(StorageError::InvalidData(_)) => "INVALID_ORDER",
			ApiError::Create(StorageError::Conflict(_)) => "DUPLICATE_ORDER_NUMBER",
			ApiError::Create(_) => "PERSISTENCE_FAILURE",
		}
	}

	fn details(&self) -> Option<serde_json::Value> {
		match self {
			ApiError::Coordinator(CoordinatorError::InvalidTransition { from, to, .. }) => {
				Some(json!({ "from": from, "to": to }))
			},
			ApiError::Coordinator(CoordinatorError::Forbidden { role, action }) => {
				Some(json!({ "role": role.to_string(), "action": action }))
			},
			ApiError::Coordinator(CoordinatorError::PartialFailure {
				succeeded, failed, ..
			}) => Some(json!({
				"succeeded": succeeded.to_string(),
				"failed": failed.to_string(),
			})),
			_ => None,
		}
	}

	pub fn to_error_response(&self) -> ErrorResponse {
		let retry_after = match self {
			ApiError::Coordinator(CoordinatorError::Cancelled { .. }) => Some(1),
			_ => None,
		};

		ErrorResponse {
			error: self.code().to_string(),
			message: self.to_string(),
			details: self.details(),
			retry_after,
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = self.status_code();
		if status.is_server_error() {
			tracing::error!(error = %self, "Request failed");
		} else {
			tracing::debug!(error = %self, "Request rejected");
		}
		(status, Json(self.to_error_response())).into_response()
	}
}
