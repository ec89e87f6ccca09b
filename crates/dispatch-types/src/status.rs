//! Order and driver status enumerations.
//!
//! Both enumerations are closed sets. Parsing a value outside the set fails
//! with [`StatusError::UnknownStatus`]; nothing is ever coerced to a default.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised when a raw status value cannot be interpreted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StatusError {
	#[error("Unknown status: {value}")]
	UnknownStatus { value: String },
}

/// Lifecycle stage of an order as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
	Pending,
	Confirmed,
	Active,
	Assigned,
	InProgress,
	Delivered,
	Completed,
	Cancelled,
}

impl OrderStatus {
	/// Every order status, in lifecycle order.
	pub const ALL: [OrderStatus; 8] = [
		OrderStatus::Pending,
		OrderStatus::Confirmed,
		OrderStatus::Active,
		OrderStatus::Assigned,
		OrderStatus::InProgress,
		OrderStatus::Delivered,
		OrderStatus::Completed,
		OrderStatus::Cancelled,
	];

	/// Returns the upper snake case wire value.
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "PENDING",
			OrderStatus::Confirmed => "CONFIRMED",
			OrderStatus::Active => "ACTIVE",
			OrderStatus::Assigned => "ASSIGNED",
			OrderStatus::InProgress => "IN_PROGRESS",
			OrderStatus::Delivered => "DELIVERED",
			OrderStatus::Completed => "COMPLETED",
			OrderStatus::Cancelled => "CANCELLED",
		}
	}

	/// Returns true if no further transition is permitted from this status.
	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
	}

	/// Returns true if an order may be created in this status.
	pub fn is_initial(&self) -> bool {
		matches!(self, OrderStatus::Pending | OrderStatus::Active)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderStatus {
	type Err = StatusError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		OrderStatus::ALL
			.into_iter()
			.find(|status| status.as_str() == s)
			.ok_or_else(|| StatusError::UnknownStatus {
				value: s.to_string(),
			})
	}
}

/// Lifecycle stage of a single driver's execution of a dispatch.
///
/// `ArrivedAtVendor` and `EnRouteToClient` are on-demand substates of the
/// `Started` stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverStatus {
	Assigned,
	Started,
	ArrivedAtVendor,
	EnRouteToClient,
	ArrivedToClient,
	Completed,
}

impl DriverStatus {
	pub const ALL: [DriverStatus; 6] = [
		DriverStatus::Assigned,
		DriverStatus::Started,
		DriverStatus::ArrivedAtVendor,
		DriverStatus::EnRouteToClient,
		DriverStatus::ArrivedToClient,
		DriverStatus::Completed,
	];

	/// The fixed sequence a driver advances through on their own.
	pub const DRIVER_SEQUENCE: [DriverStatus; 4] = [
		DriverStatus::Assigned,
		DriverStatus::Started,
		DriverStatus::ArrivedToClient,
		DriverStatus::Completed,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			DriverStatus::Assigned => "ASSIGNED",
			DriverStatus::Started => "STARTED",
			DriverStatus::ArrivedAtVendor => "ARRIVED_AT_VENDOR",
			DriverStatus::EnRouteToClient => "EN_ROUTE_TO_CLIENT",
			DriverStatus::ArrivedToClient => "ARRIVED_TO_CLIENT",
			DriverStatus::Completed => "COMPLETED",
		}
	}

	/// Position of this status in [`DriverStatus::DRIVER_SEQUENCE`].
	///
	/// Substates share the stage of `Started`.
	pub fn stage(&self) -> usize {
		match self {
			DriverStatus::Assigned => 0,
			DriverStatus::Started | DriverStatus::ArrivedAtVendor | DriverStatus::EnRouteToClient => 1,
			DriverStatus::ArrivedToClient => 2,
			DriverStatus::Completed => 3,
		}
	}

	/// Returns the status a driver may advance to from `current`.
	///
	/// An order without a driver status has taken no step yet, so the next
	/// status is `Assigned`. Returns `None` once the sequence is complete.
	pub fn next_for_driver(current: Option<DriverStatus>) -> Option<DriverStatus> {
		let next_stage = match current {
			None => 0,
			Some(status) => status.stage() + 1,
		};
		Self::DRIVER_SEQUENCE.get(next_stage).copied()
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, DriverStatus::Completed)
	}
}

impl fmt::Display for DriverStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for DriverStatus {
	type Err = StatusError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		DriverStatus::ALL
			.into_iter()
			.find(|status| status.as_str() == s)
			.ok_or_else(|| StatusError::UnknownStatus {
				value: s.to_string(),
			})
	}
}
