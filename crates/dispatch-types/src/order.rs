//! Order entity and status change payloads.
//!
//! Orders are owned by the order store. The dispatch core only mutates them
//! through status transitions and never deletes them; cancellation is a
//! terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{DriverStatus, OrderStatus};

/// Kind of delivery an order represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
	Catering,
	OnDemand,
}

impl fmt::Display for OrderType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OrderType::Catering => write!(f, "catering"),
			OrderType::OnDemand => write!(f, "on_demand"),
		}
	}
}

/// A catering or on-demand delivery request tracked through its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
	pub id: String,
	/// Human-facing order number.
	pub order_number: String,
	pub order_type: OrderType,
	pub status: OrderStatus,
	/// Absent until a driver has been dispatched.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub driver_status: Option<DriverStatus>,
	/// Identity of the assigned driver.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub driver_id: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub assigned_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pickup_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub arrival_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
	/// Builds a fresh order from a creation request.
	pub fn from_new(id: String, new: NewOrder, now: DateTime<Utc>) -> Self {
		Self {
			id,
			order_number: new.order_number,
			order_type: new.order_type,
			status: new.status,
			driver_status: None,
			driver_id: new.driver_id,
			created_at: now,
			updated_at: now,
			assigned_at: None,
			pickup_at: None,
			arrival_at: None,
			completed_at: None,
		}
	}

	/// Sets the order status and the timestamps it implies.
	pub fn apply_order_status(&mut self, status: OrderStatus, now: DateTime<Utc>) {
		self.status = status;
		self.updated_at = now;
		if status == OrderStatus::Completed {
			self.completed_at.get_or_insert(now);
		}
	}

	/// Sets the driver status and the timestamps it implies.
	///
	/// Each timestamp records the first time its stage was reached.
	pub fn apply_driver_status(&mut self, status: DriverStatus, now: DateTime<Utc>) {
		self.driver_status = Some(status);
		self.updated_at = now;
		match status {
			DriverStatus::Assigned => {
				self.assigned_at.get_or_insert(now);
			},
			DriverStatus::Started | DriverStatus::ArrivedAtVendor | DriverStatus::EnRouteToClient => {
				self.pickup_at.get_or_insert(now);
			},
			DriverStatus::ArrivedToClient => {
				self.arrival_at.get_or_insert(now);
			},
			DriverStatus::Completed => {
				self.completed_at.get_or_insert(now);
			},
		}
	}

	/// Returns true if `user_id` is the driver assigned to this order.
	pub fn is_assigned_to(&self, user_id: Option<&str>) -> bool {
		match (self.driver_id.as_deref(), user_id) {
			(Some(assigned), Some(user)) => assigned == user,
			_ => false,
		}
	}
}

/// Request to create an order through the external creation flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
	pub order_number: String,
	pub order_type: OrderType,
	#[serde(default = "default_initial_status")]
	pub status: OrderStatus,
	#[serde(default)]
	pub driver_id: Option<String>,
}

fn default_initial_status() -> OrderStatus {
	OrderStatus::Pending
}

/// A status change as seen by broker sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "status", rename_all = "camelCase")]
pub enum StatusChange {
	Order(OrderStatus),
	Driver(DriverStatus),
}

impl fmt::Display for StatusChange {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StatusChange::Order(status) => write!(f, "order:{}", status),
			StatusChange::Driver(status) => write!(f, "driver:{}", status),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	fn sample_order() -> Order {
		Order::from_new(
			"order-1".into(),
			NewOrder {
				order_number: "CV-1001".into(),
				order_type: OrderType::OnDemand,
				status: OrderStatus::Active,
				driver_id: Some("driver-7".into()),
			},
			Utc::now(),
		)
	}

	#[test]
	fn test_driver_timestamps_record_first_arrival() {
		let mut order = sample_order();
		let t0 = Utc::now();
		let t1 = t0 + Duration::minutes(5);

		order.apply_driver_status(DriverStatus::Started, t0);
		order.apply_driver_status(DriverStatus::EnRouteToClient, t1);
		assert_eq!(order.pickup_at, Some(t0));
		assert_eq!(order.updated_at, t1);
		assert_eq!(order.driver_status, Some(DriverStatus::EnRouteToClient));

		order.apply_driver_status(DriverStatus::Completed, t1);
		assert_eq!(order.completed_at, Some(t1));
	}

	#[test]
	fn test_assignment_matches_driver_identity() {
		let order = sample_order();
		assert!(order.is_assigned_to(Some("driver-7")));
		assert!(!order.is_assigned_to(Some("driver-8")));
		assert!(!order.is_assigned_to(None));
	}

	#[test]
	fn test_status_change_wire_shape() {
		let json = serde_json::to_value(StatusChange::Order(OrderStatus::Completed)).unwrap();
		assert_eq!(json, serde_json::json!({"kind": "order", "status": "COMPLETED"}));
	}

	#[test]
	fn test_new_order_defaults_to_pending() {
		let new: NewOrder =
			serde_json::from_str(r#"{"orderNumber": "CV-1", "orderType": "catering"}"#).unwrap();
		assert_eq!(new.status, OrderStatus::Pending);
		assert!(new.driver_id.is_none());
	}
}
