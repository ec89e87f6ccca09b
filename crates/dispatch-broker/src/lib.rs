//! Broker sync module for the courier dispatch system.
//!
//! Broker sync forwards order status changes to external systems that mirror
//! order state. It is best effort: [`BrokerService::notify`] logs failures and
//! never returns them, because the status change it reports is already
//! durable by the time it is called.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_types::{
	truncate_id, DriverStatus, ImplementationRegistry, Order, OrderStatus,
	OrderType, StatusChange,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod implementations {
	pub mod log;
	pub mod webhook;
}

/// Errors that can occur while notifying a broker.
#[derive(Debug, Error)]
pub enum BrokerError {
	#[error("Network error: {0}")]
	Network(String),
	/// The broker answered with a non-success status.
	#[error("Broker rejected notification with status {status}: {body}")]
	Rejected { status: u16, body: String },
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Body sent to brokers for every status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusNotification {
	pub order_id: String,
	pub order_number: String,
	pub order_type: OrderType,
	pub change: StatusChange,
	/// Order status after the change.
	pub status: OrderStatus,
	/// Driver status after the change.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub driver_status: Option<DriverStatus>,
	pub occurred_at: DateTime<Utc>,
}

impl StatusNotification {
	pub fn new(order: &Order, change: StatusChange) -> Self {
		Self {
			order_id: order.id.clone(),
			order_number: order.order_number.clone(),
			order_type: order.order_type,
			change,
			status: order.status,
			driver_status: order.driver_status,
			occurred_at: order.updated_at,
		}
	}
}

/// Interface every broker sync target implements.
#[async_trait]
pub trait BrokerInterface: Send + Sync {
	/// Delivers one notification. Implementations bound the call with their
	/// own timeout.
	async fn notify_status_change(
		&self,
		notification: &StatusNotification,
	) -> Result<(), BrokerError>;
}

pub type BrokerFactory = fn(&toml::Value) -> Result<Box<dyn BrokerInterface>, BrokerError>;

pub trait BrokerRegistry: ImplementationRegistry<Factory = BrokerFactory> {}

/// Returns `(name, factory)` for every built-in broker implementation.
pub fn get_all_implementations() -> Vec<(&'static str, BrokerFactory)> {
	use implementations::{log, webhook};

	vec![
		(log::Registry::NAME, log::Registry::factory()),
		(webhook::Registry::NAME, webhook::Registry::factory()),
	]
}

/// Fans a status change out to every configured broker.
pub struct BrokerService {
	targets: Vec<(String, Box<dyn BrokerInterface>)>,
}

impl BrokerService {
	pub fn new(targets: Vec<(String, Box<dyn BrokerInterface>)>) -> Self {
		Self { targets }
	}

	/// A service with no targets; notifications are dropped.
	pub fn disabled() -> Self {
		Self::new(Vec::new())
	}

	pub fn is_empty(&self) -> bool {
		self.targets.is_empty()
	}

	/// Notifies every target, logging failures. Returns how many targets
	/// accepted the notification.
	pub async fn notify(&self, order: &Order, change: StatusChange) -> usize {
		let notification = StatusNotification::new(order, change);
		let mut delivered = 0;

		for (name, target) in &self.targets {
			match target.notify_status_change(&notification).await {
				Ok(()) => {
					delivered += 1;
					tracing::debug!(
						broker = %name,
						order_id = %truncate_id(&order.id),
						change = %change,
						"Broker notified"
					);
				},
				Err(e) => {
					tracing::warn!(
						broker = %name,
						order_id = %truncate_id(&order.id),
						change = %change,
						error = %e,
						"Broker notification failed"
					);
				},
			}
		}

		delivered
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use dispatch_types::NewOrder;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	struct CountingBroker {
		calls: Arc<AtomicUsize>,
		fail: bool,
	}

	#[async_trait]
	impl BrokerInterface for CountingBroker {
		async fn notify_status_change(
			&self,
			_notification: &StatusNotification,
		) -> Result<(), BrokerError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			if self.fail {
				Err(BrokerError::Network("connection refused".into()))
			} else {
				Ok(())
			}
		}
	}

	fn order() -> Order {
		Order::from_new(
			"order-1".into(),
			NewOrder {
				order_number: "CV-9".into(),
				order_type: OrderType::Catering,
				status: OrderStatus::Completed,
				driver_id: None,
			},
			Utc::now(),
		)
	}

	#[tokio::test]
	async fn test_failing_target_does_not_stop_others() {
		let failing_calls = Arc::new(AtomicUsize::new(0));
		let ok_calls = Arc::new(AtomicUsize::new(0));
		let failing: Box<dyn BrokerInterface> = Box::new(CountingBroker {
			calls: Arc::clone(&failing_calls),
			fail: true,
		});
		let ok: Box<dyn BrokerInterface> = Box::new(CountingBroker {
			calls: Arc::clone(&ok_calls),
			fail: false,
		});
		let service = BrokerService::new(vec![("failing".into(), failing), ("ok".into(), ok)]);

		let delivered = service
			.notify(&order(), StatusChange::Order(OrderStatus::Completed))
			.await;

		assert_eq!(delivered, 1);
		assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
		assert_eq!(ok_calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_disabled_service_delivers_nothing() {
		let service = BrokerService::disabled();
		assert!(service.is_empty());
		assert_eq!(
			service
				.notify(&order(), StatusChange::Driver(DriverStatus::Started))
				.await,
			0
		);
	}

	#[test]
	fn test_notification_carries_post_change_state() {
		let order = order();
		let notification =
			StatusNotification::new(&order, StatusChange::Order(OrderStatus::Completed));
		assert_eq!(notification.order_number, "CV-9");
		assert_eq!(notification.status, OrderStatus::Completed);
		assert_eq!(notification.occurred_at, order.updated_at);

		let json = serde_json::to_value(&notification).unwrap();
		assert_eq!(json["change"]["kind"], "order");
		assert!(json.get("driverStatus").is_none());
	}
}
