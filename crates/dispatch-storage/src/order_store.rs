//! Order store built on the typed storage service.
//!
//! Status writes are compare-and-swap: the caller names the status it read,
//! and the write fails with [`StorageError::Conflict`] if the stored status
//! has moved on since. Writes to one order are serialized through a per-order
//! lock so the read-compare-write sequence cannot interleave; different
//! orders never contend.

use crate::{StorageError, StorageService};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dispatch_types::{DriverStatus, NewOrder, Order, OrderStatus, StorageKey};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// The order store contract consumed by the dispatch core.
#[async_trait]
pub trait OrderStore: Send + Sync {
	/// Creates an order in one of its initial statuses.
	async fn create_order(&self, new: NewOrder) -> Result<Order, StorageError>;

	async fn get_order(&self, order_id: &str) -> Result<Order, StorageError>;

	/// Sets the order status if it is still `expected`.
	async fn update_order_status(
		&self,
		order_id: &str,
		expected: OrderStatus,
		status: OrderStatus,
	) -> Result<Order, StorageError>;

	/// Sets the driver status if it is still `expected` and the order has not
	/// reached a terminal status.
	async fn update_driver_status(
		&self,
		order_id: &str,
		expected: Option<DriverStatus>,
		status: DriverStatus,
	) -> Result<Order, StorageError>;
}

/// [`OrderStore`] over a [`StorageService`].
///
/// The lock table holds an entry only while some write on that key holds or
/// awaits its lock, so it is bounded by the number of in-flight writes.
pub struct OrderRepository {
	storage: Arc<StorageService>,
	locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Holds one key's lock and drops the table entry once nobody else wants it.
struct KeyGuard<'a> {
	locks: &'a DashMap<String, Arc<Mutex<()>>>,
	key: String,
	guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
	fn drop(&mut self) {
		drop(self.guard.take());
		// Only the table's own reference left means no waiter.
		self.locks
			.remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
	}
}

impl OrderRepository {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			locks: DashMap::new(),
		}
	}

	async fn lock(&self, key: &str) -> KeyGuard<'_> {
		let lock = self.locks.entry(key.to_string()).or_default().clone();
		KeyGuard {
			locks: &self.locks,
			key: key.to_string(),
			guard: Some(lock.lock_owned().await),
		}
	}

	async fn load(&self, order_id: &str) -> Result<Order, StorageError> {
		self.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
	}

	async fn save(&self, order: &Order) -> Result<(), StorageError> {
		self.storage
			.update(StorageKey::Orders.as_str(), &order.id, order)
			.await
	}
}

#[async_trait]
impl OrderStore for OrderRepository {
	async fn create_order(&self, new: NewOrder) -> Result<Order, StorageError> {
		if !new.status.is_initial() {
			return Err(StorageError::InvalidData(format!(
				"Orders must be created PENDING or ACTIVE, got {}",
				new.status
			)));
		}
		if new.order_number.trim().is_empty() {
			return Err(StorageError::InvalidData(
				"Order number cannot be empty".into(),
			));
		}

		let number_key = format!("{}:{}", StorageKey::OrderByNumber.as_str(), new.order_number);
		let _guard = self.lock(&number_key).await;

		if self
			.storage
			.exists(StorageKey::OrderByNumber.as_str(), &new.order_number)
			.await?
		{
			return Err(StorageError::Conflict(format!(
				"Order number {} already exists",
				new.order_number
			)));
		}

		// Index first. A failed order write releases the number again.
		let order = Order::from_new(Uuid::new_v4().to_string(), new, Utc::now());
		self.storage
			.store(
				StorageKey::OrderByNumber.as_str(),
				&order.order_number,
				&order.id,
			)
			.await?;
		if let Err(e) = self
			.storage
			.store(StorageKey::Orders.as_str(), &order.id, &order)
			.await
		{
			if let Err(cleanup) = self
				.storage
				.remove(StorageKey::OrderByNumber.as_str(), &order.order_number)
				.await
			{
				tracing::warn!(
					order_number = %order.order_number,
					error = %cleanup,
					"Failed to release order number after failed create"
				);
			}
			return Err(e);
		}

		tracing::debug!(order_id = %order.id, order_number = %order.order_number, "Stored order");
		Ok(order)
	}

	async fn get_order(&self, order_id: &str) -> Result<Order, StorageError> {
		self.load(order_id).await
	}

	async fn update_order_status(
		&self,
		order_id: &str,
		expected: OrderStatus,
		status: OrderStatus,
	) -> Result<Order, StorageError> {
		let _guard = self.lock(order_id).await;

		let mut order = self.load(order_id).await?;
		if order.status != expected {
			return Err(StorageError::Conflict(format!(
				"Order status is {}, expected {}",
				order.status, expected
			)));
		}

		order.apply_order_status(status, Utc::now());
		self.save(&order).await?;
		Ok(order)
	}

	async fn update_driver_status(
		&self,
		order_id: &str,
		expected: Option<DriverStatus>,
		status: DriverStatus,
	) -> Result<Order, StorageError> {
		let _guard = self.lock(order_id).await;

		let mut order = self.load(order_id).await?;
		if order.status.is_terminal() {
			return Err(StorageError::Conflict(format!(
				"Order is already {}",
				order.status
			)));
		}
		if order.driver_status != expected {
			return Err(StorageError::Conflict(format!(
				"Driver status is {}, expected {}",
				display_driver_status(order.driver_status),
				display_driver_status(expected)
			)));
		}

		order.apply_driver_status(status, Utc::now());
		self.save(&order).await?;
		Ok(order)
	}
}

fn display_driver_status(status: Option<DriverStatus>) -> String {
	status.map_or_else(|| "unset".to_string(), |s| s.to_string())
}
