//! Order status coordinator.
//!
//! A status change runs load, validate, persist, notify in that order. A
//! rejected request never reaches the store. Broker sync runs only after
//! every write succeeded, and its failures are logged by the broker service
//! rather than returned. Nothing is retried here.

use crate::state::{validate_driver_transition, validate_transition, TransitionError, TransitionRule};
use dispatch_broker::BrokerService;
use dispatch_storage::{OrderStore, StorageError};
use dispatch_types::{
	truncate_id, Actor, DriverStatus, Order, OrderStatus, Role, StatusChange, StatusError,
};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Store call that failed or succeeded during a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
	GetOrder,
	UpdateOrderStatus,
	UpdateDriverStatus,
}

impl fmt::Display for StoreOperation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StoreOperation::GetOrder => write!(f, "get_order"),
			StoreOperation::UpdateOrderStatus => write!(f, "update_order_status"),
			StoreOperation::UpdateDriverStatus => write!(f, "update_driver_status"),
		}
	}
}

/// Errors returned by the coordinator. Each maps to one stable outcome for
/// the caller.
#[derive(Debug, Error)]
pub enum CoordinatorError {
	#[error("Invalid transition from {from} to {to}: {rule}")]
	InvalidTransition {
		from: String,
		to: String,
		rule: TransitionRule,
	},
	#[error("Role {role} may not {action}")]
	Forbidden { role: Role, action: &'static str },
	#[error("Order not found: {order_id}")]
	NotFound { order_id: String },
	#[error("Unknown status: {value}")]
	UnknownStatus { value: String },
	/// The order changed between the read and the write.
	#[error("Order {order_id} changed concurrently: {message}")]
	Conflict { order_id: String, message: String },
	#[error("Request for order {order_id} was cancelled before any write")]
	Cancelled { order_id: String },
	#[error("Store {operation} failed for order {order_id}: {message}")]
	PersistenceFailure {
		order_id: String,
		operation: StoreOperation,
		message: String,
	},
	/// The first write landed, the second did not. Nothing was rolled back.
	#[error("Order {order_id}: {succeeded} succeeded but {failed} failed: {message}")]
	PartialFailure {
		order_id: String,
		succeeded: StoreOperation,
		failed: StoreOperation,
		message: String,
	},
}

impl CoordinatorError {
	/// Stable machine-readable code for this error.
	pub fn code(&self) -> &'static str {
		match self {
			CoordinatorError::InvalidTransition { .. } => "INVALID_TRANSITION",
			CoordinatorError::Forbidden { .. } => "FORBIDDEN",
			CoordinatorError::NotFound { .. } => "ORDER_NOT_FOUND",
			CoordinatorError::UnknownStatus { .. } => "UNKNOWN_STATUS",
			CoordinatorError::Conflict { .. } => "CONFLICT",
			CoordinatorError::Cancelled { .. } => "CANCELLED",
			CoordinatorError::PersistenceFailure { .. } => "PERSISTENCE_FAILURE",
			CoordinatorError::PartialFailure { .. } => "PARTIAL_FAILURE",
		}
	}

	fn from_store(order_id: &str, operation: StoreOperation, err: StorageError) -> Self {
		match err {
			StorageError::NotFound => CoordinatorError::NotFound {
				order_id: order_id.to_string(),
			},
			StorageError::Conflict(message) => CoordinatorError::Conflict {
				order_id: order_id.to_string(),
				message,
			},
			other => CoordinatorError::PersistenceFailure {
				order_id: order_id.to_string(),
				operation,
				message: other.to_string(),
			},
		}
	}
}

impl From<TransitionError> for CoordinatorError {
	fn from(err: TransitionError) -> Self {
		match err {
			TransitionError::InvalidTransition { from, to, rule } => {
				CoordinatorError::InvalidTransition { from, to, rule }
			},
			TransitionError::Forbidden { role, action } => {
				CoordinatorError::Forbidden { role, action }
			},
		}
	}
}

impl From<StatusError> for CoordinatorError {
	fn from(err: StatusError) -> Self {
		match err {
			StatusError::UnknownStatus { value } => CoordinatorError::UnknownStatus { value },
		}
	}
}

/// Validates, persists and announces status changes.
pub struct StatusCoordinator {
	store: Arc<dyn OrderStore>,
	broker: Arc<BrokerService>,
	/// Forward driver changes that do not complete the order.
	notify_driver_changes: bool,
}

impl StatusCoordinator {
	pub fn new(store: Arc<dyn OrderStore>, broker: Arc<BrokerService>) -> Self {
		Self {
			store,
			broker,
			notify_driver_changes: true,
		}
	}

	pub fn with_driver_notifications(mut self, enabled: bool) -> Self {
		self.notify_driver_changes = enabled;
		self
	}

	pub async fn get_order(&self, order_id: &str) -> Result<Order, CoordinatorError> {
		self.store
			.get_order(order_id)
			.await
			.map_err(|e| CoordinatorError::from_store(order_id, StoreOperation::GetOrder, e))
	}

	fn ensure_not_cancelled(order_id: &str, cancel: &CancellationToken) -> Result<(), CoordinatorError> {
		if cancel.is_cancelled() {
			tracing::info!("Request cancelled before write");
			return Err(CoordinatorError::Cancelled {
				order_id: order_id.to_string(),
			});
		}
		Ok(())
	}

	/// Moves an order to `requested` on behalf of `actor`.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), requested = %requested, role = %actor.role))]
	pub async fn change_order_status(
		&self,
		order_id: &str,
		requested: OrderStatus,
		actor: &Actor,
		cancel: &CancellationToken,
	) -> Result<Order, CoordinatorError> {
		let order = self.get_order(order_id).await?;

		if let Err(e) = validate_transition(order.status, requested, actor.role) {
			tracing::debug!(current = %order.status, error = %e, "Rejected order status change");
			return Err(e.into());
		}
		Self::ensure_not_cancelled(order_id, cancel)?;

		let updated = self
			.store
			.update_order_status(order_id, order.status, requested)
			.await
			.map_err(|e| {
				CoordinatorError::from_store(order_id, StoreOperation::UpdateOrderStatus, e)
			})?;

		tracing::info!(from = %order.status, to = %requested, "Order status changed");
		self.broker
			.notify(&updated, StatusChange::Order(requested))
			.await;

		Ok(updated)
	}

	/// Moves the driver status of an order to `requested` on behalf of `actor`.
	///
	/// Reaching `COMPLETED` also completes the order in a second write. If
	/// that second write fails the result is [`CoordinatorError::PartialFailure`]
	/// and the driver status stays written.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), requested = %requested, role = %actor.role))]
	pub async fn change_driver_status(
		&self,
		order_id: &str,
		requested: DriverStatus,
		actor: &Actor,
		cancel: &CancellationToken,
	) -> Result<Order, CoordinatorError> {
		let order = self.get_order(order_id).await?;

		if let Err(e) = validate_driver_transition(&order, requested, actor) {
			tracing::debug!(error = %e, "Rejected driver status change");
			return Err(e.into());
		}
		Self::ensure_not_cancelled(order_id, cancel)?;

		let updated = self
			.store
			.update_driver_status(order_id, order.driver_status, requested)
			.await
			.map_err(|e| {
				CoordinatorError::from_store(order_id, StoreOperation::UpdateDriverStatus, e)
			})?;
		tracing::info!(to = %requested, "Driver status changed");

		if requested != DriverStatus::Completed {
			if self.notify_driver_changes {
				self.broker
					.notify(&updated, StatusChange::Driver(requested))
					.await;
			}
			return Ok(updated);
		}

		let completed = self
			.store
			.update_order_status(order_id, updated.status, OrderStatus::Completed)
			.await
			.map_err(|e| {
				tracing::error!(
					error = %e,
					"Driver status completed but order status write failed"
				);
				CoordinatorError::PartialFailure {
					order_id: order_id.to_string(),
					succeeded: StoreOperation::UpdateDriverStatus,
					failed: StoreOperation::UpdateOrderStatus,
					message: e.to_string(),
				}
			})?;

		tracing::info!(from = %updated.status, "Order completed by driver");
		self.broker
			.notify(&completed, StatusChange::Order(OrderStatus::Completed))
			.await;

		Ok(completed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use dispatch_broker::{BrokerError, BrokerInterface, StatusNotification};
	use dispatch_storage::implementations::memory::MemoryStorage;
	use dispatch_storage::{OrderRepository, StorageService};
	use dispatch_types::{NewOrder, OrderType};
	use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
	use std::sync::Mutex;

	/// Order store that records writes and can fail order status writes.
	struct RecordingStore {
		inner: OrderRepository,
		order_writes: Mutex<Vec<OrderStatus>>,
		driver_writes: Mutex<Vec<DriverStatus>>,
		fail_order_writes: AtomicBool,
	}

	impl RecordingStore {
		fn new() -> Self {
			let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
			Self {
				inner: OrderRepository::new(storage),
				order_writes: Mutex::new(Vec::new()),
				driver_writes: Mutex::new(Vec::new()),
				fail_order_writes: AtomicBool::new(false),
			}
		}

		fn write_count(&self) -> usize {
			self.order_writes.lock().unwrap().len() + self.driver_writes.lock().unwrap().len()
		}
	}

	#[async_trait]
	impl OrderStore for RecordingStore {
		async fn create_order(&self, new: NewOrder) -> Result<Order, StorageError> {
			self.inner.create_order(new).await
		}

		async fn get_order(&self, order_id: &str) -> Result<Order, StorageError> {
			self.inner.get_order(order_id).await
		}

		async fn update_order_status(
			&self,
			order_id: &str,
			expected: OrderStatus,
			status: OrderStatus,
		) -> Result<Order, StorageError> {
			self.order_writes.lock().unwrap().push(status);
			if self.fail_order_writes.load(Ordering::SeqCst) {
				return Err(StorageError::Backend("database unavailable".into()));
			}
			self.inner
				.update_order_status(order_id, expected, status)
				.await
		}

		async fn update_driver_status(
			&self,
			order_id: &str,
			expected: Option<DriverStatus>,
			status: DriverStatus,
		) -> Result<Order, StorageError> {
			self.driver_writes.lock().unwrap().push(status);
			self.inner
				.update_driver_status(order_id, expected, status)
				.await
		}
	}

	#[derive(Clone, Default)]
	struct RecordingBroker {
		received: Arc<Mutex<Vec<(String, StatusChange)>>>,
		calls: Arc<AtomicUsize>,
		fail: bool,
	}

	#[async_trait]
	impl BrokerInterface for RecordingBroker {
		async fn notify_status_change(
			&self,
			notification: &StatusNotification,
		) -> Result<(), BrokerError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			if self.fail {
				return Err(BrokerError::Network("broker down".into()));
			}
			self.received
				.lock()
				.unwrap()
				.push((notification.order_id.clone(), notification.change));
			Ok(())
		}
	}

	fn broker_service(broker: &RecordingBroker) -> BrokerService {
		let target: Box<dyn BrokerInterface> = Box::new(broker.clone());
		BrokerService::new(vec![("recording".to_string(), target)])
	}

	struct Harness {
		store: Arc<RecordingStore>,
		broker: RecordingBroker,
		coordinator: StatusCoordinator,
	}

	fn harness_with(broker: RecordingBroker) -> Harness {
		let store = Arc::new(RecordingStore::new());
		let service = broker_service(&broker);
		let coordinator = StatusCoordinator::new(store.clone(), Arc::new(service));
		Harness {
			store,
			broker,
			coordinator,
		}
	}

	fn harness() -> Harness {
		harness_with(RecordingBroker::default())
	}

	/// Creates an order and moves it to `status` without recording writes.
	async fn seed(h: &Harness, status: OrderStatus, driver_id: Option<&str>) -> Order {
		let initial = if status.is_initial() {
			status
		} else {
			OrderStatus::Active
		};
		let order = h
			.store
			.create_order(NewOrder {
				order_number: format!("OD-{}", status),
				order_type: OrderType::OnDemand,
				status: initial,
				driver_id: driver_id.map(str::to_string),
			})
			.await
			.unwrap();
		if initial == status {
			return order;
		}
		h.store
			.inner
			.update_order_status(&order.id, initial, status)
			.await
			.unwrap()
	}

	fn admin() -> Actor {
		Actor::new(Role::Admin)
	}

	#[tokio::test]
	async fn test_admin_completes_active_order() {
		let h = harness();
		let order = seed(&h, OrderStatus::Active, None).await;

		let updated = h
			.coordinator
			.change_order_status(&order.id, OrderStatus::Completed, &admin(), &CancellationToken::new())
			.await
			.unwrap();

		assert_eq!(updated.status, OrderStatus::Completed);
		assert!(updated.completed_at.is_some());
		assert_eq!(*h.store.order_writes.lock().unwrap(), vec![OrderStatus::Completed]);
		assert_eq!(
			*h.broker.received.lock().unwrap(),
			vec![(order.id.clone(), StatusChange::Order(OrderStatus::Completed))]
		);
	}

	#[tokio::test]
	async fn test_no_op_is_rejected_without_side_effects() {
		let h = harness();
		let order = seed(&h, OrderStatus::Active, None).await;

		let result = h
			.coordinator
			.change_order_status(&order.id, OrderStatus::Active, &admin(), &CancellationToken::new())
			.await;

		assert!(matches!(
			result,
			Err(CoordinatorError::InvalidTransition {
				rule: TransitionRule::NoOp,
				..
			})
		));
		assert_eq!(h.store.write_count(), 0);
		assert_eq!(h.broker.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_cancelled_order_cannot_be_reactivated() {
		let h = harness();
		let order = seed(&h, OrderStatus::Cancelled, None).await;

		let result = h
			.coordinator
			.change_order_status(
				&order.id,
				OrderStatus::Active,
				&Actor::new(Role::SuperAdmin),
				&CancellationToken::new(),
			)
			.await;

		assert!(matches!(result, Err(CoordinatorError::InvalidTransition { .. })));
		assert_eq!(h.store.write_count(), 0);
		assert_eq!(h.broker.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_client_is_forbidden() {
		let h = harness();
		let order = seed(&h, OrderStatus::Pending, None).await;

		for requested in [OrderStatus::Confirmed, OrderStatus::Cancelled] {
			let result = h
				.coordinator
				.change_order_status(
					&order.id,
					requested,
					&Actor::new(Role::Client),
					&CancellationToken::new(),
				)
				.await;
			assert!(matches!(
				result,
				Err(CoordinatorError::Forbidden {
					role: Role::Client,
					..
				})
			));
		}
		let result = h
			.coordinator
			.change_driver_status(
				&order.id,
				DriverStatus::Assigned,
				&Actor::new(Role::Client),
				&CancellationToken::new(),
			)
			.await;
		assert!(matches!(result, Err(CoordinatorError::Forbidden { .. })));
		assert_eq!(h.store.write_count(), 0);
		assert_eq!(h.broker.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_missing_order_is_not_found() {
		let h = harness();
		let result = h
			.coordinator
			.change_order_status("missing", OrderStatus::Active, &admin(), &CancellationToken::new())
			.await;
		assert!(matches!(result, Err(CoordinatorError::NotFound { order_id }) if order_id == "missing"));
	}

	#[tokio::test]
	async fn test_cancellation_prevents_write() {
		let h = harness();
		let order = seed(&h, OrderStatus::Pending, None).await;
		let cancel = CancellationToken::new();
		cancel.cancel();

		let result = h
			.coordinator
			.change_order_status(&order.id, OrderStatus::Confirmed, &admin(), &cancel)
			.await;

		assert!(matches!(result, Err(CoordinatorError::Cancelled { .. })));
		assert_eq!(h.store.write_count(), 0);
		let stored = h.coordinator.get_order(&order.id).await.unwrap();
		assert_eq!(stored.status, OrderStatus::Pending);
	}

	#[tokio::test]
	async fn test_store_failure_is_persistence_failure() {
		let h = harness();
		let order = seed(&h, OrderStatus::Pending, None).await;
		h.store.fail_order_writes.store(true, Ordering::SeqCst);

		let result = h
			.coordinator
			.change_order_status(&order.id, OrderStatus::Confirmed, &admin(), &CancellationToken::new())
			.await;

		assert!(matches!(
			result,
			Err(CoordinatorError::PersistenceFailure {
				operation: StoreOperation::UpdateOrderStatus,
				..
			})
		));
		assert_eq!(h.broker.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_driver_completion_completes_order() {
		let h = harness();
		let order = seed(&h, OrderStatus::Assigned, Some("driver-1")).await;
		let driver = Actor::driver("driver-1");
		let cancel = CancellationToken::new();

		for step in [
			DriverStatus::Assigned,
			DriverStatus::Started,
			DriverStatus::ArrivedToClient,
		] {
			h.coordinator
				.change_driver_status(&order.id, step, &driver, &cancel)
				.await
				.unwrap();
		}
		let completed = h
			.coordinator
			.change_driver_status(&order.id, DriverStatus::Completed, &driver, &cancel)
			.await
			.unwrap();

		assert_eq!(completed.status, OrderStatus::Completed);
		assert_eq!(completed.driver_status, Some(DriverStatus::Completed));
		assert_eq!(*h.store.order_writes.lock().unwrap(), vec![OrderStatus::Completed]);
		assert_eq!(h.store.driver_writes.lock().unwrap().len(), 4);

		let received = h.broker.received.lock().unwrap();
		assert_eq!(received.len(), 4);
		assert_eq!(
			received.last().map(|(_, change)| *change),
			Some(StatusChange::Order(OrderStatus::Completed))
		);
	}

	#[tokio::test]
	async fn test_failed_order_write_after_driver_completion_is_partial() {
		let h = harness();
		let order = seed(&h, OrderStatus::InProgress, Some("driver-1")).await;
		let cancel = CancellationToken::new();
		h.coordinator
			.change_driver_status(&order.id, DriverStatus::ArrivedToClient, &admin(), &cancel)
			.await
			.unwrap();
		let calls_before = h.broker.calls.load(Ordering::SeqCst);
		h.store.fail_order_writes.store(true, Ordering::SeqCst);

		let result = h
			.coordinator
			.change_driver_status(&order.id, DriverStatus::Completed, &Actor::driver("driver-1"), &cancel)
			.await;

		match result {
			Err(CoordinatorError::PartialFailure {
				succeeded, failed, ..
			}) => {
				assert_eq!(succeeded, StoreOperation::UpdateDriverStatus);
				assert_eq!(failed, StoreOperation::UpdateOrderStatus);
			},
			other => panic!("expected partial failure, got {other:?}"),
		}

		let stored = h.coordinator.get_order(&order.id).await.unwrap();
		assert_eq!(stored.driver_status, Some(DriverStatus::Completed));
		assert_eq!(stored.status, OrderStatus::InProgress);
		assert_eq!(h.broker.calls.load(Ordering::SeqCst), calls_before);
	}

	#[tokio::test]
	async fn test_driver_skip_rejected() {
		let h = harness();
		let order = seed(&h, OrderStatus::Assigned, Some("driver-1")).await;
		let driver = Actor::driver("driver-1");
		let cancel = CancellationToken::new();
		h.coordinator
			.change_driver_status(&order.id, DriverStatus::Assigned, &driver, &cancel)
			.await
			.unwrap();
		let writes_before = h.store.write_count();

		let result = h
			.coordinator
			.change_driver_status(&order.id, DriverStatus::Completed, &driver, &cancel)
			.await;

		assert!(matches!(
			result,
			Err(CoordinatorError::InvalidTransition {
				rule: TransitionRule::OutOfSequence,
				..
			})
		));
		assert_eq!(h.store.write_count(), writes_before);
	}

	#[tokio::test]
	async fn test_assigning_order_without_driver_rejected() {
		let h = harness();
		let order = seed(&h, OrderStatus::Active, None).await;

		let result = h
			.coordinator
			.change_driver_status(&order.id, DriverStatus::Assigned, &admin(), &CancellationToken::new())
			.await;

		assert!(matches!(
			result,
			Err(CoordinatorError::InvalidTransition {
				rule: TransitionRule::NoDriver,
				..
			})
		));
		assert_eq!(h.store.write_count(), 0);
		assert_eq!(h.broker.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_other_drivers_order_is_forbidden() {
		let h = harness();
		let order = seed(&h, OrderStatus::Assigned, Some("driver-1")).await;

		let result = h
			.coordinator
			.change_driver_status(
				&order.id,
				DriverStatus::Assigned,
				&Actor::driver("driver-2"),
				&CancellationToken::new(),
			)
			.await;

		assert!(matches!(result, Err(CoordinatorError::Forbidden { .. })));
		assert_eq!(h.store.write_count(), 0);
	}

	#[tokio::test]
	async fn test_broker_failure_does_not_fail_change() {
		let h = harness_with(RecordingBroker {
			fail: true,
			..Default::default()
		});
		let order = seed(&h, OrderStatus::Pending, None).await;

		let updated = h
			.coordinator
			.change_order_status(&order.id, OrderStatus::Confirmed, &admin(), &CancellationToken::new())
			.await
			.unwrap();

		assert_eq!(updated.status, OrderStatus::Confirmed);
		assert_eq!(h.broker.calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_driver_notifications_can_be_disabled() {
		let broker = RecordingBroker::default();
		let store = Arc::new(RecordingStore::new());
		let service = broker_service(&broker);
		let coordinator =
			StatusCoordinator::new(store.clone(), Arc::new(service)).with_driver_notifications(false);

		let order = store
			.create_order(NewOrder {
				order_number: "OD-quiet".into(),
				order_type: OrderType::OnDemand,
				status: OrderStatus::Active,
				driver_id: Some("driver-1".into()),
			})
			.await
			.unwrap();

		coordinator
			.change_driver_status(&order.id, DriverStatus::Assigned, &admin(), &CancellationToken::new())
			.await
			.unwrap();
		assert_eq!(broker.calls.load(Ordering::SeqCst), 0);

		coordinator
			.change_driver_status(&order.id, DriverStatus::Completed, &admin(), &CancellationToken::new())
			.await
			.unwrap();
		assert_eq!(
			*broker.received.lock().unwrap(),
			vec![(order.id.clone(), StatusChange::Order(OrderStatus::Completed))]
		);
	}

	#[tokio::test]
	async fn test_racing_changes_on_one_order() {
		let h = Arc::new(harness());
		let order = seed(&h, OrderStatus::Active, None).await;

		let tasks: Vec<_> = [OrderStatus::Completed, OrderStatus::Cancelled]
			.into_iter()
			.map(|requested| {
				let h = Arc::clone(&h);
				let id = order.id.clone();
				tokio::spawn(async move {
					h.coordinator
						.change_order_status(&id, requested, &admin(), &CancellationToken::new())
						.await
				})
			})
			.collect();

		let mut successes = Vec::new();
		for task in tasks {
			if let Ok(order) = task.await.unwrap() {
				successes.push(order.status);
			}
		}

		assert_eq!(successes.len(), 1);
		let stored = h.coordinator.get_order(&order.id).await.unwrap();
		assert_eq!(stored.status, successes[0]);
		assert_eq!(h.broker.calls.load(Ordering::SeqCst), 1);
	}
}
