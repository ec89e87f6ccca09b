//! Core of the courier dispatch system.
//!
//! Ties the transition rules in [`state`] to the order store and broker sync
//! through the [`StatusCoordinator`], and assembles the pieces from
//! configuration with the [`DispatchBuilder`].

pub mod builder;
pub mod handlers;
pub mod state;

pub use builder::{BuilderError, DispatchBuilder, DispatchFactories};
pub use handlers::{CoordinatorError, StatusCoordinator, StoreOperation};
pub use state::{
	format_status, format_status_str, validate_driver_transition, validate_transition,
	StatusDisplay, StatusKind, TransitionError, TransitionRule,
};

use dispatch_broker::BrokerService;
use dispatch_config::Config;
use dispatch_storage::OrderStore;
use std::sync::Arc;

/// A fully assembled dispatch instance.
#[derive(Clone)]
pub struct DispatchEngine {
	config: Config,
	store: Arc<dyn OrderStore>,
	broker: Arc<BrokerService>,
	coordinator: Arc<StatusCoordinator>,
}

impl DispatchEngine {
	pub fn new(config: Config, store: Arc<dyn OrderStore>, broker: Arc<BrokerService>) -> Self {
		let coordinator = Arc::new(
			StatusCoordinator::new(store.clone(), broker.clone())
				.with_driver_notifications(config.dispatch.notify_driver_changes),
		);

		Self {
			config,
			store,
			broker,
			coordinator,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Order store, used directly for order creation.
	pub fn store(&self) -> &Arc<dyn OrderStore> {
		&self.store
	}

	pub fn broker(&self) -> &Arc<BrokerService> {
		&self.broker
	}

	pub fn coordinator(&self) -> &Arc<StatusCoordinator> {
		&self.coordinator
	}
}
