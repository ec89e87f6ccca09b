//! Builder for constructing dispatch engines.
//!
//! Composes a [`DispatchEngine`] from configured storage and broker
//! implementations using factory functions keyed by implementation name.

use crate::DispatchEngine;
use dispatch_broker::{BrokerError, BrokerFactory, BrokerInterface, BrokerService};
use dispatch_config::Config;
use dispatch_storage::{
	OrderRepository, StorageError, StorageFactory, StorageInterface, StorageService,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component, keyed by name.
pub struct DispatchFactories<SF, BF> {
	pub storage_factories: HashMap<String, SF>,
	pub broker_factories: HashMap<String, BF>,
}

impl DispatchFactories<StorageFactory, BrokerFactory> {
	/// Factories for every implementation shipped with the workspace.
	pub fn builtin() -> Self {
		Self {
			storage_factories: dispatch_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			broker_factories: dispatch_broker::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}
}

pub struct DispatchBuilder {
	config: Config,
}

impl DispatchBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the engine. Only the primary storage implementation is
	/// instantiated; every configured broker is.
	pub fn build<SF, BF>(
		self,
		factories: DispatchFactories<SF, BF>,
	) -> Result<DispatchEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		BF: Fn(&toml::Value) -> Result<Box<dyn BrokerInterface>, BrokerError>,
	{
		let primary = &self.config.storage.primary;
		let storage_config = self.config.storage.implementations.get(primary).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary storage '{}' has no configuration",
				primary
			))
		})?;
		let storage_factory = factories.storage_factories.get(primary).ok_or_else(|| {
			BuilderError::MissingComponent(format!("storage implementation '{}'", primary))
		})?;

		let backend = storage_factory(storage_config).map_err(|e| {
			tracing::error!(
				component = "storage",
				implementation = %primary,
				error = %e,
				"Failed to create storage implementation"
			);
			BuilderError::Config(format!(
				"Failed to create storage implementation '{}': {}",
				primary, e
			))
		})?;
		tracing::info!(component = "storage", implementation = %primary, "Loaded");

		let storage = Arc::new(StorageService::new(backend));
		let store = Arc::new(OrderRepository::new(storage));

		// Sorted so targets are notified in a stable order.
		let mut broker_names: Vec<_> = self.config.broker.implementations.keys().collect();
		broker_names.sort();

		let mut targets = Vec::with_capacity(broker_names.len());
		for name in broker_names {
			let factory = factories.broker_factories.get(name).ok_or_else(|| {
				BuilderError::MissingComponent(format!("broker implementation '{}'", name))
			})?;
			let broker_config = &self.config.broker.implementations[name];

			match factory(broker_config) {
				Ok(implementation) => {
					tracing::info!(component = "broker", implementation = %name, "Loaded");
					targets.push((name.clone(), implementation));
				},
				Err(e) => {
					tracing::error!(
						component = "broker",
						implementation = %name,
						error = %e,
						"Failed to create broker implementation"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create broker implementation '{}': {}",
						name, e
					)));
				},
			}
		}

		if targets.is_empty() {
			tracing::info!(component = "broker", "No brokers configured, sync disabled");
		}
		let broker = Arc::new(BrokerService::new(targets));

		Ok(DispatchEngine::new(self.config, store, broker))
	}
}
