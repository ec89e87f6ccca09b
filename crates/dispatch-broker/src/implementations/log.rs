//! Broker that records notifications in the service log.
//!
//! Handy in development, where no broker is reachable but the flow of
//! notifications should still be visible.

use crate::{BrokerError, BrokerInterface, StatusNotification};
use async_trait::async_trait;
use dispatch_types::{truncate_id, ConfigSchema, Field, FieldType, Schema, ValidationError};

pub struct LogBroker {
	/// Log target the notifications are written under.
	target: String,
}

impl LogBroker {
	pub fn new(target: impl Into<String>) -> Self {
		Self {
			target: target.into(),
		}
	}
}

#[async_trait]
impl BrokerInterface for LogBroker {
	async fn notify_status_change(
		&self,
		notification: &StatusNotification,
	) -> Result<(), BrokerError> {
		tracing::info!(
			broker_target = %self.target,
			order_id = %truncate_id(&notification.order_id),
			order_number = %notification.order_number,
			change = %notification.change,
			status = %notification.status,
			"Status change"
		);
		Ok(())
	}
}

pub struct LogBrokerSchema;

impl ConfigSchema for LogBrokerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![Field::new("target", FieldType::String)]).validate(config)
	}
}

/// Creates a log broker.
///
/// Configuration parameters:
/// - `target`: label included with every logged change (default: "broker")
pub fn create_broker(config: &toml::Value) -> Result<Box<dyn BrokerInterface>, BrokerError> {
	LogBrokerSchema
		.validate(config)
		.map_err(|e| BrokerError::Configuration(e.to_string()))?;

	let target = config
		.get("target")
		.and_then(|v| v.as_str())
		.unwrap_or("broker");
	Ok(Box::new(LogBroker::new(target)))
}

pub struct Registry;

impl dispatch_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "log";
	type Factory = crate::BrokerFactory;

	fn factory() -> Self::Factory {
		create_broker
	}
}

impl crate::BrokerRegistry for Registry {}
