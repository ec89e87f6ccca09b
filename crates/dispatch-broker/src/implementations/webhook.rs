//! Broker that POSTs notifications as JSON to an HTTP endpoint.

use crate::{BrokerError, BrokerInterface, StatusNotification};
use async_trait::async_trait;
use dispatch_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
const API_KEY_HEADER: &str = "x-api-key";

pub struct WebhookBroker {
	client: reqwest::Client,
	url: String,
	api_key: Option<String>,
}

impl WebhookBroker {
	pub fn new(url: String, api_key: Option<String>, timeout: Duration) -> Result<Self, BrokerError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| BrokerError::Configuration(e.to_string()))?;

		Ok(Self {
			client,
			url,
			api_key,
		})
	}
}

#[async_trait]
impl BrokerInterface for WebhookBroker {
	async fn notify_status_change(
		&self,
		notification: &StatusNotification,
	) -> Result<(), BrokerError> {
		let mut request = self.client.post(&self.url).json(notification);
		if let Some(key) = &self.api_key {
			request = request.header(API_KEY_HEADER, key);
		}

		let response = request
			.send()
			.await
			.map_err(|e| BrokerError::Network(e.to_string()))?;

		let status = response.status();
		if status.is_success() {
			return Ok(());
		}

		let body = response.text().await.unwrap_or_default();
		Err(BrokerError::Rejected {
			status: status.as_u16(),
			body,
		})
	}
}

pub struct WebhookBrokerSchema;

impl ConfigSchema for WebhookBrokerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("url", FieldType::String).with_validator(|value| {
				let url = value.as_str().unwrap_or_default();
				if url.starts_with("http://") || url.starts_with("https://") {
					Ok(())
				} else {
					Err("url must start with http:// or https://".to_string())
				}
			})],
			vec![
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(300),
					},
				),
				Field::new("api_key", FieldType::String),
			],
		);
		schema.validate(config)
	}
}

/// Creates a webhook broker.
///
/// Configuration parameters:
/// - `url`: endpoint receiving the JSON notifications (required)
/// - `timeout_seconds`: per-request timeout (default: 10)
/// - `api_key`: sent as `x-api-key` when set and non-empty
pub fn create_broker(config: &toml::Value) -> Result<Box<dyn BrokerInterface>, BrokerError> {
	WebhookBrokerSchema
		.validate(config)
		.map_err(|e| BrokerError::Configuration(e.to_string()))?;

	let url = config
		.get("url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| BrokerError::Configuration("url is required".into()))?
		.to_string();
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|secs| secs as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
	let api_key = config
		.get("api_key")
		.and_then(|v| v.as_str())
		.filter(|key| !key.is_empty())
		.map(str::to_string);

	Ok(Box::new(WebhookBroker::new(
		url,
		api_key,
		Duration::from_secs(timeout),
	)?))
}

pub struct Registry;

impl dispatch_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "webhook";
	type Factory = crate::BrokerFactory;

	fn factory() -> Self::Factory {
		create_broker
	}
}

impl crate::BrokerRegistry for Registry {}
