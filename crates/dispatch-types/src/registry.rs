//! Registry trait for self-registering implementations.
//!
//! Storage and broker implementations each expose a `Registry` type that
//! names the configuration key it answers to and hands out its factory.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// The key used in the TOML configuration, for example `memory` for
	/// `storage.implementations.memory` or `webhook` for
	/// `broker.implementations.webhook`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Returns the factory that builds this implementation from its config.
	fn factory() -> Self::Factory;
}
