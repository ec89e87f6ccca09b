//! Storage-related types for the dispatch system.

/// Storage namespaces for the data the dispatch system persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order records keyed by order id.
	Orders,
	/// Order ids keyed by human-facing order number.
	OrderByNumber,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::OrderByNumber => "order_by_number",
		}
	}
}
