//! Handlers that orchestrate status changes against the order store and
//! broker sync.

pub mod status;

pub use status::{CoordinatorError, StatusCoordinator, StoreOperation};
