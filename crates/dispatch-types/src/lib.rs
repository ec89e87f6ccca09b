//! Common types module for the courier dispatch system.
//!
//! This module defines the core data types shared by every dispatch crate:
//! the order and driver status enumerations, the order entity, actor roles,
//! and the configuration validation helpers used by pluggable implementations.

/// Order entity and status change payloads.
pub mod order;
/// Implementation registry trait for config-driven factories.
pub mod registry;
/// Actor roles used to authorize status changes.
pub mod role;
/// Order and driver status enumerations.
pub mod status;
/// Storage namespaces.
pub mod storage;
/// Formatting helpers shared across crates.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use order::*;
pub use registry::ImplementationRegistry;
pub use role::*;
pub use status::*;
pub use storage::*;
pub use utils::truncate_id;
pub use validation::*;
