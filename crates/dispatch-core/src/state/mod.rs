//! Status rules and presentation.
//!
//! Everything in this module is pure: no I/O, no clock, no shared state.

pub mod format;
pub mod transition;

pub use format::{format_status, format_status_str, StatusDisplay, StatusKind, StatusLabel};
pub use transition::{
	validate_driver_transition, validate_transition, TransitionError, TransitionRule,
};
