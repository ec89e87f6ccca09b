//! Status transition rules.
//!
//! These are pure decision functions: they read nothing and write nothing,
//! so every rule can be checked without a store.
//!
//! Staff (`ADMIN`, `SUPER_ADMIN`, `HELPDESK`) may move an order or its driver
//! status anywhere that is not terminal and not a no-op. A `DRIVER` may only
//! advance the driver status of their own order one step at a time through
//! `ASSIGNED -> STARTED -> ARRIVED_TO_CLIENT -> COMPLETED`. Everyone else is
//! refused. Authorization is checked before the status rules. Nobody may set
//! the driver status `ASSIGNED` on an order without a driver.

use dispatch_types::{Actor, DriverStatus, Order, OrderStatus, Role};
use std::fmt;
use thiserror::Error;

/// Which status rule rejected a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionRule {
	/// The current status is terminal.
	Terminal,
	/// The requested status equals the current one.
	NoOp,
	/// A driver tried to skip ahead, go back or set a substate.
	OutOfSequence,
	/// `ASSIGNED` was requested for an order with no driver.
	NoDriver,
}

impl fmt::Display for TransitionRule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransitionRule::Terminal => write!(f, "current status is terminal"),
			TransitionRule::NoOp => write!(f, "status is unchanged"),
			TransitionRule::OutOfSequence => write!(f, "drivers must advance one step at a time"),
			TransitionRule::NoDriver => write!(f, "order has no driver"),
		}
	}
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
	#[error("Invalid transition from {from} to {to}: {rule}")]
	InvalidTransition {
		from: String,
		to: String,
		rule: TransitionRule,
	},
	#[error("Role {role} may not {action}")]
	Forbidden { role: Role, action: &'static str },
}

fn invalid(from: impl fmt::Display, to: impl fmt::Display, rule: TransitionRule) -> TransitionError {
	TransitionError::InvalidTransition {
		from: from.to_string(),
		to: to.to_string(),
		rule,
	}
}

/// Decides whether `role` may move an order from `current` to `requested`.
pub fn validate_transition(
	current: OrderStatus,
	requested: OrderStatus,
	role: Role,
) -> Result<(), TransitionError> {
	if !role.is_staff() {
		return Err(TransitionError::Forbidden {
			role,
			action: "change order status",
		});
	}
	if current.is_terminal() {
		return Err(invalid(current, requested, TransitionRule::Terminal));
	}
	if current == requested {
		return Err(invalid(current, requested, TransitionRule::NoOp));
	}
	Ok(())
}

/// Decides whether `actor` may set the driver status of `order` to `requested`.
pub fn validate_driver_transition(
	order: &Order,
	requested: DriverStatus,
	actor: &Actor,
) -> Result<(), TransitionError> {
	match actor.role {
		role if role.is_staff() => {},
		Role::Driver if order.is_assigned_to(actor.user_id.as_deref()) => {},
		role => {
			return Err(TransitionError::Forbidden {
				role,
				action: "change the driver status of this order",
			})
		},
	}

	let current = order.driver_status;
	let from = current.map_or_else(|| "UNSET".to_string(), |s| s.to_string());

	if order.status.is_terminal() || current.is_some_and(|s| s.is_terminal()) {
		return Err(invalid(from, requested, TransitionRule::Terminal));
	}
	if current == Some(requested) {
		return Err(invalid(from, requested, TransitionRule::NoOp));
	}
	if requested == DriverStatus::Assigned && order.driver_id.is_none() {
		return Err(invalid(from, requested, TransitionRule::NoDriver));
	}
	if actor.role == Role::Driver && DriverStatus::next_for_driver(current) != Some(requested) {
		return Err(invalid(from, requested, TransitionRule::OutOfSequence));
	}

	Ok(())
}
