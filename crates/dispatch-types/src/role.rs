//! Actor roles used to gate status change requests.
//!
//! Roles are never read from ambient session state inside the dispatch core;
//! every caller passes an explicit [`Actor`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

/// Role of the party requesting a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
	Admin,
	SuperAdmin,
	Helpdesk,
	Driver,
	Vendor,
	Client,
}

impl Role {
	pub const ALL: [Role; 6] = [
		Role::Admin,
		Role::SuperAdmin,
		Role::Helpdesk,
		Role::Driver,
		Role::Vendor,
		Role::Client,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Role::Admin => "ADMIN",
			Role::SuperAdmin => "SUPER_ADMIN",
			Role::Helpdesk => "HELPDESK",
			Role::Driver => "DRIVER",
			Role::Vendor => "VENDOR",
			Role::Client => "CLIENT",
		}
	}

	/// Staff roles may invoke arbitrary transitions.
	pub fn is_staff(&self) -> bool {
		matches!(self, Role::Admin | Role::SuperAdmin | Role::Helpdesk)
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Role {
	type Err = UnknownRole;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let normalized = s.trim().to_ascii_uppercase();
		Role::ALL
			.into_iter()
			.find(|role| role.as_str() == normalized)
			.ok_or_else(|| UnknownRole(s.to_string()))
	}
}

/// The party requesting a status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
	pub role: Role,
	/// Identity of the actor, required for a driver to act on their own orders.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
}

impl Actor {
	pub fn new(role: Role) -> Self {
		Self {
			role,
			user_id: None,
		}
	}

	pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
		self.user_id = Some(user_id.into());
		self
	}

	/// Convenience constructor for a driver acting on their own behalf.
	pub fn driver(user_id: impl Into<String>) -> Self {
		Self::new(Role::Driver).with_user_id(user_id)
	}
}
