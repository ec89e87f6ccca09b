//! Human-readable presentation of statuses.
//!
//! The mapping is an exhaustive match over each enumeration, so adding a
//! status without deciding how it looks does not compile.

use dispatch_types::{DriverStatus, OrderStatus, StatusError};
use serde::Serialize;

/// Label and presentation tokens for one status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDisplay {
	pub label: String,
	pub color_token: &'static str,
	pub icon_token: &'static str,
}

/// A status that can be presented to people.
pub trait StatusLabel: Copy {
	/// Upper snake case wire value.
	fn wire_value(&self) -> &'static str;

	/// `(color_token, icon_token)`.
	fn tokens(&self) -> (&'static str, &'static str);
}

impl StatusLabel for OrderStatus {
	fn wire_value(&self) -> &'static str {
		self.as_str()
	}

	fn tokens(&self) -> (&'static str, &'static str) {
		match self {
			OrderStatus::Pending => ("amber", "clock"),
			OrderStatus::Confirmed => ("blue", "check"),
			OrderStatus::Active => ("sky", "play"),
			OrderStatus::Assigned => ("indigo", "user-check"),
			OrderStatus::InProgress => ("violet", "truck"),
			OrderStatus::Delivered => ("teal", "package-check"),
			OrderStatus::Completed => ("green", "check-circle"),
			OrderStatus::Cancelled => ("red", "x-circle"),
		}
	}
}

impl StatusLabel for DriverStatus {
	fn wire_value(&self) -> &'static str {
		self.as_str()
	}

	fn tokens(&self) -> (&'static str, &'static str) {
		match self {
			DriverStatus::Assigned => ("indigo", "user-check"),
			DriverStatus::Started => ("violet", "navigation"),
			DriverStatus::ArrivedAtVendor => ("orange", "store"),
			DriverStatus::EnRouteToClient => ("sky", "truck"),
			DriverStatus::ArrivedToClient => ("teal", "map-pin"),
			DriverStatus::Completed => ("green", "check-circle"),
		}
	}
}

/// Which enumeration a raw status value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
	Order,
	Driver,
}

/// Converts `IN_PROGRESS` into `In Progress`.
fn title_case(wire_value: &str) -> String {
	wire_value
		.split('_')
		.filter(|word| !word.is_empty())
		.map(|word| {
			let lower = word.to_ascii_lowercase();
			let mut chars = lower.chars();
			match chars.next() {
				Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
				None => String::new(),
			}
		})
		.collect::<Vec<_>>()
		.join(" ")
}

pub fn format_status<S: StatusLabel>(status: S) -> StatusDisplay {
	let (color_token, icon_token) = status.tokens();
	StatusDisplay {
		label: title_case(status.wire_value()),
		color_token,
		icon_token,
	}
}

/// Formats a raw status value, failing for values outside the enumeration.
pub fn format_status_str(kind: StatusKind, raw: &str) -> Result<StatusDisplay, StatusError> {
	match kind {
		StatusKind::Order => raw.parse::<OrderStatus>().map(format_status),
		StatusKind::Driver => raw.parse::<DriverStatus>().map(format_status),
	}
}
