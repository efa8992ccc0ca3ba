//! Common scalar types

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Timestamp {
		let millis = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
			.unwrap_or_default();
		Timestamp(millis)
	}

	pub fn from_now(delta_millis: i64) -> Timestamp {
		Timestamp(Timestamp::now().0.saturating_add(delta_millis))
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<i64> for Timestamp {
	fn from(millis: i64) -> Self {
		Timestamp(millis)
	}
}

// vim: ts=4
