//! Authenticated caller identity
//!
//! Authentication itself happens elsewhere. What reaches the sync layer is a
//! stable opaque user id, or nothing at all for an anonymous caller.

use crate::error::{Error, NbResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
	user_id: Option<Box<str>>,
}

impl Identity {
	pub fn anonymous() -> Self {
		Self { user_id: None }
	}

	pub fn user(user_id: impl Into<Box<str>>) -> Self {
		Self { user_id: Some(user_id.into()) }
	}

	pub fn user_id(&self) -> Option<&str> {
		self.user_id.as_deref()
	}

	pub fn is_authenticated(&self) -> bool {
		self.user_id.is_some()
	}

	/// Returns the user id or `Error::Unauthenticated`
	pub fn require(&self) -> NbResult<&str> {
		self.user_id.as_deref().ok_or(Error::Unauthenticated)
	}
}

// vim: ts=4
