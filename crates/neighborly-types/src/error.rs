//! Error type shared by the sync core and its adapters

use std::time::Duration;

pub type NbResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	NotFound,
	PermissionDenied,
	/// No identity was present for an action that needs one
	Unauthenticated,
	ValidationError(String),
	Conflict(String),
	RateLimited {
		retry_after: Duration,
	},
	/// The change feed could not establish (or lost) a channel
	FeedUnavailable(String),
	DbError,
	Parse,
	Internal(String),

	// externals
	Io(std::io::Error),
}

impl Error {
	/// Transient errors leave the caller in a usable state and may be retried
	pub fn is_transient(&self) -> bool {
		matches!(self, Error::FeedUnavailable(_) | Error::RateLimited { .. })
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Error::NotFound => write!(f, "not found"),
			Error::PermissionDenied => write!(f, "permission denied"),
			Error::Unauthenticated => write!(f, "authentication required"),
			Error::ValidationError(msg) => write!(f, "validation error: {}", msg),
			Error::Conflict(msg) => write!(f, "conflict: {}", msg),
			Error::RateLimited { retry_after } => {
				write!(f, "rate limited, retry after {}ms", retry_after.as_millis())
			}
			Error::FeedUnavailable(msg) => write!(f, "change feed unavailable: {}", msg),
			Error::DbError => write!(f, "database error"),
			Error::Parse => write!(f, "parse error"),
			Error::Internal(msg) => write!(f, "internal error: {}", msg),
			Error::Io(err) => write!(f, "io error: {}", err),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(err) => Some(err),
			_ => None,
		}
	}
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Self::Io(err)
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		tracing::debug!("json error: {}", err);
		Self::Parse
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_display_messages() {
		assert_eq!(Error::Unauthenticated.to_string(), "authentication required");
		assert_eq!(
			Error::Conflict("already offered".into()).to_string(),
			"conflict: already offered"
		);
		assert_eq!(
			Error::RateLimited { retry_after: Duration::from_millis(1500) }.to_string(),
			"rate limited, retry after 1500ms"
		);
	}

	#[test]
	fn test_transient_errors() {
		assert!(Error::FeedUnavailable("down".into()).is_transient());
		assert!(!Error::PermissionDenied.is_transient());
		assert!(!Error::NotFound.is_transient());
	}
}

// vim: ts=4
