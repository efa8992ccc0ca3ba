//! Write throttling
//!
//! One keyed GCRA limiter per process, keyed by user id and shared by every
//! gateway handed out by the app. State lives in memory only.

use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};

use crate::config::RateLimitConfig;
use crate::prelude::*;

type KeyedLimiter = RateLimiter<Box<str>, DashMapStateStore<Box<str>>, DefaultClock>;

pub struct WriteLimiter {
	limiter: Option<KeyedLimiter>,
}

impl std::fmt::Debug for WriteLimiter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WriteLimiter")
			.field("enabled", &self.limiter.is_some())
			.field("tracked_users", &self.tracked_users())
			.finish()
	}
}

impl WriteLimiter {
	pub fn new(config: &RateLimitConfig) -> Self {
		if !config.enabled {
			return Self { limiter: None };
		}
		let quota = Quota::per_minute(config.writes_per_minute).allow_burst(config.burst);
		Self { limiter: Some(RateLimiter::keyed(quota)) }
	}

	pub fn unlimited() -> Self {
		Self { limiter: None }
	}

	/// Takes one write from the user's budget
	pub fn check(&self, user_id: &str) -> NbResult<()> {
		let Some(limiter) = &self.limiter else {
			return Ok(());
		};
		let key: Box<str> = user_id.into();
		limiter.check_key(&key).map_err(|not_until| {
			let retry_after = not_until.wait_time_from(DefaultClock::default().now());
			debug!("Write rate limit hit for {} (retry after {:?})", user_id, retry_after);
			Error::RateLimited { retry_after }
		})
	}

	/// Drops state for users whose budget is full again
	pub fn prune(&self) {
		if let Some(limiter) = &self.limiter {
			limiter.retain_recent();
			limiter.shrink_to_fit();
		}
	}

	pub fn tracked_users(&self) -> usize {
		self.limiter.as_ref().map_or(0, KeyedLimiter::len)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::num::NonZeroU32;

	fn config(burst: u32) -> RateLimitConfig {
		RateLimitConfig {
			enabled: true,
			writes_per_minute: NonZeroU32::new(1).expect("non-zero"),
			burst: NonZeroU32::new(burst).expect("non-zero"),
		}
	}

	#[test]
	fn test_burst_then_limited() {
		let limiter = WriteLimiter::new(&config(2));
		assert!(limiter.check("u1").is_ok());
		assert!(limiter.check("u1").is_ok());
		match limiter.check("u1") {
			Err(Error::RateLimited { retry_after }) => assert!(retry_after.as_secs() <= 60),
			other => panic!("expected rate limit, got {:?}", other),
		}
		// other users have their own budget
		assert!(limiter.check("u2").is_ok());
		assert_eq!(limiter.tracked_users(), 2);
	}

	#[test]
	fn test_disabled_never_limits() {
		let limiter = WriteLimiter::new(&RateLimitConfig::disabled());
		for _ in 0..100 {
			assert!(limiter.check("u1").is_ok());
		}
		limiter.prune();
		assert_eq!(limiter.tracked_users(), 0);
	}
}

// vim: ts=4
