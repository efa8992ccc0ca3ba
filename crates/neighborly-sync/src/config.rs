//! Sync layer settings

use std::num::NonZeroU32;
use std::str::FromStr;

use crate::prelude::*;

const DEFAULT_WRITES_PER_MINUTE: NonZeroU32 = match NonZeroU32::new(30) {
	Some(v) => v,
	None => unreachable!(),
};
const DEFAULT_WRITE_BURST: NonZeroU32 = match NonZeroU32::new(10) {
	Some(v) => v,
	None => unreachable!(),
};

/// Per-user write throttling of the action gateway
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
	pub enabled: bool,
	/// Sustained writes per minute per user
	pub writes_per_minute: NonZeroU32,
	/// Writes allowed back to back before throttling starts
	pub burst: NonZeroU32,
}

impl Default for RateLimitConfig {
	fn default() -> Self {
		Self { enabled: true, writes_per_minute: DEFAULT_WRITES_PER_MINUTE, burst: DEFAULT_WRITE_BURST }
	}
}

impl RateLimitConfig {
	pub fn disabled() -> Self {
		Self { enabled: false, ..Self::default() }
	}
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
	/// Posts loaded into a fresh activity view
	pub post_limit: u32,
	/// Messages loaded into a fresh chat view
	pub message_limit: u32,
	/// Child rows kept while waiting for their parent to show up
	pub max_parked: usize,
	pub rate_limit: RateLimitConfig,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self { post_limit: 10, message_limit: 50, max_parked: 256, rate_limit: RateLimitConfig::default() }
	}
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
	match std::env::var(name) {
		Ok(value) => value.trim().parse().unwrap_or_else(|_| {
			warn!("Ignoring invalid {}={:?}", name, value);
			default
		}),
		Err(_) => default,
	}
}

impl SyncConfig {
	/// Defaults overridden by `NEIGHBORLY_*` environment variables
	pub fn from_env() -> Self {
		let defaults = Self::default();
		Self {
			post_limit: env_or("NEIGHBORLY_POST_LIMIT", defaults.post_limit),
			message_limit: env_or("NEIGHBORLY_MESSAGE_LIMIT", defaults.message_limit),
			max_parked: env_or("NEIGHBORLY_MAX_PARKED", defaults.max_parked),
			rate_limit: RateLimitConfig {
				enabled: env_or("NEIGHBORLY_RATE_LIMIT", defaults.rate_limit.enabled),
				writes_per_minute: env_or(
					"NEIGHBORLY_WRITES_PER_MINUTE",
					defaults.rate_limit.writes_per_minute,
				),
				burst: env_or("NEIGHBORLY_WRITE_BURST", defaults.rate_limit.burst),
			},
		}
	}

	pub fn with_post_limit(mut self, post_limit: u32) -> Self {
		self.post_limit = post_limit;
		self
	}

	pub fn with_message_limit(mut self, message_limit: u32) -> Self {
		self.message_limit = message_limit;
		self
	}

	pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
		self.rate_limit = rate_limit;
		self
	}
}


// vim: ts=4
