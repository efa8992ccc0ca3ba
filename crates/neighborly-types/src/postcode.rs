//! UK postcode handling and the address lookup adapter
//!
//! Clusters are keyed by the normalized postcode: whitespace removed and
//! uppercased. The display form puts a single space before the three
//! character inward code.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::LazyLock;

use crate::prelude::*;

static POSTCODE_REGEX: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"^[A-Z]{1,2}[0-9][A-Z0-9]?[0-9][A-Z]{2}$").ok());

/// Country assumed when the lookup does not report one
pub const DEFAULT_COUNTRY: &str = "United Kingdom";

/// Strip all whitespace and uppercase
pub fn normalize_postcode(postcode: &str) -> String {
	postcode.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_uppercase()
}

/// Display form, e.g. `"sw1a1aa"` becomes `"SW1A 1AA"`
pub fn format_postcode(postcode: &str) -> String {
	let normalized = normalize_postcode(postcode);
	let len = normalized.chars().count();
	if len < 5 {
		return normalized;
	}
	let split = normalized.char_indices().nth(len - 3).map_or(normalized.len(), |(i, _)| i);
	format!("{} {}", &normalized[..split], &normalized[split..])
}

pub fn is_valid_postcode_format(postcode: &str) -> bool {
	let normalized = normalize_postcode(postcode);
	POSTCODE_REGEX.as_ref().is_some_and(|re| re.is_match(&normalized))
}

/// One address returned by the lookup service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressCandidate {
	pub address: Box<str>,
	pub city: Box<str>,
	pub postcode: Box<str>,
	pub county: Box<str>,
	pub country: Box<str>,
	pub full_address: Box<str>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub latitude: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub longitude: Option<f64>,
}

#[async_trait]
pub trait AddressLookup: Debug + Send + Sync {
	/// Candidate addresses for a normalized postcode
	async fn lookup(&self, postcode: &str) -> NbResult<Vec<AddressCandidate>>;
}

/// Validates the postcode before handing the normalized form to the lookup
pub async fn lookup_addresses(
	lookup: &dyn AddressLookup,
	postcode: &str,
) -> NbResult<Vec<AddressCandidate>> {
	let normalized = normalize_postcode(postcode);
	if normalized.is_empty() {
		return Err(Error::ValidationError("postcode is required".into()));
	}
	if !is_valid_postcode_format(&normalized) {
		return Err(Error::ValidationError(format!("invalid postcode: {}", postcode)));
	}
	let candidates = lookup.lookup(&normalized).await?;
	debug!("address lookup for {} returned {} candidates", normalized, candidates.len());
	Ok(candidates)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Debug)]
	struct FixedLookup;

	#[async_trait]
	impl AddressLookup for FixedLookup {
		async fn lookup(&self, postcode: &str) -> NbResult<Vec<AddressCandidate>> {
			Ok(vec![AddressCandidate {
				address: "10 Downing Street".into(),
				city: "London".into(),
				postcode: postcode.into(),
				county: "Greater London".into(),
				country: DEFAULT_COUNTRY.into(),
				full_address: "10 Downing Street, London".into(),
				latitude: None,
				longitude: None,
			}])
		}
	}

	#[test]
	fn test_normalize() {
		assert_eq!(normalize_postcode(" sw1a 1aa "), "SW1A1AA");
		assert_eq!(normalize_postcode("m1\t1ae"), "M11AE");
	}

	#[test]
	fn test_format() {
		assert_eq!(format_postcode("sw1a1aa"), "SW1A 1AA");
		assert_eq!(format_postcode("M11AE"), "M1 1AE");
		assert_eq!(format_postcode("AB1"), "AB1");
	}

	#[test]
	fn test_validate() {
		assert!(is_valid_postcode_format("SW1A 1AA"));
		assert!(is_valid_postcode_format("m1 1ae"));
		assert!(is_valid_postcode_format("EC1A1BB"));
		assert!(!is_valid_postcode_format("12345"));
		assert!(!is_valid_postcode_format("SW1A"));
		assert!(!is_valid_postcode_format(""));
	}

	#[tokio::test]
	async fn test_lookup_rejects_invalid_postcode() {
		let res = lookup_addresses(&FixedLookup, "not a postcode").await;
		assert!(matches!(res, Err(Error::ValidationError(_))));

		let found = lookup_addresses(&FixedLookup, "sw1a 1aa").await.expect("lookup");
		assert_eq!(found.len(), 1);
		assert_eq!(found[0].postcode.as_ref(), "SW1A1AA");
	}
}

// vim: ts=4
