//! Utility functions

use rand::RngExt;

pub const ID_LENGTH: usize = 24;
pub const SAFE: [char; 62] = [
	'0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
	'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'A', 'B',
	'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U',
	'V', 'W', 'X', 'Y', 'Z',
];

/// Random row id over a URL-safe alphabet
pub fn random_id() -> String {
	let mut rng = rand::rng();
	(0..ID_LENGTH).map(|_| SAFE[rng.random_range(0..SAFE.len())]).collect()
}

/// Trims a text field and checks its length in characters
pub fn clean_text(field: &str, value: &str, max_chars: usize) -> Result<String, String> {
	let trimmed = value.trim();
	if trimmed.is_empty() {
		return Err(format!("{} is required", field));
	}
	let len = trimmed.chars().count();
	if len > max_chars {
		return Err(format!("{} must be at most {} characters (got {})", field, max_chars, len));
	}
	Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_random_id() {
		let a = random_id();
		let b = random_id();
		assert_eq!(a.len(), ID_LENGTH);
		assert!(a.chars().all(|c| SAFE.contains(&c)));
		assert_ne!(a, b);
	}

	#[test]
	fn test_clean_text() {
		assert_eq!(clean_text("title", "  hi  ", 10), Ok("hi".to_string()));
		assert!(clean_text("title", "   ", 10).is_err());
		assert!(clean_text("title", "abcdef", 5).is_err());
		// counted in characters, not bytes
		assert_eq!(clean_text("title", "ééééé", 5), Ok("ééééé".to_string()));
	}
}

// vim: ts=4
