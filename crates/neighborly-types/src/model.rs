//! Entity rows exchanged with the persistence layer and the change feed.
//!
//! Field names are the snake_case column names of the stored rows, so a row
//! read from storage or carried by a change event deserializes directly.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
	HelpNeeded,
	HelpOffered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
	OfferHelp,
	Comment,
}

impl ResponseType {
	pub fn as_str(&self) -> &'static str {
		match self {
			ResponseType::OfferHelp => "offer_help",
			ResponseType::Comment => "comment",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
	Active,
	Completed,
	Cancelled,
}

impl SessionStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			SessionStatus::Active => "active",
			SessionStatus::Completed => "completed",
			SessionStatus::Cancelled => "cancelled",
		}
	}
}

/// A help request or offer, scoped to one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
	pub id: Box<str>,
	pub user_id: Box<str>,
	pub cluster_id: Box<str>,
	pub title: Box<str>,
	pub description: Box<str>,
	pub post_type: PostType,
	pub is_active: bool,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostResponse {
	pub id: Box<str>,
	pub post_id: Box<str>,
	pub user_id: Box<str>,
	pub response_type: ResponseType,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<Box<str>>,
	#[serde(default)]
	pub is_read: bool,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

impl PostResponse {
	pub fn is_offer(&self) -> bool {
		self.response_type == ResponseType::OfferHelp
	}
}

/// A private conversation between a post owner and a helper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
	pub id: Box<str>,
	pub post_response_id: Box<str>,
	pub post_owner_id: Box<str>,
	pub helper_id: Box<str>,
	pub status: SessionStatus,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

impl ChatSession {
	pub fn is_party(&self, user_id: &str) -> bool {
		self.post_owner_id.as_ref() == user_id || self.helper_id.as_ref() == user_id
	}

	/// The other party of the session, if `user_id` is one of the parties
	pub fn counterpart(&self, user_id: &str) -> Option<&str> {
		if self.post_owner_id.as_ref() == user_id {
			Some(&self.helper_id)
		} else if self.helper_id.as_ref() == user_id {
			Some(&self.post_owner_id)
		} else {
			None
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
	pub id: Box<str>,
	pub session_id: Box<str>,
	pub sender_id: Box<str>,
	pub body: Box<str>,
	#[serde(default)]
	pub is_read: bool,
	pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
	pub id: Box<str>,
	pub email: Box<str>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub first_name: Option<Box<str>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_name: Option<Box<str>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cluster_id: Option<Box<str>>,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

/// Geographic grouping of users, keyed by normalized postcode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
	pub id: Box<str>,
	pub postcode: Box<str>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub area_name: Option<Box<str>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub city: Option<Box<str>>,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

// Write-side inputs
//*******************

#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
	pub title: String,
	pub description: String,
	pub post_type: PostType,
}

/// Partial post update, absent fields stay untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostPatch {
	pub title: Option<String>,
	pub description: Option<String>,
	pub post_type: Option<PostType>,
	pub is_active: Option<bool>,
}

impl PostPatch {
	pub fn is_empty(&self) -> bool {
		self.title.is_none()
			&& self.description.is_none()
			&& self.post_type.is_none()
			&& self.is_active.is_none()
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewResponse {
	pub response_type: ResponseType,
	#[serde(default)]
	pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
	pub email: String,
	#[serde(default)]
	pub first_name: Option<String>,
	#[serde(default)]
	pub last_name: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_post_row_roundtrip_uses_column_names() {
		let row = json!({
			"id": "p1",
			"user_id": "u1",
			"cluster_id": "c1",
			"title": "Need a ladder",
			"description": "Just for an afternoon",
			"post_type": "help_needed",
			"is_active": true,
			"created_at": 10,
			"updated_at": 10
		});
		let post: Post = serde_json::from_value(row.clone()).expect("decode post");
		assert_eq!(post.post_type, PostType::HelpNeeded);
		assert_eq!(post.created_at, Timestamp(10));
		assert_eq!(serde_json::to_value(&post).expect("encode post"), row);
	}

	#[test]
	fn test_response_defaults() {
		let row = json!({
			"id": "r1",
			"post_id": "p1",
			"user_id": "u2",
			"response_type": "offer_help",
			"created_at": 1,
			"updated_at": 1
		});
		let response: PostResponse = serde_json::from_value(row).expect("decode response");
		assert!(response.is_offer());
		assert!(!response.is_read);
		assert!(response.message.is_none());
	}

	#[test]
	fn test_session_parties() {
		let session = ChatSession {
			id: "s1".into(),
			post_response_id: "r1".into(),
			post_owner_id: "owner".into(),
			helper_id: "helper".into(),
			status: SessionStatus::Active,
			created_at: Timestamp(1),
			updated_at: Timestamp(1),
		};
		assert!(session.is_party("owner"));
		assert!(session.is_party("helper"));
		assert!(!session.is_party("stranger"));
		assert_eq!(session.counterpart("owner"), Some("helper"));
		assert_eq!(session.counterpart("stranger"), None);
	}
}

// vim: ts=4
