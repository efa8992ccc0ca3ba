//! Snapshot Loader
//!
//! Point-in-time reads of the collections a view shows. Loading never opens
//! a subscription; views open their channels before calling in here so that
//! nothing committed in between is lost.

use neighborly_types::store_adapter::{QueryFilter, QueryOptions, SortField, StoreAdapter};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::prelude::*;
use crate::reconcile::Entity;

#[derive(Debug, Clone)]
pub struct SnapshotLoader {
	store: Arc<dyn StoreAdapter>,
}

/// Decodes rows, skipping the ones that do not fit the entity
pub(crate) fn decode_rows<T: Entity>(rows: Vec<Value>) -> Vec<T> {
	rows.into_iter()
		.filter_map(|row| match serde_json::from_value::<T>(row) {
			Ok(item) => Some(item),
			Err(err) => {
				warn!("Skipping malformed {} row: {}", T::TABLE, err);
				None
			}
		})
		.collect()
}

fn id_values<'a>(ids: impl IntoIterator<Item = &'a str>) -> Vec<Value> {
	ids.into_iter().map(|id| Value::String(id.to_string())).collect()
}

impl SnapshotLoader {
	pub fn new(store: Arc<dyn StoreAdapter>) -> Self {
		Self { store }
	}

	/// Active posts of a cluster, newest first
	pub async fn load_posts(&self, cluster_id: &str, limit: u32) -> NbResult<Vec<Post>> {
		let opts = QueryOptions::new()
			.with_filter(
				QueryFilter::equals_one("cluster_id", json!(cluster_id))
					.with_equals("is_active", json!(true)),
			)
			.with_sort(vec![SortField::desc("created_at")])
			.with_limit(limit);
		let rows = self.store.query(Table::Posts, opts).await?;
		Ok(decode_rows(rows))
	}

	/// Responses to a post, oldest first
	pub async fn load_responses(&self, post_id: &str) -> NbResult<Vec<PostResponse>> {
		let opts = QueryOptions::new()
			.with_filter(QueryFilter::equals_one("post_id", json!(post_id)))
			.with_sort(vec![SortField::asc("created_at")]);
		let rows = self.store.query(Table::PostResponses, opts).await?;
		Ok(decode_rows(rows))
	}

	/// Responses to several posts at once, oldest first
	pub async fn load_responses_for_posts<'a>(
		&self,
		post_ids: impl IntoIterator<Item = &'a str>,
	) -> NbResult<Vec<PostResponse>> {
		let ids = id_values(post_ids);
		if ids.is_empty() {
			return Ok(Vec::new());
		}
		let opts = QueryOptions::new()
			.with_filter(QueryFilter::new().with_in_array("post_id", ids))
			.with_sort(vec![SortField::asc("created_at")]);
		let rows = self.store.query(Table::PostResponses, opts).await?;
		Ok(decode_rows(rows))
	}

	pub async fn load_session(&self, session_id: &str) -> NbResult<Option<ChatSession>> {
		match self.store.get(Table::ChatSessions, session_id).await? {
			Some(row) => Ok(Some(serde_json::from_value(row)?)),
			None => Ok(None),
		}
	}

	/// Sessions where the user is the post owner or the helper, most
	/// recently updated first
	pub async fn load_sessions(&self, user_id: &str) -> NbResult<Vec<ChatSession>> {
		let mut sessions = Vec::new();
		for column in ["post_owner_id", "helper_id"] {
			let opts = QueryOptions::new().with_filter(QueryFilter::equals_one(column, json!(user_id)));
			let rows = self.store.query(Table::ChatSessions, opts).await?;
			for session in decode_rows::<ChatSession>(rows) {
				if !sessions.iter().any(|s: &ChatSession| s.id == session.id) {
					sessions.push(session);
				}
			}
		}
		sessions.sort_by_key(|s| std::cmp::Reverse(s.updated_at));
		Ok(sessions)
	}

	/// The latest `limit` messages of a session, oldest first
	pub async fn load_messages(&self, session_id: &str, limit: u32) -> NbResult<Vec<ChatMessage>> {
		let opts = QueryOptions::new()
			.with_filter(QueryFilter::equals_one("session_id", json!(session_id)))
			.with_sort(vec![SortField::desc("created_at")])
			.with_limit(limit);
		let rows = self.store.query(Table::ChatMessages, opts).await?;
		let mut messages: Vec<ChatMessage> = decode_rows(rows);
		messages.reverse();
		Ok(messages)
	}

	/// Messages of several sessions at once, oldest first
	pub async fn load_messages_for_sessions<'a>(
		&self,
		session_ids: impl IntoIterator<Item = &'a str>,
	) -> NbResult<Vec<ChatMessage>> {
		let ids = id_values(session_ids);
		if ids.is_empty() {
			return Ok(Vec::new());
		}
		let opts = QueryOptions::new()
			.with_filter(QueryFilter::new().with_in_array("session_id", ids))
			.with_sort(vec![SortField::asc("created_at")]);
		let rows = self.store.query(Table::ChatMessages, opts).await?;
		Ok(decode_rows(rows))
	}
}

// vim: ts=4
