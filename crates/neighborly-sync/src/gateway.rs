//! Action Gateway
//!
//! One method per user action. Each one refuses anonymous callers, takes a
//! write from the caller's rate budget, validates its input, checks the
//! business rules against persistence and only then writes. The gateway
//! never touches a view's collections: the written row comes back to every
//! subscribed view, this one included, through the change feed.

use neighborly_types::model::{
	Cluster, NewPost, NewResponse, NewUser, PostPatch, ResponseType, SessionStatus, User,
};
use neighborly_types::postcode::{is_valid_postcode_format, normalize_postcode};
use neighborly_types::store_adapter::{QueryFilter, QueryOptions, StoreAdapter};
use neighborly_types::utils::{clean_text, random_id};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::prelude::*;
use crate::rate_limit::WriteLimiter;

pub const TITLE_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MAX_CHARS: usize = 500;
pub const MESSAGE_MAX_CHARS: usize = 1000;

fn decode<T: DeserializeOwned>(row: Value) -> NbResult<T> {
	Ok(serde_json::from_value(row)?)
}

fn optional_name(value: Option<String>) -> Option<Box<str>> {
	value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()).map(Into::into)
}

fn text(field: &str, value: &str, max_chars: usize) -> NbResult<String> {
	clean_text(field, value, max_chars).map_err(Error::ValidationError)
}

#[derive(Debug, Clone)]
pub struct ActionGateway {
	store: Arc<dyn StoreAdapter>,
	limiter: Arc<WriteLimiter>,
}

impl ActionGateway {
	pub fn new(store: Arc<dyn StoreAdapter>, limiter: Arc<WriteLimiter>) -> Self {
		Self { store, limiter }
	}

	/// Resolves the caller and charges one write to them
	fn authorize<'a>(&self, identity: &'a Identity) -> NbResult<&'a str> {
		let user_id = identity.require()?;
		self.limiter.check(user_id)?;
		Ok(user_id)
	}

	async fn load<T: DeserializeOwned>(&self, table: Table, id: &str) -> NbResult<T> {
		match self.store.get(table, id).await? {
			Some(row) => decode(row),
			None => Err(Error::NotFound),
		}
	}

	async fn find<T: DeserializeOwned>(&self, table: Table, filter: QueryFilter) -> NbResult<Vec<T>> {
		let rows = self.store.query(table, QueryOptions::new().with_filter(filter)).await?;
		rows.into_iter().map(decode).collect()
	}

	async fn insert<T: serde::Serialize + DeserializeOwned>(&self, table: Table, row: &T) -> NbResult<T> {
		decode(self.store.insert(table, serde_json::to_value(row)?).await?)
	}

	async fn patch<T: DeserializeOwned>(&self, table: Table, id: &str, patch: Value) -> NbResult<T> {
		decode(self.store.update(table, id, patch).await?)
	}

	/// The caller's own session row, or `PermissionDenied` for non-parties
	async fn party_session(&self, session_id: &str, user_id: &str) -> NbResult<ChatSession> {
		let session: ChatSession = self.load(Table::ChatSessions, session_id).await?;
		if !session.is_party(user_id) {
			return Err(Error::PermissionDenied);
		}
		Ok(session)
	}

	// Users and clusters
	//********************

	/// Creates the user row for a freshly authenticated identity. Calling it
	/// again returns the existing row.
	pub async fn register_user(&self, identity: &Identity, new_user: NewUser) -> NbResult<User> {
		let user_id = self.authorize(identity)?;
		if let Some(row) = self.store.get(Table::Users, user_id).await? {
			return decode(row);
		}

		let email = text("email", &new_user.email, 320)?;
		if !email.contains('@') {
			return Err(Error::ValidationError("email is invalid".into()));
		}
		let now = Timestamp::now();
		let user = User {
			id: user_id.into(),
			email: email.into(),
			first_name: optional_name(new_user.first_name),
			last_name: optional_name(new_user.last_name),
			cluster_id: None,
			created_at: now,
			updated_at: now,
		};
		let user = self.insert(Table::Users, &user).await?;
		info!("Registered user {}", user.id);
		Ok(user)
	}

	/// Moves the caller into the cluster of `postcode`, creating the cluster
	/// on first use
	pub async fn join_cluster(&self, identity: &Identity, postcode: &str) -> NbResult<Cluster> {
		let user_id = self.authorize(identity)?;
		let normalized = normalize_postcode(postcode);
		if !is_valid_postcode_format(&normalized) {
			return Err(Error::ValidationError(format!("invalid postcode: {}", postcode)));
		}
		let user: User = self.load(Table::Users, user_id).await?;

		let cluster_id = format!("pc_{}", normalized);
		let cluster = match self.store.get(Table::Clusters, &cluster_id).await? {
			Some(row) => decode::<Cluster>(row)?,
			None => {
				let now = Timestamp::now();
				let cluster = Cluster {
					id: cluster_id.as_str().into(),
					postcode: normalized.as_str().into(),
					area_name: None,
					city: None,
					created_at: now,
					updated_at: now,
				};
				match self.insert(Table::Clusters, &cluster).await {
					Ok(cluster) => {
						info!("Created cluster {} for {}", cluster.id, cluster.postcode);
						cluster
					}
					// Created concurrently
					Err(Error::Conflict(_)) => self.load(Table::Clusters, &cluster_id).await?,
					Err(err) => return Err(err),
				}
			}
		};

		if user.cluster_id.as_deref() != Some(cluster.id.as_ref()) {
			self.patch::<User>(
				Table::Users,
				user_id,
				json!({ "cluster_id": cluster.id, "updated_at": Timestamp::now() }),
			)
			.await?;
		}
		Ok(cluster)
	}

	// Posts
	//*******

	pub async fn create_post(&self, identity: &Identity, new_post: NewPost) -> NbResult<Post> {
		let user_id = self.authorize(identity)?;
		let title = text("title", &new_post.title, TITLE_MAX_CHARS)?;
		let description = text("description", &new_post.description, DESCRIPTION_MAX_CHARS)?;

		let user: User = match self.store.get(Table::Users, user_id).await? {
			Some(row) => decode(row)?,
			None => return Err(Error::PermissionDenied),
		};
		let Some(cluster_id) = user.cluster_id else {
			return Err(Error::ValidationError("join a cluster before posting".into()));
		};

		let now = Timestamp::now();
		let post = Post {
			id: random_id().into(),
			user_id: user_id.into(),
			cluster_id,
			title: title.into(),
			description: description.into(),
			post_type: new_post.post_type,
			is_active: true,
			created_at: now,
			updated_at: now,
		};
		let post = self.insert(Table::Posts, &post).await?;
		debug!("Created post {} in cluster {}", post.id, post.cluster_id);
		Ok(post)
	}

	pub async fn update_post(
		&self,
		identity: &Identity,
		post_id: &str,
		patch: PostPatch,
	) -> NbResult<Post> {
		let user_id = self.authorize(identity)?;
		if patch.is_empty() {
			return Err(Error::ValidationError("nothing to update".into()));
		}

		let mut changes = Map::new();
		if let Some(title) = &patch.title {
			changes.insert("title".into(), json!(text("title", title, TITLE_MAX_CHARS)?));
		}
		if let Some(description) = &patch.description {
			changes.insert(
				"description".into(),
				json!(text("description", description, DESCRIPTION_MAX_CHARS)?),
			);
		}
		if let Some(post_type) = patch.post_type {
			changes.insert("post_type".into(), serde_json::to_value(post_type)?);
		}
		if let Some(is_active) = patch.is_active {
			changes.insert("is_active".into(), json!(is_active));
		}
		changes.insert("updated_at".into(), serde_json::to_value(Timestamp::now())?);

		let post: Post = self.load(Table::Posts, post_id).await?;
		if post.user_id.as_ref() != user_id {
			return Err(Error::PermissionDenied);
		}
		self.patch(Table::Posts, post_id, Value::Object(changes)).await
	}

	/// Deletes a post together with its responses
	pub async fn delete_post(&self, identity: &Identity, post_id: &str) -> NbResult<()> {
		let user_id = self.authorize(identity)?;
		let post: Post = self.load(Table::Posts, post_id).await?;
		if post.user_id.as_ref() != user_id {
			return Err(Error::PermissionDenied);
		}

		let responses: Vec<PostResponse> =
			self.find(Table::PostResponses, QueryFilter::equals_one("post_id", json!(post_id))).await?;
		for response in &responses {
			match self.store.delete(Table::PostResponses, &response.id).await {
				Ok(()) | Err(Error::NotFound) => {}
				Err(err) => return Err(err),
			}
		}
		self.store.delete(Table::Posts, post_id).await?;
		debug!("Deleted post {} with {} responses", post_id, responses.len());
		Ok(())
	}

	// Responses
	//***********

	pub async fn create_response(
		&self,
		identity: &Identity,
		post_id: &str,
		new_response: NewResponse,
	) -> NbResult<PostResponse> {
		let user_id = self.authorize(identity)?;
		let message = match new_response.message.as_deref().map(str::trim) {
			Some(message) if !message.is_empty() => {
				Some(text("message", message, MESSAGE_MAX_CHARS)?)
			}
			_ => None,
		};
		if new_response.response_type == ResponseType::Comment && message.is_none() {
			return Err(Error::ValidationError("a comment needs a message".into()));
		}

		let post: Post = self.load(Table::Posts, post_id).await?;
		if !post.is_active {
			return Err(Error::ValidationError("post is no longer active".into()));
		}

		let existing: Vec<PostResponse> = self
			.find(
				Table::PostResponses,
				QueryFilter::equals_one("post_id", json!(post_id))
					.with_equals("user_id", json!(user_id))
					.with_equals("response_type", json!(new_response.response_type.as_str())),
			)
			.await?;
		if !existing.is_empty() {
			return Err(Error::Conflict(format!(
				"already responded with {}",
				new_response.response_type.as_str()
			)));
		}

		let now = Timestamp::now();
		let response = PostResponse {
			id: random_id().into(),
			post_id: post_id.into(),
			user_id: user_id.into(),
			response_type: new_response.response_type,
			message: message.map(Into::into),
			is_read: false,
			created_at: now,
			updated_at: now,
		};
		self.insert(Table::PostResponses, &response).await
	}

	/// Withdraws one of the caller's own responses
	pub async fn delete_response(&self, identity: &Identity, response_id: &str) -> NbResult<()> {
		let user_id = self.authorize(identity)?;
		let response: PostResponse = self.load(Table::PostResponses, response_id).await?;
		if response.user_id.as_ref() != user_id {
			return Err(Error::PermissionDenied);
		}
		self.store.delete(Table::PostResponses, response_id).await
	}

	/// Marks a response to one of the caller's posts as read
	pub async fn mark_response_read(
		&self,
		identity: &Identity,
		response_id: &str,
	) -> NbResult<PostResponse> {
		let user_id = self.authorize(identity)?;
		let response: PostResponse = self.load(Table::PostResponses, response_id).await?;
		let post: Post = self.load(Table::Posts, &response.post_id).await?;
		if post.user_id.as_ref() != user_id {
			return Err(Error::PermissionDenied);
		}
		if response.is_read {
			return Ok(response);
		}
		self.patch(
			Table::PostResponses,
			response_id,
			json!({ "is_read": true, "updated_at": Timestamp::now() }),
		)
		.await
	}

	/// Marks every response left by others on the caller's post as read.
	/// Returns the number of responses changed.
	pub async fn mark_post_responses_read(
		&self,
		identity: &Identity,
		post_id: &str,
	) -> NbResult<usize> {
		let user_id = self.authorize(identity)?;
		let post: Post = self.load(Table::Posts, post_id).await?;
		if post.user_id.as_ref() != user_id {
			return Err(Error::PermissionDenied);
		}

		let unread: Vec<PostResponse> = self
			.find(
				Table::PostResponses,
				QueryFilter::equals_one("post_id", json!(post_id))
					.with_equals("is_read", json!(false))
					.with_not_equals("user_id", json!(user_id)),
			)
			.await?;
		let now = Timestamp::now();
		for response in &unread {
			self.patch::<PostResponse>(
				Table::PostResponses,
				&response.id,
				json!({ "is_read": true, "updated_at": now }),
			)
			.await?;
		}
		Ok(unread.len())
	}

	// Chat
	//******

	/// Opens a chat between the caller (the post owner) and the author of a
	/// response. An existing session for the response is returned as is.
	pub async fn create_session(
		&self,
		identity: &Identity,
		response_id: &str,
	) -> NbResult<ChatSession> {
		let user_id = self.authorize(identity)?;
		let response: PostResponse = self.load(Table::PostResponses, response_id).await?;
		let post: Post = self.load(Table::Posts, &response.post_id).await?;
		if post.user_id.as_ref() != user_id {
			return Err(Error::PermissionDenied);
		}
		if response.user_id.as_ref() == user_id {
			return Err(Error::ValidationError("cannot open a chat with yourself".into()));
		}

		let existing: Vec<ChatSession> = self
			.find(
				Table::ChatSessions,
				QueryFilter::equals_one("post_response_id", json!(response_id)),
			)
			.await?;
		if let Some(session) = existing.into_iter().next() {
			return Ok(session);
		}

		let now = Timestamp::now();
		let session = ChatSession {
			id: random_id().into(),
			post_response_id: response_id.into(),
			post_owner_id: user_id.into(),
			helper_id: response.user_id,
			status: SessionStatus::Active,
			created_at: now,
			updated_at: now,
		};
		let session = self.insert(Table::ChatSessions, &session).await?;
		debug!("Opened chat session {} for response {}", session.id, response_id);
		Ok(session)
	}

	pub async fn send_message(
		&self,
		identity: &Identity,
		session_id: &str,
		body: &str,
	) -> NbResult<ChatMessage> {
		let user_id = self.authorize(identity)?;
		let body = text("message", body, MESSAGE_MAX_CHARS)?;
		let session = self.party_session(session_id, user_id).await?;
		if session.status != SessionStatus::Active {
			return Err(Error::ValidationError(format!(
				"chat session is {}",
				session.status.as_str()
			)));
		}

		let now = Timestamp::now();
		let message = ChatMessage {
			id: random_id().into(),
			session_id: session_id.into(),
			sender_id: user_id.into(),
			body: body.into(),
			is_read: false,
			created_at: now,
		};
		let message = self.insert(Table::ChatMessages, &message).await?;
		// Keeps the sessions list ordered by activity. The message is already
		// committed, so a failed bump does not fail the send.
		if let Err(err) = self
			.patch::<ChatSession>(Table::ChatSessions, session_id, json!({ "updated_at": now }))
			.await
		{
			warn!("Could not bump activity of chat session {}: {}", session_id, err);
		}
		Ok(message)
	}

	pub async fn update_session_status(
		&self,
		identity: &Identity,
		session_id: &str,
		status: SessionStatus,
	) -> NbResult<ChatSession> {
		let user_id = self.authorize(identity)?;
		let session = self.party_session(session_id, user_id).await?;
		if session.status == status {
			return Ok(session);
		}
		self.patch(
			Table::ChatSessions,
			session_id,
			json!({ "status": status.as_str(), "updated_at": Timestamp::now() }),
		)
		.await
	}

	/// Marks every message sent to the caller in a session as read.
	/// Returns the number of messages changed.
	pub async fn mark_messages_read(&self, identity: &Identity, session_id: &str) -> NbResult<usize> {
		let user_id = self.authorize(identity)?;
		self.party_session(session_id, user_id).await?;

		let unread: Vec<ChatMessage> = self
			.find(
				Table::ChatMessages,
				QueryFilter::equals_one("session_id", json!(session_id))
					.with_equals("is_read", json!(false))
					.with_not_equals("sender_id", json!(user_id)),
			)
			.await?;
		for message in &unread {
			self.patch::<ChatMessage>(Table::ChatMessages, &message.id, json!({ "is_read": true }))
				.await?;
		}
		Ok(unread.len())
	}

	/// Deletes a session and its messages, only the post owner may do this
	pub async fn delete_session(&self, identity: &Identity, session_id: &str) -> NbResult<()> {
		let user_id = self.authorize(identity)?;
		let session: ChatSession = self.load(Table::ChatSessions, session_id).await?;
		if session.post_owner_id.as_ref() != user_id {
			return Err(Error::PermissionDenied);
		}

		let messages: Vec<ChatMessage> = self
			.find(Table::ChatMessages, QueryFilter::equals_one("session_id", json!(session_id)))
			.await?;
		for message in &messages {
			match self.store.delete(Table::ChatMessages, &message.id).await {
				Ok(()) | Err(Error::NotFound) => {}
				Err(err) => return Err(err),
			}
		}
		self.store.delete(Table::ChatSessions, session_id).await
	}
}

// vim: ts=4
