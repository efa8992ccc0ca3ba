//! The chat sessions list of one user

use neighborly_types::store_adapter::{FeedFilter, SubscriptionOptions};
use std::collections::HashMap;

use super::{TeardownHandle, ViewContext, ViewCore};
use crate::derived::{self, SessionPreview};
use crate::prelude::*;
use crate::reconcile::{Change, Order, Orphans, ReconciledCollection};

#[derive(Debug)]
pub struct SessionsView {
	ctx: ViewContext,
	core: ViewCore,
	user_id: Box<str>,
	sessions: ReconciledCollection<ChatSession>,
	messages: HashMap<Box<str>, ReconciledCollection<ChatMessage>>,
	orphans: Orphans<ChatMessage>,
}

impl SessionsView {
	/// Fails with `Unauthenticated` for an anonymous identity
	pub fn new(ctx: ViewContext, identity: &Identity) -> NbResult<Self> {
		let user_id = identity.require()?;
		let core = ViewCore::new(
			&ctx,
			vec![
				SubscriptionOptions::filtered(
					Table::ChatSessions,
					FeedFilter::column_eq("post_owner_id", user_id),
				),
				SubscriptionOptions::filtered(
					Table::ChatSessions,
					FeedFilter::column_eq("helper_id", user_id),
				),
				SubscriptionOptions::all(Table::ChatMessages),
			],
		);
		let orphans = Orphans::new(ctx.config.max_parked);
		Ok(Self {
			ctx,
			core,
			user_id: user_id.into(),
			sessions: ReconciledCollection::new(Order::NewestFirst),
			messages: HashMap::new(),
			orphans,
		})
	}

	/// Opens the channels and loads the sessions. A failed snapshot tears the
	/// view down.
	pub async fn mount(&mut self) -> NbResult<()> {
		let res = self.load().await;
		if let Err(err) = &res {
			warn!("Sessions view of {} failed to mount: {}", self.user_id, err);
			self.teardown();
		}
		res
	}

	async fn load(&mut self) -> NbResult<()> {
		if !self.core.open_channels().await {
			info!("Sessions view of {} mounted without live updates", self.user_id);
		}

		let sessions = self.ctx.loader.load_sessions(&self.user_id).await?;
		if self.core.is_torn_down() {
			return Ok(());
		}
		let messages = self
			.ctx
			.loader
			.load_messages_for_sessions(sessions.iter().map(|s| s.id.as_ref()))
			.await?;
		if self.core.is_torn_down() {
			return Ok(());
		}

		self.sessions.replace_snapshot(sessions);
		self.messages = self
			.sessions
			.ids()
			.map(|id| (Box::from(id), ReconciledCollection::new(Order::Chronological)))
			.collect();
		for message in messages {
			if let Some(collection) = self.messages.get_mut(message.session_id.as_ref()) {
				collection.apply(Change::Inserted(message));
			}
		}
		debug!("Sessions view of {} loaded {} sessions", self.user_id, self.sessions.len());

		self.process_pending().await;
		Ok(())
	}

	pub fn is_live(&self) -> bool {
		self.core.is_live()
	}

	pub async fn retry_live(&mut self) -> bool {
		self.core.open_channels().await
	}

	pub fn teardown_handle(&self) -> TeardownHandle {
		self.core.teardown_handle()
	}

	pub fn teardown(&self) {
		self.core.teardown_handle().teardown();
	}

	pub async fn process_pending(&mut self) -> usize {
		let mut applied = 0;
		while let Some(event) = self.core.try_next() {
			self.apply_event(event).await;
			applied += 1;
		}
		applied
	}

	pub async fn next_change(&mut self) -> bool {
		match self.core.next().await {
			Some(event) => {
				self.apply_event(event).await;
				true
			}
			None => false,
		}
	}

	async fn apply_event(&mut self, event: ChangeEvent) {
		if self.core.is_torn_down() {
			return;
		}
		match event.table() {
			Table::ChatSessions => match Change::<ChatSession>::from_event(&event) {
				Ok(change) => self.apply_session(change).await,
				Err(err) => warn!("Dropping session event {}: {}", event.id(), err),
			},
			Table::ChatMessages => match Change::<ChatMessage>::from_event(&event) {
				Ok(change) => self.apply_message(change),
				Err(err) => warn!("Dropping message event {}: {}", event.id(), err),
			},
			table => debug!("Sessions view ignores {} events", table),
		}
	}

	async fn apply_session(&mut self, change: Change<ChatSession>) {
		let session = match change {
			Change::Deleted(id) => {
				self.drop_session(&id);
				return;
			}
			Change::Inserted(session) | Change::Updated(session) => session,
		};

		if !session.is_party(&self.user_id) {
			self.drop_session(&session.id);
			return;
		}
		if self.sessions.contains(&session.id) {
			self.sessions.apply(Change::Updated(session));
			return;
		}

		let messages = match self.ctx.loader.load_messages_for_sessions([session.id.as_ref()]).await
		{
			Ok(messages) => messages,
			Err(err) => {
				warn!("Could not load messages of session {}: {}", session.id, err);
				Vec::new()
			}
		};
		if self.core.is_torn_down() {
			return;
		}

		let mut collection = ReconciledCollection::from_snapshot(Order::Chronological, messages);
		for parked in self.orphans.take(&session.id) {
			collection.apply(parked);
		}
		self.messages.insert(session.id.clone(), collection);
		self.sessions.apply(Change::Inserted(session));
	}

	fn drop_session(&mut self, session_id: &str) {
		self.sessions.remove(session_id);
		self.messages.remove(session_id);
		self.orphans.discard_parent(session_id);
	}

	fn apply_message(&mut self, change: Change<ChatMessage>) {
		match change {
			Change::Deleted(id) => {
				for collection in self.messages.values_mut() {
					collection.remove(&id);
				}
				self.orphans.discard(&id);
			}
			Change::Inserted(message) | Change::Updated(message) => {
				match self.messages.get_mut(message.session_id.as_ref()) {
					Some(collection) => {
						collection.apply(Change::Updated(message));
					}
					None => {
						let session_id = message.session_id.clone();
						self.orphans.park(&session_id, Change::Updated(message));
					}
				}
			}
		}
	}

	// Read side
	//***********

	pub fn sessions(&self) -> &[ChatSession] {
		self.sessions.items()
	}

	pub fn messages(&self, session_id: &str) -> &[ChatMessage] {
		self.messages.get(session_id).map(ReconciledCollection::items).unwrap_or_default()
	}

	/// One entry per session, most recent activity first
	pub fn previews(&self) -> Vec<SessionPreview<'_>> {
		derived::session_previews(self.sessions.items(), |id| self.messages(id), &self.user_id)
	}

	/// Unread messages across every session of the user
	pub fn unread_count(&self) -> usize {
		derived::unread_count(
			self.sessions.items(),
			self.messages.values().flat_map(ReconciledCollection::items),
			&self.user_id,
		)
	}

	pub fn session_unread_count(&self, session_id: &str) -> usize {
		derived::session_unread_count(self.messages(session_id), session_id, &self.user_id)
	}
}

// vim: ts=4
