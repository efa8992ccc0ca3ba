//! One chat session: the session row and its messages

use neighborly_types::store_adapter::{FeedFilter, SubscriptionOptions};

use super::{TeardownHandle, ViewContext, ViewCore};
use crate::derived;
use crate::prelude::*;
use crate::reconcile::{Change, Order, ReconciledCollection};

#[derive(Debug)]
pub struct ChatView {
	ctx: ViewContext,
	core: ViewCore,
	session_id: Box<str>,
	identity: Identity,
	session: Option<ChatSession>,
	messages: ReconciledCollection<ChatMessage>,
}

impl ChatView {
	pub fn new(ctx: ViewContext, session_id: &str, identity: Identity) -> Self {
		let core = ViewCore::new(
			&ctx,
			vec![
				SubscriptionOptions::filtered(
					Table::ChatMessages,
					FeedFilter::column_eq("session_id", session_id),
				),
				SubscriptionOptions::filtered(Table::ChatSessions, FeedFilter::column_eq("id", session_id)),
			],
		);
		Self {
			ctx,
			core,
			session_id: session_id.into(),
			identity,
			session: None,
			messages: ReconciledCollection::new(Order::Chronological),
		}
	}

	/// Opens the channels and loads the session with its latest messages.
	///
	/// Fails with `NotFound` for an unknown session and `PermissionDenied`
	/// when the viewing user is not a party to it. A failed mount releases
	/// the channels.
	pub async fn mount(&mut self) -> NbResult<()> {
		let user_id: Box<str> = self.identity.require()?.into();
		let res = self.load(&user_id).await;
		if let Err(err) = &res {
			debug!("Chat view of {} failed to mount: {}", self.session_id, err);
			self.teardown();
		}
		res
	}

	async fn load(&mut self, user_id: &str) -> NbResult<()> {
		if !self.core.open_channels().await {
			info!("Chat view of {} mounted without live updates", self.session_id);
		}

		let session = match self.ctx.loader.load_session(&self.session_id).await? {
			Some(session) if session.is_party(user_id) => session,
			Some(_) => return Err(Error::PermissionDenied),
			None => return Err(Error::NotFound),
		};
		let messages =
			self.ctx.loader.load_messages(&self.session_id, self.ctx.config.message_limit).await?;
		if self.core.is_torn_down() {
			return Ok(());
		}

		self.session = Some(session);
		self.messages.replace_snapshot(messages);
		self.process_pending().await;
		Ok(())
	}

	pub fn session_id(&self) -> &str {
		&self.session_id
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
			self.apply_event(&event);
			applied += 1;
		}
		applied
	}

	pub async fn next_change(&mut self) -> bool {
		match self.core.next().await {
			Some(event) => {
				self.apply_event(&event);
				true
			}
			None => false,
		}
	}

	fn apply_event(&mut self, event: &ChangeEvent) {
		if self.core.is_torn_down() {
			return;
		}
		match event.table() {
			Table::ChatMessages => match Change::<ChatMessage>::from_event(event) {
				Ok(Change::Inserted(message) | Change::Updated(message))
					if message.session_id != self.session_id =>
				{
					debug!("Message {} belongs to another session", message.id);
				}
				Ok(change) => {
					self.messages.apply(change);
				}
				Err(err) => warn!("Dropping message event {}: {}", event.id(), err),
			},
			Table::ChatSessions => match Change::<ChatSession>::from_event(event) {
				Ok(Change::Deleted(_)) => {
					info!("Chat session {} was deleted", self.session_id);
					self.session = None;
					self.messages.replace_snapshot(Vec::new());
				}
				Ok(Change::Inserted(session) | Change::Updated(session)) => {
					if session.id == self.session_id {
						self.session = Some(session);
					}
				}
				Err(err) => warn!("Dropping session event {}: {}", event.id(), err),
			},
			table => debug!("Chat view ignores {} events", table),
		}
	}

	// Read side
	//***********

	/// The session row, `None` before mounting or once it was deleted
	pub fn session(&self) -> Option<&ChatSession> {
		self.session.as_ref()
	}

	/// Loaded messages, oldest first
	pub fn messages(&self) -> &[ChatMessage] {
		self.messages.items()
	}

	pub fn latest_message(&self) -> Option<&ChatMessage> {
		derived::latest_message(self.messages.items(), &self.session_id)
	}

	/// Messages from the other party not read yet
	pub fn unread_count(&self) -> usize {
		self.identity.user_id().map_or(0, |user_id| {
			derived::session_unread_count(self.messages.items(), &self.session_id, user_id)
		})
	}
}

// vim: ts=4
