//! Derived-State Engine
//!
//! Pure aggregates over reconciled collections. Nothing here is cached: the
//! views call these after every applied change, so a removed row can never
//! leave a stale count behind. Rows authored by the user asking are never
//! counted as unread.

use std::collections::HashSet;

use crate::prelude::*;

/// Number of `offer_help` responses on a post
pub fn help_offers_count<'a>(
	responses: impl IntoIterator<Item = &'a PostResponse>,
	post_id: &str,
) -> usize {
	responses
		.into_iter()
		.filter(|r| r.post_id.as_ref() == post_id && r.is_offer())
		.count()
}

/// Whether `user_id` currently has an `offer_help` response on the post
pub fn has_user_offered<'a>(
	responses: impl IntoIterator<Item = &'a PostResponse>,
	post_id: &str,
	user_id: &str,
) -> bool {
	responses
		.into_iter()
		.any(|r| r.post_id.as_ref() == post_id && r.user_id.as_ref() == user_id && r.is_offer())
}

/// Most recent message of a session, later rows win ties
pub fn latest_message<'a>(
	messages: impl IntoIterator<Item = &'a ChatMessage>,
	session_id: &str,
) -> Option<&'a ChatMessage> {
	messages
		.into_iter()
		.filter(|m| m.session_id.as_ref() == session_id)
		.fold(None, |latest: Option<&ChatMessage>, m| match latest {
			Some(l) if l.created_at > m.created_at => Some(l),
			_ => Some(m),
		})
}

/// Unread messages addressed to `user_id` in one session
pub fn session_unread_count<'a>(
	messages: impl IntoIterator<Item = &'a ChatMessage>,
	session_id: &str,
	user_id: &str,
) -> usize {
	messages
		.into_iter()
		.filter(|m| {
			m.session_id.as_ref() == session_id && m.sender_id.as_ref() != user_id && !m.is_read
		})
		.count()
}

/// Unread messages addressed to `user_id` across every session they are a
/// party to, whatever the session status
pub fn unread_count<'a>(
	sessions: impl IntoIterator<Item = &'a ChatSession>,
	messages: impl IntoIterator<Item = &'a ChatMessage>,
	user_id: &str,
) -> usize {
	let session_ids: HashSet<&str> =
		sessions.into_iter().filter(|s| s.is_party(user_id)).map(|s| s.id.as_ref()).collect();
	messages
		.into_iter()
		.filter(|m| {
			session_ids.contains(m.session_id.as_ref())
				&& m.sender_id.as_ref() != user_id
				&& !m.is_read
		})
		.count()
}

/// Unread responses left by others on posts owned by `user_id`
pub fn unread_response_count<'a>(
	posts: impl IntoIterator<Item = &'a Post>,
	responses: impl IntoIterator<Item = &'a PostResponse>,
	user_id: &str,
) -> usize {
	let own_posts: HashSet<&str> =
		posts.into_iter().filter(|p| p.user_id.as_ref() == user_id).map(|p| p.id.as_ref()).collect();
	responses
		.into_iter()
		.filter(|r| {
			own_posts.contains(r.post_id.as_ref()) && r.user_id.as_ref() != user_id && !r.is_read
		})
		.count()
}

/// One row of the chat sessions list
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPreview<'a> {
	pub session: &'a ChatSession,
	pub counterpart: &'a str,
	pub latest: Option<&'a ChatMessage>,
	pub unread: usize,
}

impl SessionPreview<'_> {
	/// Time of the last activity, used to order the list
	pub fn last_activity(&self) -> Timestamp {
		self.latest.map_or(self.session.updated_at, |m| m.created_at.max(self.session.updated_at))
	}
}

/// Previews for the sessions `user_id` is a party to, most recent activity
/// first. `messages_of` returns the known messages of one session.
pub fn session_previews<'a, F>(
	sessions: &'a [ChatSession],
	messages_of: F,
	user_id: &str,
) -> Vec<SessionPreview<'a>>
where
	F: Fn(&str) -> &'a [ChatMessage],
{
	let mut previews: Vec<SessionPreview<'a>> = sessions
		.iter()
		.filter_map(|session| {
			let counterpart = session.counterpart(user_id)?;
			let messages = messages_of(session.id.as_ref());
			Some(SessionPreview {
				session,
				counterpart,
				latest: latest_message(messages, &session.id),
				unread: session_unread_count(messages, &session.id, user_id),
			})
		})
		.collect();
	previews.sort_by_key(|p| std::cmp::Reverse(p.last_activity()));
	previews
}


// vim: ts=4
