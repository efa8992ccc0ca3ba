//! Subscription Manager
//!
//! Owns the live channels of one client session. A channel is identified by
//! its (table, filter) pair; opening a pair that is already open hands out
//! another handle to the same channel, so one logical change is delivered
//! once no matter how many parts of the view asked for it.
//!
//! Every channel is drained by a forwarding task into the session's single
//! aggregated queue. The view is the only consumer of that queue.

use futures::StreamExt;
use neighborly_types::store_adapter::{ChangeFeed, ChangeStream, SubscriptionOptions};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::prelude::*;

pub type ChannelId = u64;

/// Proof of one `open` call, to be given back to `close` exactly once
#[derive(Debug)]
pub struct ChannelHandle {
	id: ChannelId,
	key: SubscriptionOptions,
}

impl ChannelHandle {
	pub fn id(&self) -> ChannelId {
		self.id
	}

	pub fn key(&self) -> &SubscriptionOptions {
		&self.key
	}
}

#[derive(Debug)]
pub enum ChannelMessage {
	Event { channel: ChannelId, event: ChangeEvent },
	/// The upstream stream ended, the channel delivers nothing more
	Closed { channel: ChannelId },
}

#[derive(Debug)]
struct ChannelEntry {
	id: ChannelId,
	refs: usize,
	task: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct Registry {
	channels: HashMap<SubscriptionOptions, ChannelEntry>,
	next_id: ChannelId,
	closed: bool,
}

impl Drop for Registry {
	fn drop(&mut self) {
		for (_, entry) in self.channels.drain() {
			entry.task.abort();
		}
	}
}

#[derive(Debug, Clone)]
pub struct SubscriptionManager {
	feed: Arc<dyn ChangeFeed>,
	registry: Arc<Mutex<Registry>>,
	tx: mpsc::UnboundedSender<ChannelMessage>,
}

pub(crate) fn describe(key: &SubscriptionOptions) -> String {
	match &key.filter {
		Some(filter) => format!("{}[{}]", key.table, filter),
		None => key.table.to_string(),
	}
}

fn closed_error() -> Error {
	Error::FeedUnavailable("session is closed".into())
}

impl SubscriptionManager {
	/// Creates the manager together with the receiving end of its queue
	pub fn new(feed: Arc<dyn ChangeFeed>) -> (Self, mpsc::UnboundedReceiver<ChannelMessage>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self { feed, registry: Arc::new(Mutex::new(Registry::default())), tx }, rx)
	}

	/// Opens (or reuses) the channel for `key`.
	///
	/// Once this returns, every change committed afterwards that matches the
	/// key reaches the session queue. A feed failure is reported as
	/// `Error::FeedUnavailable` and leaves nothing registered.
	pub async fn open(&self, key: SubscriptionOptions) -> NbResult<ChannelHandle> {
		if let Some(handle) = self.try_reuse(&key)? {
			return Ok(handle);
		}

		let stream = self.feed.subscribe(key.clone()).await.map_err(|err| match err {
			Error::FeedUnavailable(msg) => Error::FeedUnavailable(msg),
			other => Error::FeedUnavailable(other.to_string()),
		})?;

		let mut registry = self.registry.lock();
		if registry.closed {
			// Torn down while we were waiting, the stream is dropped here
			return Err(closed_error());
		}
		// Someone else opened the same key meanwhile
		if let Some(entry) = registry.channels.get_mut(&key) {
			entry.refs += 1;
			return Ok(ChannelHandle { id: entry.id, key });
		}

		registry.next_id += 1;
		let id = registry.next_id;
		let task = spawn_forwarder(id, stream, self.tx.clone());
		registry.channels.insert(key.clone(), ChannelEntry { id, refs: 1, task });
		debug!("Opened channel {} on {}", id, describe(&key));

		Ok(ChannelHandle { id, key })
	}

	fn try_reuse(&self, key: &SubscriptionOptions) -> NbResult<Option<ChannelHandle>> {
		let mut registry = self.registry.lock();
		if registry.closed {
			return Err(closed_error());
		}
		Ok(registry.channels.get_mut(key).map(|entry| {
			entry.refs += 1;
			ChannelHandle { id: entry.id, key: key.clone() }
		}))
	}

	/// Releases one handle. The channel is torn down with its last handle.
	/// Returns false if the channel was already gone.
	pub fn close(&self, handle: ChannelHandle) -> bool {
		let mut registry = self.registry.lock();
		let Some(entry) = registry.channels.get_mut(&handle.key) else {
			return false;
		};
		if entry.id != handle.id {
			return false;
		}

		entry.refs = entry.refs.saturating_sub(1);
		if entry.refs == 0 {
			if let Some(entry) = registry.channels.remove(&handle.key) {
				entry.task.abort();
				debug!("Closed channel {} on {}", entry.id, describe(&handle.key));
			}
		}
		true
	}

	/// Releases every registered channel exactly once and refuses further
	/// opens. Returns the number of channels released.
	pub fn close_all(&self) -> usize {
		let mut registry = self.registry.lock();
		registry.closed = true;
		let count = registry.channels.len();
		for (_, entry) in registry.channels.drain() {
			entry.task.abort();
		}
		if count > 0 {
			debug!("Closed all {} channels", count);
		}
		count
	}

	pub fn is_closed(&self) -> bool {
		self.registry.lock().closed
	}

	pub fn is_open(&self, key: &SubscriptionOptions) -> bool {
		self.registry.lock().channels.contains_key(key)
	}

	/// Number of distinct open channels
	pub fn channel_count(&self) -> usize {
		self.registry.lock().channels.len()
	}
}

fn spawn_forwarder(
	id: ChannelId,
	mut stream: ChangeStream,
	tx: mpsc::UnboundedSender<ChannelMessage>,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		while let Some(event) = stream.next().await {
			if tx.send(ChannelMessage::Event { channel: id, event }).is_err() {
				// Session queue is gone
				return;
			}
		}
		let _ = tx.send(ChannelMessage::Closed { channel: id });
	})
}

// vim: ts=4
