//! Views
//!
//! A view is one mounted screen: it owns its channels, its reconciled
//! collections and its teardown state. Mounting opens the channels first, so
//! events committed while the snapshot loads wait in the session queue, then
//! loads the snapshot and finally replays whatever was queued. Events are
//! applied one at a time by the view's single consumer.
//!
//! A failed channel open leaves the view showing its snapshot without being
//! live. `retry_live` opens the missing channels only and never re-fetches.

mod activity;
mod chat;
mod sessions;

pub use activity::ActivityView;
pub use chat::ChatView;
pub use sessions::SessionsView;

use neighborly_types::store_adapter::{ChangeFeed, StoreAdapter, SubscriptionOptions};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::config::SyncConfig;
use crate::prelude::*;
use crate::snapshot::SnapshotLoader;
use crate::subscription::{
	ChannelHandle, ChannelId, ChannelMessage, SubscriptionManager, describe,
};

/// Collaborators shared by every view of a client
#[derive(Debug, Clone)]
pub struct ViewContext {
	pub feed: Arc<dyn ChangeFeed>,
	pub loader: SnapshotLoader,
	pub config: SyncConfig,
}

impl ViewContext {
	pub fn new(store: Arc<dyn StoreAdapter>, feed: Arc<dyn ChangeFeed>, config: SyncConfig) -> Self {
		Self { feed, loader: SnapshotLoader::new(store), config }
	}
}

/// Cancels a view from outside its consumer.
///
/// Once torn down, every channel is released, nothing more is applied and
/// snapshot results still in flight are thrown away.
#[derive(Debug, Clone)]
pub struct TeardownHandle {
	state: Arc<watch::Sender<bool>>,
	subs: SubscriptionManager,
}

impl TeardownHandle {
	pub fn teardown(&self) {
		if !self.state.send_replace(true) {
			let released = self.subs.close_all();
			debug!("View torn down, released {} channels", released);
		}
	}

	pub fn is_torn_down(&self) -> bool {
		*self.state.borrow()
	}

	fn watch(&self) -> watch::Receiver<bool> {
		self.state.subscribe()
	}
}

#[derive(Debug)]
struct Slot {
	key: SubscriptionOptions,
	handle: Option<ChannelHandle>,
}

/// Channel bookkeeping and the event queue behind a view
#[derive(Debug)]
pub(crate) struct ViewCore {
	subs: SubscriptionManager,
	rx: mpsc::UnboundedReceiver<ChannelMessage>,
	teardown: TeardownHandle,
	slots: Vec<Slot>,
}

impl ViewCore {
	pub(crate) fn new(ctx: &ViewContext, keys: Vec<SubscriptionOptions>) -> Self {
		let (subs, rx) = SubscriptionManager::new(ctx.feed.clone());
		let (state, _) = watch::channel(false);
		let teardown = TeardownHandle { state: Arc::new(state), subs: subs.clone() };
		let slots = keys.into_iter().map(|key| Slot { key, handle: None }).collect();
		Self { subs, rx, teardown, slots }
	}

	pub(crate) fn teardown_handle(&self) -> TeardownHandle {
		self.teardown.clone()
	}

	pub(crate) fn is_torn_down(&self) -> bool {
		self.teardown.is_torn_down()
	}

	/// Live means every channel of the view is open
	pub(crate) fn is_live(&self) -> bool {
		!self.is_torn_down() && self.slots.iter().all(|slot| slot.handle.is_some())
	}

	/// Opens the channels that are not open yet. Failures are logged and
	/// leave the view not live.
	pub(crate) async fn open_channels(&mut self) -> bool {
		for slot in &mut self.slots {
			if slot.handle.is_some() {
				continue;
			}
			if self.teardown.is_torn_down() {
				return false;
			}
			match self.subs.open(slot.key.clone()).await {
				Ok(handle) => slot.handle = Some(handle),
				Err(err) => warn!("Channel on {} unavailable: {}", describe(&slot.key), err),
			}
		}
		self.is_live()
	}

	fn on_closed(&mut self, channel: ChannelId) {
		for slot in &mut self.slots {
			if slot.handle.as_ref().is_some_and(|h| h.id() == channel) {
				if let Some(handle) = slot.handle.take() {
					warn!("Channel on {} ended, view is no longer live", describe(&slot.key));
					self.subs.close(handle);
				}
			}
		}
	}

	/// Next queued event without waiting
	pub(crate) fn try_next(&mut self) -> Option<ChangeEvent> {
		loop {
			if self.is_torn_down() {
				return None;
			}
			match self.rx.try_recv() {
				Ok(ChannelMessage::Event { event, .. }) => return Some(event),
				Ok(ChannelMessage::Closed { channel }) => self.on_closed(channel),
				Err(_) => return None,
			}
		}
	}

	/// Waits for the next event. Returns `None` once the view is torn down.
	pub(crate) async fn next(&mut self) -> Option<ChangeEvent> {
		let mut torn_down = self.teardown.watch();
		loop {
			if self.is_torn_down() {
				return None;
			}
			let message = tokio::select! {
				message = self.rx.recv() => message,
				_ = torn_down.changed() => return None,
			};
			match message {
				Some(ChannelMessage::Event { event, .. }) => return Some(event),
				Some(ChannelMessage::Closed { channel }) => self.on_closed(channel),
				None => return None,
			}
		}
	}
}

// vim: ts=4
