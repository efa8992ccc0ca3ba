//! App builder - wires the adapters into the gateway and the views

use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::postcode::{AddressCandidate, AddressLookup, lookup_addresses};
use crate::prelude::*;
use crate::store_adapter::{ChangeFeed, StoreAdapter};
use neighborly_sync::{
	ActionGateway, ActivityView, ChatView, SessionsView, SyncConfig, ViewContext, WriteLimiter,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

pub struct Adapters {
	pub store_adapter: Option<Arc<dyn StoreAdapter>>,
	pub change_feed: Option<Arc<dyn ChangeFeed>>,
	pub address_lookup: Option<Arc<dyn AddressLookup>>,
}

#[derive(Debug)]
pub struct AppState {
	pub config: SyncConfig,
	pub store_adapter: Arc<dyn StoreAdapter>,
	pub change_feed: Arc<dyn ChangeFeed>,
	pub address_lookup: Option<Arc<dyn AddressLookup>>,
	limiter: Arc<WriteLimiter>,
	view_ctx: ViewContext,
}

pub type App = Arc<AppState>;

pub struct AppBuilder {
	config: SyncConfig,
	adapters: Adapters,
}

impl Default for AppBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl AppBuilder {
	pub fn new() -> Self {
		// A subscriber may already be installed by the embedding app or a test
		let _ = tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.with_target(false)
			.try_init();
		AppBuilder {
			config: SyncConfig::from_env(),
			adapters: Adapters { store_adapter: None, change_feed: None, address_lookup: None },
		}
	}

	// Opts
	pub fn config(&mut self, config: SyncConfig) -> &mut Self {
		self.config = config;
		self
	}
	pub fn post_limit(&mut self, post_limit: u32) -> &mut Self {
		self.config.post_limit = post_limit;
		self
	}
	pub fn message_limit(&mut self, message_limit: u32) -> &mut Self {
		self.config.message_limit = message_limit;
		self
	}

	// Adapters
	pub fn store_adapter(&mut self, store_adapter: Arc<dyn StoreAdapter>) -> &mut Self {
		self.adapters.store_adapter = Some(store_adapter);
		self
	}
	pub fn change_feed(&mut self, change_feed: Arc<dyn ChangeFeed>) -> &mut Self {
		self.adapters.change_feed = Some(change_feed);
		self
	}
	pub fn address_lookup(&mut self, address_lookup: Arc<dyn AddressLookup>) -> &mut Self {
		self.adapters.address_lookup = Some(address_lookup);
		self
	}

	pub async fn build(self) -> NbResult<App> {
		info!("Neighborly sync V{}", VERSION);

		let Some(store_adapter) = self.adapters.store_adapter else {
			error!("FATAL: No store adapter configured");
			return Err(Error::Internal("No store adapter configured".to_string()));
		};
		let Some(change_feed) = self.adapters.change_feed else {
			error!("FATAL: No change feed configured");
			return Err(Error::Internal("No change feed configured".to_string()));
		};
		if self.adapters.address_lookup.is_none() {
			info!("No address lookup configured, postcode lookups are disabled");
		}

		let limiter = Arc::new(WriteLimiter::new(&self.config.rate_limit));
		if self.config.rate_limit.enabled {
			spawn_limiter_pruning(Arc::downgrade(&limiter));
		}
		let view_ctx = ViewContext::new(store_adapter.clone(), change_feed.clone(), self.config.clone());

		Ok(Arc::new(AppState {
			config: self.config,
			store_adapter,
			change_feed,
			address_lookup: self.adapters.address_lookup,
			limiter,
			view_ctx,
		}))
	}
}

/// Forgets idle users of the write limiter until the app is dropped
fn spawn_limiter_pruning(limiter: Weak<WriteLimiter>) {
	tokio::spawn(async move {
		let mut interval = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
		interval.tick().await;
		loop {
			interval.tick().await;
			let Some(limiter) = limiter.upgrade() else {
				break;
			};
			limiter.prune();
			debug!("Write limiter tracks {} users", limiter.tracked_users());
		}
	});
}

impl AppState {
	/// Gateway sharing the app-wide write limiter
	pub fn gateway(&self) -> ActionGateway {
		ActionGateway::new(self.store_adapter.clone(), self.limiter.clone())
	}

	pub fn view_context(&self) -> ViewContext {
		self.view_ctx.clone()
	}

	/// Mounted activity view of a cluster
	pub async fn activity_view(&self, cluster_id: &str, identity: Identity) -> NbResult<ActivityView> {
		let mut view = ActivityView::new(self.view_context(), cluster_id, identity);
		view.mount().await?;
		Ok(view)
	}

	/// Mounted view of one chat session
	pub async fn chat_view(&self, session_id: &str, identity: Identity) -> NbResult<ChatView> {
		let mut view = ChatView::new(self.view_context(), session_id, identity);
		view.mount().await?;
		Ok(view)
	}

	/// Mounted chat sessions list of the identity
	pub async fn sessions_view(&self, identity: &Identity) -> NbResult<SessionsView> {
		let mut view = SessionsView::new(self.view_context(), identity)?;
		view.mount().await?;
		Ok(view)
	}

	pub async fn lookup_addresses(&self, postcode: &str) -> NbResult<Vec<AddressCandidate>> {
		let Some(lookup) = &self.address_lookup else {
			return Err(Error::Internal("No address lookup configured".to_string()));
		};
		lookup_addresses(lookup.as_ref(), postcode).await
	}
}

// vim: ts=4
