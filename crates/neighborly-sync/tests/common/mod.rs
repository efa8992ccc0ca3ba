//! Shared helpers for the sync integration tests
#![allow(dead_code, unused_macros)]

use async_trait::async_trait;
use futures::StreamExt;
use neighborly_store_adapter_redb::{AdapterConfig, StoreAdapterRedb};
use neighborly_sync::{ActionGateway, SyncConfig, TeardownHandle, ViewContext, WriteLimiter};
use neighborly_types::error::{Error, NbResult};
use neighborly_types::store_adapter::{
	ChangeFeed, ChangeStream, QueryOptions, StoreAdapter, SubscriptionOptions, Table,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio::sync::watch;

/// Applies view changes until the condition holds, failing after a timeout
macro_rules! wait_until {
	($view:ident, $cond:expr) => {
		tokio::time::timeout(std::time::Duration::from_secs(5), async {
			while !$cond {
				assert!($view.next_change().await, "view was torn down");
			}
		})
		.await
		.expect("timed out waiting for the view")
	};
}

pub fn setup_test_logging() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

pub async fn create_test_store() -> (Arc<StoreAdapterRedb>, TempDir) {
	setup_test_logging();
	let temp_dir = TempDir::new().expect("Failed to create temp dir");
	let store = StoreAdapterRedb::new(temp_dir.path().to_path_buf(), AdapterConfig::default())
		.await
		.expect("Failed to create store");
	(Arc::new(store), temp_dir)
}

pub fn view_context(store: &Arc<StoreAdapterRedb>) -> ViewContext {
	ViewContext::new(store.clone(), store.clone(), SyncConfig::default())
}

pub fn gateway(store: &Arc<StoreAdapterRedb>) -> ActionGateway {
	ActionGateway::new(store.clone(), Arc::new(WriteLimiter::unlimited()))
}

/// Change feed that can be switched offline, or cut so that every stream it
/// handed out ends
#[derive(Debug)]
pub struct FlakyFeed {
	inner: Arc<StoreAdapterRedb>,
	pub offline: AtomicBool,
	pub subscribes: AtomicUsize,
	cut: watch::Sender<u64>,
}

impl FlakyFeed {
	pub fn new(inner: Arc<StoreAdapterRedb>) -> Self {
		let (cut, _) = watch::channel(0);
		Self { inner, offline: AtomicBool::new(false), subscribes: AtomicUsize::new(0), cut }
	}

	pub fn set_offline(&self, offline: bool) {
		self.offline.store(offline, Ordering::SeqCst);
	}

	pub fn subscribe_count(&self) -> usize {
		self.subscribes.load(Ordering::SeqCst)
	}

	/// Ends the streams handed out so far. Later subscriptions are not affected.
	pub fn cut_streams(&self) {
		self.cut.send_modify(|generation| *generation += 1);
	}
}

#[async_trait]
impl ChangeFeed for FlakyFeed {
	async fn subscribe(&self, opts: SubscriptionOptions) -> NbResult<ChangeStream> {
		if self.offline.load(Ordering::SeqCst) {
			return Err(Error::FeedUnavailable("feed offline".into()));
		}
		self.subscribes.fetch_add(1, Ordering::SeqCst);
		let mut cut = self.cut.subscribe();
		let generation = *cut.borrow_and_update();
		let stream = self.inner.subscribe(opts).await?;
		Ok(Box::pin(stream.take_until(async move {
			loop {
				let current = *cut.borrow_and_update();
				if current != generation || cut.changed().await.is_err() {
					break;
				}
			}
		})))
	}
}

/// Write committed by `HookedStore` around a snapshot read
#[derive(Debug, Clone)]
pub enum Write {
	Insert(Table, Value),
	Update(Table, &'static str, Value),
}

#[derive(Debug, Default)]
struct Hooks {
	before_read: Vec<Write>,
	after_read: Vec<Write>,
	teardown: Option<TeardownHandle>,
}

/// Store that runs scripted writes, or a view teardown, around the first
/// query of one table. It can also fail reads of single rows or updates of
/// one table.
#[derive(Debug)]
pub struct HookedStore {
	inner: Arc<StoreAdapterRedb>,
	table: Table,
	hooks: Mutex<Hooks>,
	fail_get: AtomicBool,
	fail_update: Mutex<Option<Table>>,
}

impl HookedStore {
	pub fn new(inner: Arc<StoreAdapterRedb>, table: Table) -> Self {
		Self {
			inner,
			table,
			hooks: Mutex::new(Hooks::default()),
			fail_get: AtomicBool::new(false),
			fail_update: Mutex::new(None),
		}
	}

	pub fn before_read(&self, write: Write) {
		self.hooks.lock().before_read.push(write);
	}

	pub fn after_read(&self, write: Write) {
		self.hooks.lock().after_read.push(write);
	}

	pub fn teardown_on_read(&self, handle: TeardownHandle) {
		self.hooks.lock().teardown = Some(handle);
	}

	pub fn fail_get(&self) {
		self.fail_get.store(true, Ordering::SeqCst);
	}

	pub fn fail_updates_of(&self, table: Table) {
		*self.fail_update.lock() = Some(table);
	}

	async fn run(&self, writes: Vec<Write>) -> NbResult<()> {
		for write in writes {
			match write {
				Write::Insert(table, row) => {
					self.inner.insert(table, row).await?;
				}
				Write::Update(table, id, patch) => {
					self.inner.update(table, id, patch).await?;
				}
			}
		}
		Ok(())
	}
}

#[async_trait]
impl StoreAdapter for HookedStore {
	async fn query(&self, table: Table, opts: QueryOptions) -> NbResult<Vec<Value>> {
		if table != self.table {
			return self.inner.query(table, opts).await;
		}
		let hooks = std::mem::take(&mut *self.hooks.lock());
		self.run(hooks.before_read).await?;
		let rows = self.inner.query(table, opts).await?;
		self.run(hooks.after_read).await?;
		if let Some(handle) = hooks.teardown {
			handle.teardown();
		}
		Ok(rows)
	}

	async fn get(&self, table: Table, id: &str) -> NbResult<Option<Value>> {
		if self.fail_get.load(Ordering::SeqCst) {
			return Err(Error::Internal("store offline".into()));
		}
		self.inner.get(table, id).await
	}

	async fn insert(&self, table: Table, data: Value) -> NbResult<Value> {
		self.inner.insert(table, data).await
	}

	async fn update(&self, table: Table, id: &str, patch: Value) -> NbResult<Value> {
		let refused = *self.fail_update.lock() == Some(table);
		if refused {
			return Err(Error::Internal("update refused".into()));
		}
		self.inner.update(table, id, patch).await
	}

	async fn delete(&self, table: Table, id: &str) -> NbResult<()> {
		self.inner.delete(table, id).await
	}
}

// Seed rows
//***********

pub async fn seed_user(store: &StoreAdapterRedb, id: &str, cluster_id: Option<&str>) {
	store
		.insert(
			Table::Users,
			json!({
				"id": id,
				"email": format!("{}@example.com", id),
				"cluster_id": cluster_id,
				"created_at": 1,
				"updated_at": 1
			}),
		)
		.await
		.expect("seed user");
}

pub fn post_row(id: &str, user_id: &str, cluster_id: &str, at: i64) -> Value {
	json!({
		"id": id,
		"user_id": user_id,
		"cluster_id": cluster_id,
		"title": format!("post {}", id),
		"description": "Could someone help?",
		"post_type": "help_needed",
		"is_active": true,
		"created_at": at,
		"updated_at": at
	})
}

pub async fn seed_post(store: &StoreAdapterRedb, id: &str, user_id: &str, cluster_id: &str, at: i64) {
	store.insert(Table::Posts, post_row(id, user_id, cluster_id, at)).await.expect("seed post");
}

pub async fn seed_response(
	store: &StoreAdapterRedb,
	id: &str,
	post_id: &str,
	user_id: &str,
	response_type: &str,
	at: i64,
) {
	store
		.insert(
			Table::PostResponses,
			json!({
				"id": id,
				"post_id": post_id,
				"user_id": user_id,
				"response_type": response_type,
				"message": "I can help",
				"is_read": false,
				"created_at": at,
				"updated_at": at
			}),
		)
		.await
		.expect("seed response");
}

pub async fn seed_session(
	store: &StoreAdapterRedb,
	id: &str,
	response_id: &str,
	owner: &str,
	helper: &str,
	at: i64,
) {
	store
		.insert(
			Table::ChatSessions,
			json!({
				"id": id,
				"post_response_id": response_id,
				"post_owner_id": owner,
				"helper_id": helper,
				"status": "active",
				"created_at": at,
				"updated_at": at
			}),
		)
		.await
		.expect("seed session");
}

pub async fn seed_message(
	store: &StoreAdapterRedb,
	id: &str,
	session_id: &str,
	sender: &str,
	at: i64,
	is_read: bool,
) {
	store
		.insert(
			Table::ChatMessages,
			json!({
				"id": id,
				"session_id": session_id,
				"sender_id": sender,
				"body": format!("message {}", id),
				"is_read": is_read,
				"created_at": at
			}),
		)
		.await
		.expect("seed message");
}
