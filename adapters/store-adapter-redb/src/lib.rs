//! redb-backed implementation of the Neighborly row store and change feed.
//!
//! All rows live in a single redb table keyed by `<table>/<id>`. Every
//! committed write is broadcast to the live subscriptions of the process.
//! Writes are serialized by a mutex spanning commit and broadcast, so the
//! feed emits events in commit order.

#![forbid(unsafe_code)]

mod error;
mod merge;
mod query;
pub mod storage;

use async_trait::async_trait;
use parking_lot::Mutex;
use redb::ReadableTable;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

pub use error::Error;

use error::from_redb_error;
use neighborly_types::error::Error as NbError;
use neighborly_types::prelude::*;
use neighborly_types::store_adapter::*;
use neighborly_types::utils::random_id;

/// Adapter configuration options
#[derive(Debug, Clone)]
pub struct AdapterConfig {
	/// File name of the database inside the storage directory
	pub file_name: Box<str>,

	/// Broadcast channel capacity for real-time events
	pub broadcast_capacity: usize,
}

impl Default for AdapterConfig {
	fn default() -> Self {
		Self { file_name: "neighborly.redb".into(), broadcast_capacity: 1000 }
	}
}

#[derive(Debug)]
pub struct StoreAdapterRedb {
	db: Arc<redb::Database>,
	change_tx: broadcast::Sender<ChangeEvent>,
	/// Held across commit and broadcast
	write_lock: Arc<Mutex<()>>,
}

impl StoreAdapterRedb {
	/// Create a new redb-based store adapter.
	///
	/// # Arguments
	///
	/// * `storage_dir` - Directory where the database file is stored
	/// * `config` - Adapter configuration
	pub async fn new(storage_dir: PathBuf, config: AdapterConfig) -> NbResult<Self> {
		tokio::fs::create_dir_all(&storage_dir).await?;
		let db_path = storage_dir.join(config.file_name.as_ref());

		let db = tokio::task::spawn_blocking(move || -> NbResult<redb::Database> {
			let db = if db_path.exists() {
				redb::Database::open(&db_path).map_err(from_redb_error)?
			} else {
				redb::Database::create(&db_path).map_err(from_redb_error)?
			};

			let tx = db.begin_write().map_err(from_redb_error)?;
			let _ = tx.open_table(storage::TABLE_ROWS).map_err(from_redb_error)?;
			tx.commit().map_err(from_redb_error)?;

			debug!("Opened store: {}", db_path.display());
			Ok(db)
		})
		.await
		.map_err(Error::from)??;

		let (change_tx, _) = broadcast::channel(config.broadcast_capacity);

		Ok(Self { db: Arc::new(db), change_tx, write_lock: Arc::new(Mutex::new(())) })
	}

	/// Number of currently live subscriptions
	pub fn subscriber_count(&self) -> usize {
		self.change_tx.receiver_count()
	}

	/// Run a write on the blocking pool, broadcasting its event after commit
	async fn write<F>(&self, op: F) -> NbResult<Value>
	where
		F: FnOnce(&redb::Database) -> NbResult<(Value, ChangeEvent)> + Send + 'static,
	{
		let db = Arc::clone(&self.db);
		let change_tx = self.change_tx.clone();
		let write_lock = Arc::clone(&self.write_lock);

		tokio::task::spawn_blocking(move || -> NbResult<Value> {
			let _guard = write_lock.lock();
			let (row, event) = op(&db)?;
			// No receivers is not an error
			let _ = change_tx.send(event);
			Ok(row)
		})
		.await
		.map_err(Error::from)?
	}
}

fn insert_row(db: &redb::Database, table: Table, mut row: Value) -> NbResult<(Value, ChangeEvent)> {
	let Some(obj) = row.as_object_mut() else {
		return Err(Error::InvalidRow("row must be a JSON object".into()).into());
	};
	let id = match obj.get("id").and_then(Value::as_str) {
		Some(id) if !id.is_empty() => id.to_string(),
		_ => {
			let id = random_id();
			obj.insert("id".into(), Value::String(id.clone()));
			id
		}
	};
	let key = storage::row_key(table, &id);
	let json = serde_json::to_string(&row)?;

	let tx = db.begin_write().map_err(from_redb_error)?;
	{
		let mut rows = tx.open_table(storage::TABLE_ROWS).map_err(from_redb_error)?;
		if rows.get(key.as_str()).map_err(from_redb_error)?.is_some() {
			return Err(NbError::Conflict(format!("{} {} already exists", table, id)));
		}
		rows.insert(key.as_str(), json.as_str()).map_err(from_redb_error)?;
	}
	tx.commit().map_err(from_redb_error)?;

	let event = ChangeEvent::Insert { table, id: id.into(), data: row.clone() };
	Ok((row, event))
}

fn update_row(
	db: &redb::Database,
	table: Table,
	id: &str,
	patch: &Value,
) -> NbResult<(Value, ChangeEvent)> {
	let key = storage::row_key(table, id);

	let tx = db.begin_write().map_err(from_redb_error)?;
	let (old, new) = {
		let mut rows = tx.open_table(storage::TABLE_ROWS).map_err(from_redb_error)?;
		let stored = rows
			.get(key.as_str())
			.map_err(from_redb_error)?
			.map(|v| v.value().to_string())
			.ok_or(NbError::NotFound)?;
		let old: Value = serde_json::from_str(&stored)?;
		let mut new = old.clone();
		merge::shallow_merge(&mut new, patch)?;
		let json = serde_json::to_string(&new)?;
		rows.insert(key.as_str(), json.as_str()).map_err(from_redb_error)?;
		(old, new)
	};
	tx.commit().map_err(from_redb_error)?;

	let event = ChangeEvent::Update { table, id: id.into(), data: new.clone(), old_data: Some(old) };
	Ok((new, event))
}

fn delete_row(db: &redb::Database, table: Table, id: &str) -> NbResult<(Value, ChangeEvent)> {
	let key = storage::row_key(table, id);

	let tx = db.begin_write().map_err(from_redb_error)?;
	let old = {
		let mut rows = tx.open_table(storage::TABLE_ROWS).map_err(from_redb_error)?;
		let removed =
			rows.remove(key.as_str()).map_err(from_redb_error)?.map(|v| v.value().to_string());
		match removed {
			Some(json) => serde_json::from_str::<Value>(&json)?,
			None => return Err(NbError::NotFound),
		}
	};
	tx.commit().map_err(from_redb_error)?;

	let event = ChangeEvent::Delete { table, id: id.into(), old_data: Some(old.clone()) };
	Ok((old, event))
}

#[async_trait]
impl StoreAdapter for StoreAdapterRedb {
	async fn query(&self, table: Table, opts: QueryOptions) -> NbResult<Vec<Value>> {
		let db = Arc::clone(&self.db);
		tokio::task::spawn_blocking(move || query::execute_query(&db, table, &opts))
			.await
			.map_err(Error::from)?
			.map_err(Into::into)
	}

	async fn get(&self, table: Table, id: &str) -> NbResult<Option<Value>> {
		let db = Arc::clone(&self.db);
		let id = id.to_string();
		tokio::task::spawn_blocking(move || query::read_row(&db, table, &id))
			.await
			.map_err(Error::from)?
			.map_err(Into::into)
	}

	async fn insert(&self, table: Table, data: Value) -> NbResult<Value> {
		self.write(move |db| insert_row(db, table, data)).await
	}

	async fn update(&self, table: Table, id: &str, patch: Value) -> NbResult<Value> {
		let id = id.to_string();
		self.write(move |db| update_row(db, table, &id, &patch)).await
	}

	async fn delete(&self, table: Table, id: &str) -> NbResult<()> {
		let id = id.to_string();
		self.write(move |db| delete_row(db, table, &id)).await?;
		Ok(())
	}
}

#[async_trait]
impl ChangeFeed for StoreAdapterRedb {
	async fn subscribe(&self, opts: SubscriptionOptions) -> NbResult<ChangeStream> {
		// Subscribe before returning so no commit after this call is missed
		let mut rx = self.change_tx.subscribe();
		debug!("Subscribed to {} ({:?})", opts.table, opts.filter);

		let stream = async_stream::stream! {
			loop {
				match rx.recv().await {
					Ok(event) => {
						if event.matches(&opts) {
							yield event;
						}
					}
					Err(broadcast::error::RecvError::Lagged(n)) => {
						// Missed events cannot be recovered, the stream ends so the
						// subscriber stops counting itself live
						warn!("Subscription on {} lagged, missed {} events, closing", opts.table, n);
						break;
					}
					Err(broadcast::error::RecvError::Closed) => {
						break;
					}
				}
			}
		};

		Ok(Box::pin(stream))
	}
}

// vim: ts=4
