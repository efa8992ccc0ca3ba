//! Persistence and change feed adapters
//!
//! Rows are JSON documents addressed by (`Table`, id). The persistence side
//! (`StoreAdapter`) offers point-in-time reads and single-row writes; the
//! change feed side (`ChangeFeed`) pushes a row-level event for every
//! committed write to each live subscription whose filter it satisfies.
//!
//! Each adapter implementation provides its own constructor handling
//! backend-specific initialization.

use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::pin::Pin;

use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
	Posts,
	PostResponses,
	ChatSessions,
	ChatMessages,
	Users,
	Clusters,
}

impl Table {
	pub const ALL: [Table; 6] = [
		Table::Posts,
		Table::PostResponses,
		Table::ChatSessions,
		Table::ChatMessages,
		Table::Users,
		Table::Clusters,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Table::Posts => "posts",
			Table::PostResponses => "post_responses",
			Table::ChatSessions => "chat_sessions",
			Table::ChatMessages => "chat_messages",
			Table::Users => "users",
			Table::Clusters => "clusters",
		}
	}
}

impl std::fmt::Display for Table {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for Table {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Table::ALL
			.into_iter()
			.find(|table| table.as_str() == s)
			.ok_or_else(|| Error::ValidationError(format!("unknown table: {}", s)))
	}
}

/// Query filter for selecting rows.
///
/// A row matches if ALL specified conditions are satisfied (AND logic).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
	/// Column equality constraints: column -> expected value
	#[serde(default, skip_serializing_if = "HashMap::is_empty")]
	pub equals: HashMap<String, Value>,

	/// Column not-equal constraints, missing columns count as not equal
	#[serde(default, skip_serializing_if = "HashMap::is_empty")]
	pub not_equals: HashMap<String, Value>,

	/// Column in-array constraints: column -> allowed values
	#[serde(default, skip_serializing_if = "HashMap::is_empty")]
	pub in_array: HashMap<String, Vec<Value>>,
}

impl QueryFilter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn equals_one(column: impl Into<String>, value: Value) -> Self {
		Self::default().with_equals(column, value)
	}

	pub fn with_equals(mut self, column: impl Into<String>, value: Value) -> Self {
		self.equals.insert(column.into(), value);
		self
	}

	pub fn with_not_equals(mut self, column: impl Into<String>, value: Value) -> Self {
		self.not_equals.insert(column.into(), value);
		self
	}

	pub fn with_in_array(mut self, column: impl Into<String>, values: Vec<Value>) -> Self {
		self.in_array.insert(column.into(), values);
		self
	}

	pub fn is_empty(&self) -> bool {
		self.equals.is_empty() && self.not_equals.is_empty() && self.in_array.is_empty()
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
	pub field: String,
	/// true for ascending, false for descending
	pub ascending: bool,
}

impl SortField {
	pub fn asc(field: impl Into<String>) -> Self {
		Self { field: field.into(), ascending: true }
	}

	pub fn desc(field: impl Into<String>) -> Self {
		Self { field: field.into(), ascending: false }
	}
}

/// Options for querying rows (filter, sort, limit).
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
	pub filter: Option<QueryFilter>,
	/// Multiple fields supported, earlier fields take precedence
	pub sort: Option<Vec<SortField>>,
	pub limit: Option<u32>,
}

impl QueryOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_filter(mut self, filter: QueryFilter) -> Self {
		self.filter = Some(filter);
		self
	}

	pub fn with_sort(mut self, sort: Vec<SortField>) -> Self {
		self.sort = Some(sort);
		self
	}

	pub fn with_limit(mut self, limit: u32) -> Self {
		self.limit = Some(limit);
		self
	}
}

/// Single column-equality predicate scoping a change feed channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedFilter {
	pub column: Box<str>,
	pub value: Box<str>,
}

impl FeedFilter {
	pub fn column_eq(column: impl Into<Box<str>>, value: impl Into<Box<str>>) -> Self {
		Self { column: column.into(), value: value.into() }
	}

	pub fn matches(&self, row: &Value) -> bool {
		row.get(self.column.as_ref()).and_then(Value::as_str) == Some(self.value.as_ref())
	}
}

impl std::fmt::Display for FeedFilter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}=eq.{}", self.column, self.value)
	}
}

/// Options for subscribing to row changes of one table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionOptions {
	pub table: Table,
	pub filter: Option<FeedFilter>,
}

impl SubscriptionOptions {
	pub fn all(table: Table) -> Self {
		Self { table, filter: None }
	}

	pub fn filtered(table: Table, filter: FeedFilter) -> Self {
		Self { table, filter: Some(filter) }
	}
}

/// Row-level change notification.
///
/// Update and delete events carry the previous row when the source knows it,
/// so that a subscriber filtering on a column still hears about a row that
/// just moved out of (or was removed from) its scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ChangeEvent {
	Insert {
		table: Table,
		id: Box<str>,
		data: Value,
	},
	Update {
		table: Table,
		id: Box<str>,
		data: Value,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		old_data: Option<Value>,
	},
	Delete {
		table: Table,
		id: Box<str>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		old_data: Option<Value>,
	},
}

impl ChangeEvent {
	pub fn table(&self) -> Table {
		match self {
			ChangeEvent::Insert { table, .. }
			| ChangeEvent::Update { table, .. }
			| ChangeEvent::Delete { table, .. } => *table,
		}
	}

	pub fn id(&self) -> &str {
		match self {
			ChangeEvent::Insert { id, .. }
			| ChangeEvent::Update { id, .. }
			| ChangeEvent::Delete { id, .. } => id,
		}
	}

	/// The row after the change (none for deletes)
	pub fn data(&self) -> Option<&Value> {
		match self {
			ChangeEvent::Insert { data, .. } | ChangeEvent::Update { data, .. } => Some(data),
			ChangeEvent::Delete { .. } => None,
		}
	}

	/// The row before the change, when known
	pub fn old_data(&self) -> Option<&Value> {
		match self {
			ChangeEvent::Insert { .. } => None,
			ChangeEvent::Update { old_data, .. } | ChangeEvent::Delete { old_data, .. } => {
				old_data.as_ref()
			}
		}
	}

	/// A string column of the row, looked up on the new row first
	pub fn column(&self, column: &str) -> Option<&str> {
		self.data()
			.and_then(|row| row.get(column))
			.or_else(|| self.old_data().and_then(|row| row.get(column)))
			.and_then(Value::as_str)
	}

	/// Check whether the event belongs to a subscription
	pub fn matches(&self, opts: &SubscriptionOptions) -> bool {
		if self.table() != opts.table {
			return false;
		}
		let Some(filter) = &opts.filter else {
			return true;
		};
		if filter.column.as_ref() == "id" {
			return self.id() == filter.value.as_ref();
		}
		self.data().is_some_and(|row| filter.matches(row))
			|| self.old_data().is_some_and(|row| filter.matches(row))
	}

	pub fn is_insert(&self) -> bool {
		matches!(self, ChangeEvent::Insert { .. })
	}

	pub fn is_delete(&self) -> bool {
		matches!(self, ChangeEvent::Delete { .. })
	}
}

pub type ChangeStream = Pin<Box<dyn Stream<Item = ChangeEvent> + Send>>;

#[async_trait]
pub trait StoreAdapter: Debug + Send + Sync {
	async fn query(&self, table: Table, opts: QueryOptions) -> NbResult<Vec<Value>>;

	/// Reads one row, a missing row is `Ok(None)`
	async fn get(&self, table: Table, id: &str) -> NbResult<Option<Value>>;

	/// Inserts a row, generating an id when the row carries none
	async fn insert(&self, table: Table, data: Value) -> NbResult<Value>;

	/// Shallow-merges `patch` into an existing row, `null` fields are removed
	async fn update(&self, table: Table, id: &str, patch: Value) -> NbResult<Value>;

	async fn delete(&self, table: Table, id: &str) -> NbResult<()>;
}

#[async_trait]
pub trait ChangeFeed: Debug + Send + Sync {
	/// Opens a live channel. Events committed after this returns are
	/// delivered in commit order; dropping the stream unsubscribes.
	async fn subscribe(&self, opts: SubscriptionOptions) -> NbResult<ChangeStream>;
}


// vim: ts=4
