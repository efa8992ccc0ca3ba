//! Reconciler
//!
//! Merges change events into a view's in-memory collections. Application is
//! synchronous and never does I/O: an insert for a known id replaces in
//! place, an update for an unknown id inserts, a delete for an unknown id is
//! a no-op. This makes replaying a buffered event over a snapshot that
//! already contains it harmless.

use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::fmt::Debug;

use crate::prelude::*;

/// A row type that can live in a reconciled collection
pub trait Entity: DeserializeOwned + Clone + Debug + Send + 'static {
	const TABLE: Table;

	fn id(&self) -> &str;
}

impl Entity for Post {
	const TABLE: Table = Table::Posts;

	fn id(&self) -> &str {
		&self.id
	}
}

impl Entity for PostResponse {
	const TABLE: Table = Table::PostResponses;

	fn id(&self) -> &str {
		&self.id
	}
}

impl Entity for ChatSession {
	const TABLE: Table = Table::ChatSessions;

	fn id(&self) -> &str {
		&self.id
	}
}

impl Entity for ChatMessage {
	const TABLE: Table = Table::ChatMessages;

	fn id(&self) -> &str {
		&self.id
	}
}

/// Display order of a collection, decides where new rows go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
	/// New rows are prepended
	NewestFirst,
	/// New rows are appended
	Chronological,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Change<T> {
	Inserted(T),
	Updated(T),
	Deleted(Box<str>),
}

impl<T: Entity> Change<T> {
	/// Decodes a feed event for `T::TABLE`
	pub fn from_event(event: &ChangeEvent) -> NbResult<Self> {
		if event.table() != T::TABLE {
			return Err(Error::Internal(format!(
				"{} event routed to {} collection",
				event.table(),
				T::TABLE
			)));
		}
		Ok(match event {
			ChangeEvent::Insert { data, .. } => Change::Inserted(serde_json::from_value(data.clone())?),
			ChangeEvent::Update { data, .. } => Change::Updated(serde_json::from_value(data.clone())?),
			ChangeEvent::Delete { id, .. } => Change::Deleted(id.clone()),
		})
	}

	pub fn id(&self) -> &str {
		match self {
			Change::Inserted(row) | Change::Updated(row) => row.id(),
			Change::Deleted(id) => id,
		}
	}
}

/// What `apply` did to the collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	Inserted,
	Replaced,
	Removed,
	Unchanged,
}

/// Ordered rows keyed by id, insertion order is display order
#[derive(Debug, Clone)]
pub struct ReconciledCollection<T> {
	order: Order,
	items: Vec<T>,
}

impl<T: Entity> ReconciledCollection<T> {
	pub fn new(order: Order) -> Self {
		Self { order, items: Vec::new() }
	}

	pub fn from_snapshot(order: Order, rows: Vec<T>) -> Self {
		let mut collection = Self::new(order);
		collection.replace_snapshot(rows);
		collection
	}

	pub fn order(&self) -> Order {
		self.order
	}

	pub fn items(&self) -> &[T] {
		&self.items
	}

	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	pub fn get(&self, id: &str) -> Option<&T> {
		self.items.iter().find(|item| item.id() == id)
	}

	pub fn contains(&self, id: &str) -> bool {
		self.position(id).is_some()
	}

	pub fn ids(&self) -> impl Iterator<Item = &str> {
		self.items.iter().map(|item| item.id())
	}

	fn position(&self, id: &str) -> Option<usize> {
		self.items.iter().position(|item| item.id() == id)
	}

	/// Replaces the whole baseline. Duplicate ids keep their first occurrence.
	pub fn replace_snapshot(&mut self, rows: Vec<T>) {
		self.items.clear();
		for row in rows {
			if !self.contains(row.id()) {
				self.items.push(row);
			}
		}
	}

	pub fn apply(&mut self, change: Change<T>) -> Outcome {
		match change {
			Change::Inserted(row) | Change::Updated(row) => self.upsert(row),
			Change::Deleted(id) => {
				if self.remove(&id).is_some() {
					Outcome::Removed
				} else {
					Outcome::Unchanged
				}
			}
		}
	}

	fn upsert(&mut self, row: T) -> Outcome {
		if let Some(pos) = self.position(row.id()) {
			self.items[pos] = row;
			return Outcome::Replaced;
		}
		match self.order {
			Order::NewestFirst => self.items.insert(0, row),
			Order::Chronological => self.items.push(row),
		}
		Outcome::Inserted
	}

	pub fn remove(&mut self, id: &str) -> Option<T> {
		self.position(id).map(|pos| self.items.remove(pos))
	}
}

/// Changes for child rows whose parent is not (yet) in the view.
///
/// Bounded: when full, the oldest parked change is dropped.
#[derive(Debug)]
pub struct Orphans<T> {
	capacity: usize,
	entries: VecDeque<(Box<str>, Change<T>)>,
}

impl<T: Entity> Orphans<T> {
	pub fn new(capacity: usize) -> Self {
		Self { capacity, entries: VecDeque::new() }
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn park(&mut self, parent_id: &str, change: Change<T>) {
		if self.capacity == 0 {
			return;
		}
		while self.entries.len() >= self.capacity {
			if let Some((parent, dropped)) = self.entries.pop_front() {
				debug!("Dropping parked {} change {} for {}", T::TABLE, dropped.id(), parent);
			}
		}
		self.entries.push_back((parent_id.into(), change));
	}

	/// Removes and returns the changes parked for `parent_id`, in receipt order
	pub fn take(&mut self, parent_id: &str) -> Vec<Change<T>> {
		let mut taken = Vec::new();
		self.entries.retain(|(parent, change)| {
			if parent.as_ref() == parent_id {
				taken.push(change.clone());
				false
			} else {
				true
			}
		});
		taken
	}

	/// Forgets every parked change for the row `id`
	pub fn discard(&mut self, id: &str) {
		self.entries.retain(|(_, change)| change.id() != id);
	}

	pub fn discard_parent(&mut self, parent_id: &str) {
		self.entries.retain(|(parent, _)| parent.as_ref() != parent_id);
	}
}


// vim: ts=4
