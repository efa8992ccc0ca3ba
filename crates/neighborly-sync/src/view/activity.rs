//! Activity feed of one cluster: its active posts and their responses

use neighborly_types::store_adapter::{FeedFilter, SubscriptionOptions};
use std::collections::HashMap;

use super::{TeardownHandle, ViewContext, ViewCore};
use crate::derived;
use crate::prelude::*;
use crate::reconcile::{Change, Order, Orphans, ReconciledCollection};

#[derive(Debug)]
pub struct ActivityView {
	ctx: ViewContext,
	core: ViewCore,
	cluster_id: Box<str>,
	identity: Identity,
	posts: ReconciledCollection<Post>,
	responses: HashMap<Box<str>, ReconciledCollection<PostResponse>>,
	orphans: Orphans<PostResponse>,
}

impl ActivityView {
	/// Creates the view without touching the feed, call `mount` next
	pub fn new(ctx: ViewContext, cluster_id: &str, identity: Identity) -> Self {
		let core = ViewCore::new(
			&ctx,
			vec![
				SubscriptionOptions::filtered(
					Table::Posts,
					FeedFilter::column_eq("cluster_id", cluster_id),
				),
				// Responses carry no cluster column, they are matched to the
				// known posts here
				SubscriptionOptions::all(Table::PostResponses),
			],
		);
		let orphans = Orphans::new(ctx.config.max_parked);
		Self {
			ctx,
			core,
			cluster_id: cluster_id.into(),
			identity,
			posts: ReconciledCollection::new(Order::NewestFirst),
			responses: HashMap::new(),
			orphans,
		}
	}

	/// Opens the channels, loads the snapshot and replays what arrived in
	/// between. A channel failure leaves the view snapshot-only.
	///
	/// An anonymous identity is refused with `Unauthenticated` before any
	/// channel is opened. A failed snapshot tears the view down.
	pub async fn mount(&mut self) -> NbResult<()> {
		self.identity.require()?;
		let res = self.load().await;
		if let Err(err) = &res {
			warn!("Activity view of {} failed to mount: {}", self.cluster_id, err);
			self.teardown();
		}
		res
	}

	async fn load(&mut self) -> NbResult<()> {
		if !self.core.open_channels().await {
			info!("Activity view of {} mounted without live updates", self.cluster_id);
		}

		let posts = self.ctx.loader.load_posts(&self.cluster_id, self.ctx.config.post_limit).await?;
		if self.core.is_torn_down() {
			return Ok(());
		}
		let responses = self
			.ctx
			.loader
			.load_responses_for_posts(posts.iter().map(|p| p.id.as_ref()))
			.await?;
		if self.core.is_torn_down() {
			return Ok(());
		}

		self.posts.replace_snapshot(posts);
		self.responses = self
			.posts
			.ids()
			.map(|id| (Box::from(id), ReconciledCollection::new(Order::Chronological)))
			.collect();
		for response in responses {
			if let Some(collection) = self.responses.get_mut(response.post_id.as_ref()) {
				collection.apply(Change::Inserted(response));
			}
		}
		debug!("Activity view of {} loaded {} posts", self.cluster_id, self.posts.len());

		self.process_pending().await;
		Ok(())
	}

	pub fn cluster_id(&self) -> &str {
		&self.cluster_id
	}

	pub fn is_live(&self) -> bool {
		self.core.is_live()
	}

	/// Opens the channels that failed before. The snapshot is kept as is.
	pub async fn retry_live(&mut self) -> bool {
		self.core.open_channels().await
	}

	pub fn teardown_handle(&self) -> TeardownHandle {
		self.core.teardown_handle()
	}

	pub fn teardown(&self) {
		self.core.teardown_handle().teardown();
	}

	/// Applies every queued event without waiting. Returns how many were
	/// applied.
	pub async fn process_pending(&mut self) -> usize {
		let mut applied = 0;
		while let Some(event) = self.core.try_next() {
			self.apply_event(event).await;
			applied += 1;
		}
		applied
	}

	/// Waits for one event and applies it. Returns false once torn down.
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
			Table::Posts => match Change::<Post>::from_event(&event) {
				Ok(change) => self.apply_post(change).await,
				Err(err) => warn!("Dropping post event {}: {}", event.id(), err),
			},
			Table::PostResponses => match Change::<PostResponse>::from_event(&event) {
				Ok(change) => self.apply_response(change),
				Err(err) => warn!("Dropping response event {}: {}", event.id(), err),
			},
			table => debug!("Activity view ignores {} events", table),
		}
	}

	async fn apply_post(&mut self, change: Change<Post>) {
		let post = match change {
			Change::Deleted(id) => {
				self.drop_post(&id);
				return;
			}
			Change::Inserted(post) | Change::Updated(post) => post,
		};

		if post.cluster_id != self.cluster_id || !post.is_active {
			self.drop_post(&post.id);
			return;
		}
		if self.posts.contains(&post.id) {
			self.posts.apply(Change::Updated(post));
			return;
		}

		// A post new to the view, its responses so far are not in the feed.
		// They are read before the next event is taken off the queue, so
		// queued responses of this post land on top of them.
		let responses = match self.ctx.loader.load_responses(&post.id).await {
			Ok(responses) => responses,
			Err(err) => {
				warn!("Could not load responses of post {}: {}", post.id, err);
				Vec::new()
			}
		};
		if self.core.is_torn_down() {
			return;
		}

		let mut collection = ReconciledCollection::from_snapshot(Order::Chronological, responses);
		for parked in self.orphans.take(&post.id) {
			collection.apply(parked);
		}
		self.responses.insert(post.id.clone(), collection);
		self.posts.apply(Change::Inserted(post));
	}

	fn drop_post(&mut self, post_id: &str) {
		if self.posts.remove(post_id).is_some() {
			debug!("Post {} left the activity view of {}", post_id, self.cluster_id);
		}
		self.responses.remove(post_id);
		self.orphans.discard_parent(post_id);
	}

	fn apply_response(&mut self, change: Change<PostResponse>) {
		match change {
			Change::Deleted(id) => {
				for collection in self.responses.values_mut() {
					collection.remove(&id);
				}
				self.orphans.discard(&id);
			}
			Change::Inserted(response) | Change::Updated(response) => {
				match self.responses.get_mut(response.post_id.as_ref()) {
					Some(collection) => {
						collection.apply(Change::Updated(response));
					}
					None => {
						let post_id = response.post_id.clone();
						self.orphans.park(&post_id, Change::Updated(response));
					}
				}
			}
		}
	}

	// Read side
	//***********

	/// Active posts of the cluster, newest first
	pub fn posts(&self) -> &[Post] {
		self.posts.items()
	}

	pub fn post(&self, post_id: &str) -> Option<&Post> {
		self.posts.get(post_id)
	}

	/// Responses to a post, oldest first
	pub fn responses(&self, post_id: &str) -> &[PostResponse] {
		self.responses.get(post_id).map(ReconciledCollection::items).unwrap_or_default()
	}

	pub fn help_offers_count(&self, post_id: &str) -> usize {
		derived::help_offers_count(self.responses(post_id), post_id)
	}

	pub fn has_user_offered(&self, post_id: &str, user_id: &str) -> bool {
		derived::has_user_offered(self.responses(post_id), post_id, user_id)
	}

	/// Whether the viewing user offered help on the post
	pub fn has_offered(&self, post_id: &str) -> bool {
		self.identity.user_id().is_some_and(|user_id| self.has_user_offered(post_id, user_id))
	}

	/// Unread responses on the viewing user's own posts
	pub fn unread_response_count(&self) -> usize {
		let Some(user_id) = self.identity.user_id() else {
			return 0;
		};
		derived::unread_response_count(
			self.posts.items(),
			self.responses.values().flat_map(ReconciledCollection::items),
			user_id,
		)
	}

	/// Responses held back until their post shows up
	pub fn parked_count(&self) -> usize {
		self.orphans.len()
	}
}

// vim: ts=4
