//! Real-time activity synchronization for the Neighborly mutual-aid app.
//!
//! A client view opens filtered channels against the change feed, loads a
//! snapshot of the rows it shows, then keeps its in-memory collections in
//! step with the feed. Aggregates such as unread counts are recomputed from
//! those collections on demand. Writes go through the action gateway and
//! come back to every view through the feed.

pub mod config;
pub mod derived;
pub mod gateway;
pub mod prelude;
pub mod rate_limit;
pub mod reconcile;
pub mod snapshot;
pub mod subscription;
pub mod view;

pub use config::{RateLimitConfig, SyncConfig};
pub use gateway::ActionGateway;
pub use rate_limit::WriteLimiter;
pub use reconcile::{Change, Entity, Order, ReconciledCollection};
pub use snapshot::SnapshotLoader;
pub use subscription::{ChannelHandle, ChannelMessage, SubscriptionManager};
pub use view::{ActivityView, ChatView, SessionsView, TeardownHandle, ViewContext};

// vim: ts=4
