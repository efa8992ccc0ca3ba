//! Neighborly keeps the activity screens of a neighbourhood mutual-aid app
//! in sync with the shared store.
//!
//! # Overview
//!
//! - Activity feed of a cluster: active posts with their help offers and comments
//! - Private chats between a post owner and a helper
//! - Chat sessions list with latest messages and unread counts
//! - Writes through an action gateway that checks identity, input, business
//!   rules and a per-user write budget
//!
//! Adapters provide the persistence, the change feed and the optional
//! address lookup; `AppBuilder` wires them together.

// Re-export shared types and adapter traits from neighborly-types
pub use neighborly_types::error;
pub use neighborly_types::identity;
pub use neighborly_types::model;
pub use neighborly_types::postcode;
pub use neighborly_types::store_adapter;
pub use neighborly_types::types;
pub use neighborly_types::utils;

pub use neighborly_sync as sync;

pub mod app;
pub mod prelude;

pub use app::{Adapters, App, AppBuilder, AppState, VERSION};

// vim: ts=4
