//! Shared types, adapter traits, and core utilities for the Neighborly sync layer.
//!
//! This crate holds everything that both the sync core and the adapter
//! implementations need to agree on: the entity rows, the persistence and
//! change feed traits, the error type and a handful of helpers.

pub mod error;
pub mod identity;
pub mod model;
pub mod postcode;
pub mod prelude;
pub mod store_adapter;
pub mod types;
pub mod utils;

// vim: ts=4
