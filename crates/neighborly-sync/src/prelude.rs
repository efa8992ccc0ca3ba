pub use neighborly_types::prelude::*;

pub use neighborly_types::model::{ChatMessage, ChatSession, Post, PostResponse};
pub use neighborly_types::store_adapter::{ChangeEvent, Table};

// vim: ts=4
