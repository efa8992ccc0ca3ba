pub use neighborly_sync::prelude::*;

pub use crate::app::{App, AppBuilder};

// vim: ts=4
