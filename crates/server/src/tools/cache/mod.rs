//! Cache inspection tools.
//!
//! Read-only views over the versioned stores.

pub mod get;
pub mod stores;

pub use get::{CacheGetParams, get_impl};
pub use stores::stores_impl;
