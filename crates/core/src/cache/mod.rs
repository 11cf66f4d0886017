//! SQLite-backed store of captured HTTP responses.
//!
//! This module provides a persistent cache of named, versioned stores using
//! SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Request-addressed entries keyed by a SHA-256 of method and URL
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Whole-store deletion when a version is retired

pub mod connection;
pub mod entries;
pub mod key;
pub mod migrations;
pub mod stores;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::CachedResponse;
pub use stores::{CacheStore, StoreInfo};
