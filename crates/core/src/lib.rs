//! Core types and shared functionality for swcache.
//!
//! This crate provides:
//! - Versioned response store with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheStore, CachedResponse, StoreInfo};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
