//! MCP tool implementations.
//!
//! This module contains all tools exposed by the swcache server.

pub mod cache;
pub mod offline_fetch;
pub mod worker_update;

use std::sync::Arc;
use swcache_client::{ServiceHost, WorkerConfig};
use swcache_core::CacheDb;

pub use offline_fetch::{OfflineFetchParams, fetch_impl};
pub use worker_update::{WorkerUpdateParams, update_impl};

/// Shared state handed to every tool.
#[derive(Clone)]
pub struct ToolContext {
    pub db: CacheDb,
    pub host: Arc<ServiceHost>,
    /// Template for new worker versions.
    pub worker: WorkerConfig,
}

impl ToolContext {
    /// Name of the store that answers for the origin right now.
    ///
    /// That is the controller's version, or the configured one before any
    /// worker has taken control.
    pub async fn current_version(&self) -> String {
        match self.host.controller().await {
            Some(worker) => worker.version().to_string(),
            None => self.worker.version.clone(),
        }
    }
}
