//! swcache MCP server entry point.
//!
//! Opens the cache database, registers the configured worker version for the
//! origin and serves the tools on stdio. Logging goes to stderr to avoid
//! interfering with the JSON-RPC protocol on stdout.

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use std::sync::Arc;
use swcache_client::{FetchConfig, HttpFetcher, OfflineWorker, ServiceHost, WorkerConfig};
use swcache_core::{AppConfig, CacheDb};
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        version = %config.cache_version,
        origin = %config.origin,
        "starting swcache server on stdio transport"
    );

    let db = CacheDb::open(&config.db_path).await?;
    let fetcher = Arc::new(HttpFetcher::new(&FetchConfig::from(&config))?);
    let host = Arc::new(ServiceHost::new(fetcher.clone()));
    let worker = WorkerConfig::from_app_config(&config)?;

    // An unreachable origin only leaves the pages uncontrolled.
    if let Err(e) = host.register(OfflineWorker::new(worker.clone(), db.clone(), fetcher)).await {
        tracing::warn!(version = %worker.version, "initial worker registration failed: {e}");
    }

    let handler = handler::SwcacheServer::new(tools::ToolContext { db, host, worker });
    let server = serve_server(handler, stdio()).await?;

    server.waiting().await?;

    Ok(())
}
