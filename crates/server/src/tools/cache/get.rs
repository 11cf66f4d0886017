//! cache_get tool implementation.
//!
//! Looks up the current store's entry for a GET to a URL.

use chrono::Utc;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_client::fetch::canonicalize;
use swcache_client::strategy::is_fresh;
use swcache_client::{ResourceClass, classify};
use swcache_core::Error;

use crate::error::to_json;
use crate::tools::ToolContext;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// URL whose cached GET response to retrieve.
    pub url: String,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheGetOutput {
    pub store: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub stored_at: String,
    pub body_bytes: usize,
    pub class: ResourceClass,
    /// Whether a cache-first lookup would serve this entry without the network.
    /// Absent for network-first classes.
    pub fresh: Option<bool>,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(ctx: &ToolContext, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let url = canonicalize(&params.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    let store = ctx.db.store(&ctx.current_version().await);

    let entry = store
        .get("GET", url.as_str())
        .await?
        .ok_or_else(|| Error::CacheMiss(url.to_string()))?;

    let class = classify(url.path());
    let fresh = ctx.worker.max_age(class).map(|max_age| is_fresh(&entry, max_age, Utc::now()));

    let output = CacheGetOutput {
        store: store.name().to_string(),
        url: entry.url,
        status: entry.status,
        body_bytes: entry.body.len(),
        headers: entry.headers,
        stored_at: entry.stored_at,
        class,
        fresh,
    };
    let json = to_json(&output)?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
