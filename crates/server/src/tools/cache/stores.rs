//! cache_stores tool implementation.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::{Deserialize, Serialize};
use swcache_core::StoreInfo;

use crate::error::to_json;
use crate::tools::ToolContext;

/// Output from the cache_stores tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStoresOutput {
    /// Version of the controlling worker, if any.
    pub controller: Option<String>,
    /// Version installed and waiting to take control, if any.
    pub waiting: Option<String>,
    pub stores: Vec<StoreInfo>,
}

pub async fn stores_impl(ctx: &ToolContext) -> Result<CallToolResult, McpError> {
    let stores = ctx.db.list_stores().await?;
    let controller = ctx.host.controller().await.map(|w| w.version().to_string());
    let waiting = ctx.host.waiting().await.map(|w| w.version().to_string());

    let json = to_json(&CacheStoresOutput { controller, waiting, stores })?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
