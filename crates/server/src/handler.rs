//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use crate::tools::cache::{CacheGetParams, get_impl, stores_impl};
use crate::tools::{OfflineFetchParams, ToolContext, WorkerUpdateParams, fetch_impl, update_impl};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for swcache.
#[derive(Clone)]
pub struct SwcacheServer {
    ctx: ToolContext,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl SwcacheServer {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx, tool_router: Self::tool_router() }
    }

    /// Fetch a URL through the controlling offline worker.
    #[tool(
        description = "Fetch a URL the way a controlled page would: images and fonts cache-first, documents network-first, falling back to the cache when offline. Returns status, headers, body and whether it came from the network or the cache."
    )]
    async fn offline_fetch(&self, params: Parameters<OfflineFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.ctx, params.0).await
    }

    /// Inspect a cached entry.
    #[tool(description = "Look up the current store's cached GET response for a URL, with its freshness.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.ctx, params.0).await
    }

    #[tool(description = "List cache stores with entry counts, and the controlling and waiting worker versions.")]
    async fn cache_stores(&self) -> Result<CallToolResult, McpError> {
        stores_impl(&self.ctx).await
    }

    /// Install a new worker version and run the page update flow.
    #[tool(
        description = "Install a new worker version. If it has to wait behind the current one, `confirm` answers the update prompt; confirming activates it and purges older stores."
    )]
    async fn worker_update(&self, params: Parameters<WorkerUpdateParams>) -> Result<CallToolResult, McpError> {
        update_impl(&self.ctx, params.0).await
    }
}

impl ServerHandler for SwcacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "swcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
