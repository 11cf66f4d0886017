//! offline_fetch tool implementation.
//!
//! Sends a request through the origin's controlling worker, as a page would.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_client::{Request, Response, ResponseSource};

use super::ToolContext;
use crate::error::to_json;

/// Parameters for the offline_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OfflineFetchParams {
    /// Absolute URL to request.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

/// Output from the offline_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineFetchOutput {
    pub url: String,
    pub status: u16,
    pub source: ResponseSource,
    pub headers: Vec<HeaderEntry>,
    /// Body as text; absent when the body is not UTF-8.
    pub body: Option<String>,
    pub body_bytes: usize,
    /// Capture time of a cached response (RFC 3339).
    pub captured_at: Option<String>,
}

impl From<Response> for OfflineFetchOutput {
    fn from(response: Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| HeaderEntry { name: name.to_string(), value: v.to_string() })
            })
            .collect();

        Self {
            url: response.url.to_string(),
            status: response.status.as_u16(),
            source: response.source,
            headers,
            body: std::str::from_utf8(&response.body).ok().map(str::to_string),
            body_bytes: response.body.len(),
            captured_at: response.captured_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Implementation of the offline_fetch tool.
pub async fn fetch_impl(ctx: &ToolContext, params: OfflineFetchParams) -> Result<CallToolResult, McpError> {
    let method = params.method.as_deref().unwrap_or("GET");
    let request = Request::parse(method, &params.url)?;

    let response = ctx.host.fetch(request).await?;
    tracing::info!(
        url = %response.url,
        status = response.status.as_u16(),
        source = ?response.source,
        "offline_fetch served"
    );

    let json = to_json(&OfflineFetchOutput::from(response))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{context, payload, shell_fetcher};
    use swcache_client::OfflineWorker;

    fn params(url: &str, method: Option<&str>) -> OfflineFetchParams {
        OfflineFetchParams { url: url.to_string(), method: method.map(str::to_string) }
    }

    #[tokio::test]
    async fn test_fetch_without_worker_uses_network() {
        let ctx = context(shell_fetcher(), true).await;
        let result = fetch_impl(&ctx, params("https://app.example.com/index.html", None)).await.unwrap();

        let value = payload(&result);
        assert_eq!(value["status"], 200);
        assert_eq!(value["source"], "network");
        assert_eq!(value["body"], "<html>index</html>");
    }

    #[tokio::test]
    async fn test_fetch_served_from_cache_when_offline() {
        let fetcher = shell_fetcher();
        let ctx = context(fetcher.clone(), true).await;
        ctx.host
            .register(OfflineWorker::new(ctx.worker.clone(), ctx.db.clone(), fetcher.clone()))
            .await
            .unwrap();

        fetch_impl(&ctx, params("https://app.example.com/logo.png", None)).await.unwrap();
        fetcher.set_offline(true);

        let result = fetch_impl(&ctx, params("https://app.example.com/logo.png", None)).await.unwrap();
        let value = payload(&result);
        assert_eq!(value["source"], "cache");
        assert_eq!(value["body_bytes"], 4);
        assert!(value["body"].is_null());
        assert!(value["captured_at"].is_string());
    }

    #[tokio::test]
    async fn test_fetch_offline_without_entry_errors() {
        let fetcher = shell_fetcher();
        let ctx = context(fetcher.clone(), true).await;
        ctx.host
            .register(OfflineWorker::new(ctx.worker.clone(), ctx.db.clone(), fetcher.clone()))
            .await
            .unwrap();
        fetcher.set_offline(true);

        let err = fetch_impl(&ctx, params("https://app.example.com/data.json", None)).await.unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode(-32008));
    }

    #[tokio::test]
    async fn test_fetch_rejects_bad_input() {
        let ctx = context(shell_fetcher(), true).await;

        let err = fetch_impl(&ctx, params("not a url", None)).await.unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode(-32003));

        let err = fetch_impl(&ctx, params("https://app.example.com/", Some("BAD METHOD"))).await.unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode(-32602));
    }
}
