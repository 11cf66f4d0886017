//! worker_update tool implementation.
//!
//! Installs a new worker version and then runs the page's update flow
//! against it: a waiting version is offered to the user (answered here by
//! `confirm`), and any controller change reloads the page once.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_client::{ControllerChange, OfflineWorker, PageSession, WorkerState};

use super::ToolContext;
use crate::error::{ToolError, to_json};

fn default_confirm() -> bool {
    true
}

/// Parameters for the worker_update tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerUpdateParams {
    /// Version name for the new worker; also the name of its store.
    pub version: String,

    /// Answer to the "new version available" prompt (default: true).
    #[serde(default = "default_confirm")]
    pub confirm: bool,
}

/// Output from the worker_update tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerUpdateOutput {
    pub version: String,
    pub state: WorkerState,
    pub controller: Option<String>,
    pub waiting: Option<String>,
    /// One of `no_update`, `declined` or `applied`.
    pub decision: String,
    pub controller_change: Option<ControllerChange>,
    pub reloaded: bool,
}

/// Implementation of the worker_update tool.
pub async fn update_impl(ctx: &ToolContext, params: WorkerUpdateParams) -> Result<CallToolResult, McpError> {
    let version = params.version.trim();
    if version.is_empty() {
        return Err(ToolError::InvalidInput("version must not be empty".into()).into());
    }
    if ctx.host.controller().await.is_some_and(|w| w.version() == version) {
        return Err(ToolError::InvalidInput(format!("version {version} is already in control")).into());
    }

    let mut page = PageSession::attach(ctx.host.clone());
    let worker = OfflineWorker::new(ctx.worker.with_version(version), ctx.db.clone(), ctx.host.fetcher());
    let worker = ctx.host.register(worker).await?;

    let confirm = params.confirm;
    let decision = page.check_for_update(&move |_: &str| confirm).await?;
    let controller_change = page.poll_controller_change();

    let output = WorkerUpdateOutput {
        version: worker.version().to_string(),
        state: worker.state(),
        controller: ctx.host.controller().await.map(|w| w.version().to_string()),
        waiting: ctx.host.waiting().await.map(|w| w.version().to_string()),
        decision: decision.as_str().to_string(),
        controller_change,
        reloaded: page.reloaded(),
    };
    let json = to_json(&output)?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
