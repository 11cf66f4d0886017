//! Tool-level errors for the swcache MCP server.
//!
//! Cache and lifecycle failures come from [`swcache_core::Error`]; these
//! cover problems with the tool call itself.

use rmcp::model::{ErrorCode, ErrorData as McpError};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Invalid tool parameters (e.g., a blank version name).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Tool output could not be encoded.
    #[error("ENCODE_FAILED: {0}")]
    EncodeFailed(String),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let (code, message) = match &err {
            ToolError::InvalidInput(msg) => (-32602, msg.clone()),
            ToolError::EncodeFailed(msg) => (-32603, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

/// Serialize a tool output as pretty JSON text content.
pub fn to_json<T: serde::Serialize>(output: &T) -> Result<String, ToolError> {
    serde_json::to_string_pretty(output).map_err(|e| ToolError::EncodeFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_codes() {
        let err: McpError = ToolError::InvalidInput("version must not be empty".into()).into();
        assert_eq!(err.code, ErrorCode(-32602));
        assert_eq!(err.message, "version must not be empty");

        let err: McpError = ToolError::EncodeFailed("boom".into()).into();
        assert_eq!(err.code, ErrorCode(-32603));
    }

    #[test]
    fn test_tool_error_display() {
        assert_eq!(ToolError::InvalidInput("x".into()).to_string(), "INVALID_INPUT: x");
    }
}
