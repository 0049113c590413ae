use serde::{Deserialize, Serialize};

/// Structured failure returned to the host when a tool call fails.
/// Serialized as the text content of an `isError` tool result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFailure {
    /// Human/agent-readable description, including the failing operation
    pub error: String,
    /// Name of the tool that failed
    pub tool: String,
}

impl ToolFailure {
    pub fn new(tool: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            tool: tool.into(),
        }
    }
}

/// Error codes used across the runtime
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const AUTHENTICATION_FAILED: &str = "authentication_failed";
    pub const UPSTREAM_HTTP_ERROR: &str = "upstream_http_error";
    pub const CONNECTION_ERROR: &str = "connection_error";
    pub const NOT_FOUND: &str = "not_found";
    pub const UNKNOWN_TOOL: &str = "unknown_tool";
}
