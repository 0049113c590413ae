use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response of the unauthenticated `GET /token` endpoint.
///
/// Every field is optional on the wire; a response without `token` is a
/// failed credential fetch, not a parse error. The remaining fields are
/// informational and accept any JSON type.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestTokenResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user_id: Option<Value>,
    /// Credential kind reported by upstream, e.g. "guest"
    #[serde(default, rename = "type")]
    pub kind: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
}

/// Output of the `listEvents` tool.
///
/// Events are opaque upstream JSON objects and are passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListEventsOutput {
    pub events: Vec<Value>,
    pub count: usize,
    pub skip: u64,
    pub limit: u64,
}

impl ListEventsOutput {
    pub fn new(events: Vec<Value>, skip: u64, limit: u64) -> Self {
        Self {
            count: events.len(),
            events,
            skip,
            limit,
        }
    }
}

/// Output of the `getEventById` tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetEventOutput {
    pub event: Value,
}
