use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::ApiError;
use crate::http::{ApiClient, ApiRequest};

const EVENTS_ENDPOINT: &str = "/events";

impl ApiClient {
    /// Lists events. A response without a `data` array is treated as an
    /// empty page rather than an error.
    pub async fn list_events(&self, skip: u64, limit: u64) -> Result<Vec<Value>, ApiError> {
        info!(skip, limit, "Fetching events");

        let request = ApiRequest::get(EVENTS_ENDPOINT)
            .with_query("skip", skip)
            .with_query("limit", limit);
        let body = self.execute(&request).await.map_err(|err| {
            error!(error = %err, "Failed to fetch events");
            err.within("Failed to fetch events")
        })?;

        match take_data(body) {
            Some(Value::Array(events)) => {
                info!(count = events.len(), "Retrieved events");
                Ok(events)
            }
            other => {
                warn!(data = ?other, "Unexpected response format for events list");
                Ok(Vec::new())
            }
        }
    }

    /// Fetches a single event. Any non-empty id is forwarded as-is; a
    /// success status without `data` is a not-found.
    pub async fn get_event(&self, event_id: &str) -> Result<Value, ApiError> {
        if event_id.is_empty() {
            return Err(ApiError::validation("Valid event ID is required"));
        }
        let operation = format!("Failed to fetch event {event_id}");

        info!(event_id, "Fetching event details");
        let request = ApiRequest::get(format!("{EVENTS_ENDPOINT}/{event_id}"));
        let body = self.execute(&request).await.map_err(|err| {
            error!(event_id, error = %err, "Failed to fetch event");
            err.within(operation.as_str())
        })?;

        match take_data(body) {
            Some(Value::Null) | None => {
                error!(event_id, "Event data not found in response");
                Err(ApiError::not_found("Event data not found in response").within(operation))
            }
            Some(event) => {
                info!(event_id, "Retrieved event details");
                Ok(event)
            }
        }
    }
}

fn take_data(body: Value) -> Option<Value> {
    match body {
        Value::Object(mut map) => map.remove("data"),
        _ => None,
    }
}
