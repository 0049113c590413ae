use kynhood_core::events::{GetEventOutput, ListEventsOutput};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::config::PaginationDefaults;
use crate::error::ApiError;
use crate::http::ApiClient;

pub const LIST_EVENTS: &str = "listEvents";
pub const GET_EVENT_BY_ID: &str = "getEventById";

#[derive(Debug)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

pub fn tool_definitions(pagination: PaginationDefaults) -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: LIST_EVENTS,
            description: "List events from Kynhood API with optional pagination. Returns a list of trending and upcoming events.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "skip": {
                        "type": "number",
                        "description": "Number of events to skip (for pagination)",
                        "default": pagination.skip
                    },
                    "limit": {
                        "type": "number",
                        "description": "Maximum number of events to return",
                        "default": pagination.limit
                    }
                }
            }),
        },
        ToolDefinition {
            name: GET_EVENT_BY_ID,
            description: "Get detailed information about a specific event by its ID. Returns complete event details including description, location, date, and other metadata.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "id": {
                        "type": "string",
                        "description": "The unique identifier of the event (24-character hex string)"
                    }
                },
                "required": ["id"]
            }),
        },
    ]
}

pub async fn list_events_tool(
    api: &ApiClient,
    pagination: PaginationDefaults,
    args: &Map<String, Value>,
) -> Result<ListEventsOutput, ApiError> {
    let skip = arg_optional_u64(args, "skip")?.unwrap_or(pagination.skip);
    let limit = arg_optional_u64(args, "limit")?.unwrap_or(pagination.limit);
    debug!(skip, limit, "listEvents tool called");

    let events = api.list_events(skip, limit).await?;
    Ok(ListEventsOutput::new(events, skip, limit))
}

pub async fn get_event_by_id_tool(
    api: &ApiClient,
    args: &Map<String, Value>,
) -> Result<GetEventOutput, ApiError> {
    let id = required_string(args, "id")?;
    debug!(id = %id, "getEventById tool called");

    let event = api.get_event(&id).await?;
    Ok(GetEventOutput { event })
}

fn required_string(args: &Map<String, Value>, key: &str) -> Result<String, ApiError> {
    match args.get(key) {
        Some(Value::String(v)) if !v.is_empty() => Ok(v.clone()),
        Some(Value::String(_)) | Some(Value::Null) | None => {
            Err(ApiError::validation("Event ID is required"))
        }
        Some(_) => Err(ApiError::validation(format!("'{key}' must be a string"))),
    }
}

/// Accepts non-negative integers, including integral floats such as `5.0`.
fn arg_optional_u64(args: &Map<String, Value>, key: &str) -> Result<Option<u64>, ApiError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
                    .map(|f| f as u64)
            })
            .map(Some)
            .ok_or_else(|| {
                ApiError::validation(format!("'{key}' must be a non-negative integer"))
            }),
        Some(_) => Err(ApiError::validation(format!(
            "'{key}' must be a non-negative integer"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::credentials::CredentialCache;

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn definitions_expose_both_tools_with_configured_defaults() {
        let tools = tool_definitions(PaginationDefaults { skip: 3, limit: 7 });
        let names: Vec<_> = tools.iter().map(|tool| tool.name).collect();
        assert_eq!(names, vec![LIST_EVENTS, GET_EVENT_BY_ID]);

        let list = &tools[0].input_schema["properties"];
        assert_eq!(list["skip"]["default"], 3);
        assert_eq!(list["limit"]["default"], 7);
        assert_eq!(tools[1].input_schema["required"], json!(["id"]));
    }

    #[test]
    fn optional_u64_accepts_integral_numbers_only() {
        let parsed = args(json!({ "a": 5, "b": 5.0, "c": -1, "d": 2.5, "e": "5" }));
        assert_eq!(arg_optional_u64(&parsed, "a").unwrap(), Some(5));
        assert_eq!(arg_optional_u64(&parsed, "b").unwrap(), Some(5));
        assert_eq!(arg_optional_u64(&parsed, "missing").unwrap(), None);
        assert!(arg_optional_u64(&parsed, "c").is_err());
        assert!(arg_optional_u64(&parsed, "d").is_err());
        assert!(arg_optional_u64(&parsed, "e").is_err());
    }

    #[test]
    fn required_string_keeps_whitespace_ids() {
        let parsed = args(json!({ "id": " " }));
        assert_eq!(required_string(&parsed, "id").unwrap(), " ");
    }

    #[tokio::test]
    async fn list_events_scenario_shapes_output() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "abc",
                "userId": "u1",
                "type": "guest"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .and(query_param("skip", "0"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "1"}, {"id": "2"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri(), Arc::new(CredentialCache::default()));
        let output = list_events_tool(
            &api,
            PaginationDefaults::default(),
            &args(json!({ "skip": 0, "limit": 5 })),
        )
        .await
        .unwrap();

        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            json!({
                "events": [{"id": "1"}, {"id": "2"}],
                "count": 2,
                "skip": 0,
                "limit": 5
            })
        );
    }

    #[tokio::test]
    async fn list_events_uses_configured_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "abc" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .and(query_param("skip", "40"))
            .and(query_param("limit", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": "not-an-array" })))
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri(), Arc::new(CredentialCache::default()));
        let output = list_events_tool(&api, PaginationDefaults { skip: 40, limit: 20 }, &Map::new())
            .await
            .unwrap();

        assert_eq!(output, ListEventsOutput::new(Vec::new(), 40, 20));
        assert_eq!(output.count, 0);
    }

    #[tokio::test]
    async fn get_event_by_id_requires_id_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri(), Arc::new(CredentialCache::default()));
        for input in [json!({}), json!({ "id": "" }), json!({ "id": null })] {
            let err = get_event_by_id_tool(&api, &args(input)).await.unwrap_err();
            assert_eq!(err.to_string(), "Event ID is required");
        }
        let err = get_event_by_id_tool(&api, &args(json!({ "id": 42 })))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn get_event_by_id_wraps_event() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "abc" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/events/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "id": "abc123", "title": "Jazz night" }
            })))
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri(), Arc::new(CredentialCache::default()));
        let output = get_event_by_id_tool(&api, &args(json!({ "id": "abc123" })))
            .await
            .unwrap();
        assert_eq!(output.event, json!({ "id": "abc123", "title": "Jazz night" }));
    }
}
