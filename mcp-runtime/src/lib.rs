use std::sync::Arc;

use clap::{Args, Subcommand};
use kynhood_core::error::{ToolFailure, codes};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::io::{self, AsyncBufRead, AsyncWrite, BufReader};
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod http;
pub mod tools;
pub mod transport;

use config::{PaginationDefaults, RuntimeConfig};
use credentials::CredentialCache;
use error::ApiError;
use http::ApiClient;
use transport::{TransportError, read_message, write_message};

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const MCP_SERVER_NAME: &str = "mcp-kynhood-events";

#[derive(Subcommand, Clone, Debug)]
pub enum McpCommands {
    /// Run the MCP server over stdio (default)
    Serve,
    /// Fetch a guest token and one page of events, then print a readiness report
    Diagnose(DiagnoseArgs),
}

#[derive(Args, Clone, Debug)]
pub struct DiagnoseArgs {
    /// Page size for the probe listing
    #[arg(long, default_value_t = 1)]
    pub limit: u64,
}

/// Runs a subcommand and returns the process exit code.
pub async fn run(config: RuntimeConfig, command: McpCommands) -> i32 {
    let server = McpServer::new(&config);
    match command {
        McpCommands::Serve => {
            info!(api_url = %config.api_url, "Starting MCP Kynhood Events server");
            let reader = BufReader::new(io::stdin());
            let writer = io::stdout();
            match server.serve(reader, writer).await {
                Ok(()) => 0,
                Err(err) => {
                    error!(error = %err, "MCP server stopped");
                    let payload = json!({
                        "error": "mcp_server_error",
                        "message": err.to_string(),
                    });
                    eprintln!("{}", to_pretty_json(&payload));
                    1
                }
            }
        }
        McpCommands::Diagnose(args) => {
            let report = server.run_diagnostics(&args).await;
            println!("{}", to_pretty_json(&report));
            diagnose_exit_code(&report)
        }
    }
}

pub struct McpServer {
    api: ApiClient,
    pagination: PaginationDefaults,
}

impl McpServer {
    pub fn new(config: &RuntimeConfig) -> Self {
        let credentials = Arc::new(CredentialCache::new(config.token_ttl));
        Self::with_client(ApiClient::new(config.api_url.clone(), credentials), config.pagination)
    }

    pub fn with_client(api: ApiClient, pagination: PaginationDefaults) -> Self {
        Self { api, pagination }
    }

    /// Serves one session until the reader reaches EOF. Requests are handled
    /// one at a time in arrival order.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<(), TransportError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("MCP Kynhood Events server running on stdio");
        loop {
            let incoming = read_message(&mut reader)
                .await
                .map_err(TransportError::Read)?;
            let Some(incoming) = incoming else {
                break;
            };

            let responses = match incoming.payload {
                Ok(message) => self.handle_incoming_message(message).await,
                Err(err) => vec![error_response(
                    Value::Null,
                    RpcError::parse_error(format!("Invalid JSON payload: {err}")),
                )],
            };
            for response in responses {
                write_message(&mut writer, &response, incoming.framing)
                    .await
                    .map_err(TransportError::Write)?;
            }
        }
        info!("MCP session closed");
        Ok(())
    }

    pub async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A client response; this server never issues requests.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if let Some(id) = obj.get("id").cloned() {
            let result = self.handle_request(method, params).await;
            Some(match result {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            })
        } else {
            debug!(method, "Notification received");
            None
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => {
                debug!("ListTools request received");
                Ok(self.tools_list_payload())
            }
            "tools/call" => self.handle_tools_call(params).await,
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self) -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {
                    "listChanged": false
                }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    fn tools_list_payload(&self) -> Value {
        let tools: Vec<Value> = tools::tool_definitions(self.pagination)
            .into_iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "inputSchema": tool.input_schema,
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        let span = info_span!("tool_call", tool = name, call_id = %Uuid::now_v7());
        Ok(self.call_tool(name, &args).instrument(span).await)
    }

    /// Runs a tool and shapes the outcome into a tool result. Failures never
    /// escape as protocol errors; they become `isError` results.
    pub async fn call_tool(&self, name: &str, args: &Map<String, Value>) -> Value {
        let arguments = Value::Object(args.clone());
        info!(arguments = %arguments, "Tool called");
        let outcome = match name {
            tools::LIST_EVENTS => tools::list_events_tool(&self.api, self.pagination, args)
                .await
                .map(|output| to_value(&output)),
            tools::GET_EVENT_BY_ID => tools::get_event_by_id_tool(&self.api, args)
                .await
                .map(|output| to_value(&output)),
            _ => {
                error!(code = codes::UNKNOWN_TOOL, "Unknown tool requested");
                return tool_error_result(&ToolFailure::new(name, format!("Unknown tool: {name}")));
            }
        };

        match outcome {
            Ok(payload) => tool_success_result(&payload),
            Err(err) => {
                error!(error = %err, code = err.code(), "Tool execution failed");
                tool_error_result(&tool_failure(name, &err))
            }
        }
    }

    async fn run_diagnostics(&self, args: &DiagnoseArgs) -> Value {
        let started = tokio::time::Instant::now();
        let probe = self.api.list_events(0, args.limit).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let credential_cached = self.api.credentials().has_valid();

        match probe {
            Ok(events) => json!({
                "status": "ready",
                "server": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
                "api_url": self.api.base_url(),
                "credential_cached": credential_cached,
                "sample_count": events.len(),
                "elapsed_ms": elapsed_ms
            }),
            Err(err) => {
                let status = if err.reached_upstream() {
                    "degraded"
                } else {
                    "unreachable"
                };
                json!({
                    "status": status,
                    "server": MCP_SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                    "api_url": self.api.base_url(),
                    "credential_cached": credential_cached,
                    "error": err.code(),
                    "message": err.to_string(),
                    "http_status": err.http_status(),
                    "elapsed_ms": elapsed_ms
                })
            }
        }
    }
}

/// `0` ready, `2` upstream answered but the probe failed, `3` upstream unreachable.
fn diagnose_exit_code(report: &Value) -> i32 {
    match report.get("status").and_then(Value::as_str) {
        Some("ready") => 0,
        Some("unreachable") => 3,
        _ => 2,
    }
}

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }
}

fn tool_failure(tool: &str, err: &ApiError) -> ToolFailure {
    ToolFailure::new(tool, err.to_string())
}

fn tool_success_result(payload: &Value) -> Value {
    json!({
        "content": [{ "type": "text", "text": to_pretty_json(payload) }]
    })
}

fn tool_error_result(failure: &ToolFailure) -> Value {
    json!({
        "isError": true,
        "content": [{ "type": "text", "text": to_pretty_json(&to_value(failure)) }]
    })
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}

fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
