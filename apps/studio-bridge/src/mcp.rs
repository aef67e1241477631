//! Newline-delimited JSON-RPC 2.0 over stdio.
//!
//! Requests are read one line at a time. `tools/call` runs on its own task
//! so a slow Studio job never holds up other calls; every reply funnels
//! through a single writer task, which keeps lines whole.

use std::io;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::broker::BrokerError;
use crate::state::AppState;
use crate::tools::{prepare_args, ToolCatalog, CONNECTION_STATUS_TOOL};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "studio-bridge";

pub const NOT_CONNECTED_MESSAGE: &str = "Studio is not connected. Make sure the Roblox Studio \
     plugin is installed and 'Start Bridge Polling' has been clicked.";
pub const TIMEOUT_MESSAGE: &str =
    "Timed out waiting for Studio to respond. Check that the plugin is running and connected.";

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: Option<String>,
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Clone)]
pub struct McpServer {
    state: AppState,
    catalog: Arc<ToolCatalog>,
}

impl McpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            catalog: Arc::new(ToolCatalog::builtin()),
        }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Serves until `reader` reaches EOF, then waits for in-flight tool
    /// calls to answer before returning.
    pub async fn serve<R, W>(&self, mut reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_responses(rx, writer));

        let mut line = Vec::new();
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line).await? == 0 {
                break;
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let request: JsonRpcRequest = match serde_json::from_slice(&line) {
                Ok(request) => request,
                Err(err) => {
                    warn!(error = %err, "skipping unparseable request line");
                    continue;
                }
            };
            if request.method == "tools/call" {
                let server = self.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Some(response) = server.handle(request).await {
                        let _ = tx.send(response);
                    }
                });
            } else if let Some(response) = self.handle(request).await {
                let _ = tx.send(response);
            }
        }
        debug!("stdin closed; draining in-flight calls");
        drop(tx);
        writer_task.await.map_err(io::Error::other)?
    }

    /// Answers one request. Notifications (no `id`) get no reply.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let JsonRpcRequest {
            jsonrpc,
            id,
            method,
            params,
        } = request;
        let Some(id) = id else {
            debug!(method = %method, "notification received");
            return None;
        };
        // A missing version is tolerated; a wrong one is not.
        if let Some(version) = jsonrpc.filter(|version| version != "2.0") {
            warn!(method = %method, version = %version, "rejecting request");
            return Some(rpc_error(
                id,
                -32600,
                format!("Invalid Request: unsupported jsonrpc version {version:?}"),
            ));
        }
        let response = match method.as_str() {
            "initialize" => success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "serverInfo": {
                        "name": SERVER_NAME,
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                    "capabilities": { "tools": {} },
                }),
            ),
            "ping" => success(id, json!({})),
            "tools/list" => success(id, json!({ "tools": self.catalog.definitions() })),
            "tools/call" => {
                match serde_json::from_value::<CallToolParams>(params.unwrap_or(Value::Null)) {
                    Ok(call) => {
                        let result = self.call_tool(&call.name, call.arguments).await;
                        success(id, result)
                    }
                    Err(err) => invalid_params(id, err),
                }
            }
            _ => method_not_found(id),
        };
        Some(response)
    }

    /// Runs one tool and renders the MCP tool result. Failures are tool
    /// errors (`isError: true`), never JSON-RPC errors.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Value {
        let args = match arguments {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(args)) => args,
            Some(_) => return tool_error("Tool arguments must be a JSON object."),
        };
        let client_id = self
            .state
            .client_id_or_default(args.get("client_id").and_then(Value::as_str))
            .to_string();

        if name == CONNECTION_STATUS_TOOL {
            return tool_result(&self.state.liveness().status(&client_id));
        }
        let Some(job_type) = self.catalog.job_type(name) else {
            return tool_error(&format!("Unknown tool: {name}"));
        };
        let args = Value::Object(prepare_args(job_type, args));
        if let Err(err) = rich_types::validate(&args) {
            warn!(tool = name, code = err.code(), error = %err, "rejecting tool arguments");
            return tool_error(&format!("Invalid arguments: {err}"));
        }

        debug!(tool = name, job_type, client_id = %client_id, "forwarding tool call");
        match self.state.broker().submit(job_type, args, &client_id).await {
            Ok(result) if result.ok => tool_result(&result.result.unwrap_or(Value::Null)),
            Ok(result) => tool_error(&result.error_message()),
            Err(BrokerError::NotConnected { .. }) => tool_error(NOT_CONNECTED_MESSAGE),
            Err(BrokerError::Timeout { .. }) => tool_error(TIMEOUT_MESSAGE),
            Err(err) => tool_error(&err.to_string()),
        }
    }
}

async fn write_responses<W>(
    mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
    mut writer: W,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_vec(&response)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}

fn tool_result<T: Serialize>(payload: &T) -> Value {
    let text = serde_json::to_string_pretty(payload).unwrap_or_else(|_| "null".to_string());
    json!({ "content": [{ "type": "text", "text": text }] })
}

fn tool_error(message: &str) -> Value {
    json!({ "isError": true, "content": [{ "type": "text", "text": message }] })
}

fn success(id: Value, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result: Some(result),
        error: None,
    }
}

fn rpc_error(id: Value, code: i32, message: String) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(JsonRpcError { code, message }),
    }
}

fn invalid_params(id: Value, err: serde_json::Error) -> JsonRpcResponse {
    rpc_error(id, -32602, err.to_string())
}

fn method_not_found(id: Value) -> JsonRpcResponse {
    rpc_error(id, -32601, "Method not found".to_string())
}
