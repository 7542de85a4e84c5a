//! MCP server implementation over STDIO
//!
//! Reads newline-delimited JSON-RPC requests from stdin, handles them one at
//! a time and writes responses to stdout.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::adapter::McpToolAdapter;
use crate::protocol::*;

pub const SERVER_NAME: &str = "applemusic-mcp";

pub struct McpServer {
    adapter: McpToolAdapter,
}

impl McpServer {
    pub fn new(adapter: McpToolAdapter) -> Self {
        Self { adapter }
    }

    pub async fn serve_stdio(&self) -> Result<()> {
        info!("MCP server starting on STDIO");
        self.serve(BufReader::new(io::stdin()), io::stdout()).await?;
        info!("MCP server STDIO closed");
        Ok(())
    }

    /// Serve until `reader` reaches end of input
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            debug!("MCP received: {}", truncate(line, 200));

            let request: JsonRpcRequest = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) => {
                    warn!("Invalid JSON-RPC request: {}", e);
                    let resp = JsonRpcResponse::error(
                        Value::Null,
                        PARSE_ERROR,
                        format!("Parse error: {}", e),
                    );
                    write_response(&mut writer, &resp).await?;
                    continue;
                }
            };

            if let Some(resp) = self.handle_request(request).await {
                write_response(&mut writer, &resp).await?;
            }
        }
        Ok(())
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone().unwrap_or(Value::Null);

        if request.jsonrpc != "2.0" {
            warn!("Rejecting JSON-RPC version {:?}", request.jsonrpc);
            return request.id.is_some().then(|| {
                JsonRpcResponse::error(
                    id,
                    INVALID_REQUEST,
                    format!("Unsupported jsonrpc version '{}'", request.jsonrpc),
                )
            });
        }

        match request.method.as_str() {
            "initialize" => {
                let result = InitializeResult {
                    protocol_version: PROTOCOL_VERSION.to_string(),
                    capabilities: ServerCapabilities {
                        tools: ToolsCapability { list_changed: false },
                    },
                    server_info: ServerInfo {
                        name: SERVER_NAME.to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    },
                };
                Some(to_response(id, &result))
            }

            "notifications/initialized" => {
                info!("MCP client initialized");
                None
            }

            "tools/list" => {
                let tools = self.adapter.list_tools();
                info!("MCP tools/list: returning {} tools", tools.len());
                Some(JsonRpcResponse::success(
                    id,
                    serde_json::json!({ "tools": tools }),
                ))
            }

            "tools/call" => {
                let name = request
                    .params
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let arguments = request
                    .params
                    .get("arguments")
                    .cloned()
                    .unwrap_or_else(|| serde_json::json!({}));

                if name.is_empty() {
                    return Some(JsonRpcResponse::error(
                        id,
                        INVALID_PARAMS,
                        "Missing 'name' parameter".to_string(),
                    ));
                }

                info!("MCP tools/call: {}", name);
                let result = self.adapter.call_tool(name, arguments).await;
                Some(to_response(id, &result))
            }

            "ping" => Some(JsonRpcResponse::success(id, serde_json::json!({}))),

            _ => {
                warn!("MCP unknown method: {}", request.method);
                // Notifications never get a reply
                if request.id.is_none() {
                    None
                } else {
                    Some(JsonRpcResponse::error(
                        id,
                        METHOD_NOT_FOUND,
                        format!("Unknown method: {}", request.method),
                    ))
                }
            }
        }
    }
}

fn to_response(id: Value, result: &impl Serialize) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, format!("Serialization failed: {}", e)),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// Write one newline-delimited JSON-RPC response
async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &JsonRpcResponse,
) -> Result<()> {
    let json = serde_json::to_string(response).context("Failed to serialize response")?;
    debug!("MCP sending: {}", truncate(&json, 200));
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
