//! MCP client for remote tool servers
//!
//! Speaks JSON-RPC 2.0 over HTTP POST. Servers may answer with a plain JSON
//! body or a single-event `text/event-stream` body; both are accepted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::RwLock;

use crate::error::{Result, RoutebookError};

use super::definition::ToolDescriptor;
use super::source::{ToolSource, ToolSourceConfig, ToolSourceConnector};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SESSION_HEADER: &str = "mcp-session-id";

/// MCP JSON-RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpRequest {
    pub fn new(method: &str, params: Option<Value>) -> Self {
        static REQUEST_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            jsonrpc: "2.0".to_string(),
            id: json!(REQUEST_ID.fetch_add(1, Ordering::SeqCst)),
            method: method.to_string(),
            params,
        }
    }
}

/// MCP JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpRpcError>,
}

/// MCP RPC Error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Tool entry as listed by `tools/list`
#[derive(Debug, Clone, Deserialize)]
struct McpTool {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    input_schema: Option<Value>,
}

/// Client for one MCP server
pub struct McpClient {
    config: ToolSourceConfig,
    http_client: reqwest::Client,
    session_id: RwLock<Option<String>>,
    initialized: RwLock<bool>,
}

impl McpClient {
    /// Create a new MCP client for the given source
    pub fn new(config: ToolSourceConfig, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| RoutebookError::Config(format!("invalid header name '{}' for source {}", name, config.id)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| RoutebookError::Config(format!("invalid header value for source {}", config.id)))?;
            headers.insert(name, value);
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| RoutebookError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            session_id: RwLock::new(None),
            initialized: RwLock::new(false),
        })
    }

    /// Initialize the connection to the server
    pub async fn initialize(&self) -> Result<()> {
        if *self.initialized.read().await {
            return Ok(());
        }

        log::info!("Initializing MCP client for source: {}", self.config.name);

        let request = McpRequest::new(
            "initialize",
            Some(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),
        );

        let response = self.send_request(&request).await?;
        if let Some(error) = response.error {
            return Err(RoutebookError::Upstream(format!(
                "initialize failed on {}: {}",
                self.config.id, error.message
            )));
        }

        // Servers that track sessions expect this notification before tool calls
        self.notify("notifications/initialized").await?;

        *self.initialized.write().await = true;
        Ok(())
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let body = json!({"jsonrpc": "2.0", "method": method});
        let mut request = self.http_client.post(&self.config.url).json(&body);
        if let Some(session) = self.session_id.read().await.as_deref() {
            request = request.header(SESSION_HEADER, session);
        }
        request.send().await.map_err(|e| self.transport_error(e))?;
        Ok(())
    }

    async fn send_request(&self, request: &McpRequest) -> Result<McpResponse> {
        log::debug!("Sending MCP request to {}: {}", self.config.url, request.method);

        let mut builder = self
            .http_client
            .post(&self.config.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(request);
        if let Some(session) = self.session_id.read().await.as_deref() {
            builder = builder.header(SESSION_HEADER, session);
        }

        let response = builder.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RoutebookError::Upstream(format!(
                "HTTP error {} from {}: {}",
                status, self.config.id, body
            )));
        }

        if let Some(session) = response.headers().get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
            *self.session_id.write().await = Some(session.to_string());
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        parse_response_body(&body, is_event_stream)
    }

    fn transport_error(&self, e: reqwest::Error) -> RoutebookError {
        if e.is_timeout() {
            RoutebookError::UpstreamTimeout(format!("tool source {}", self.config.id))
        } else {
            RoutebookError::Upstream(format!("request to {} failed: {}", self.config.id, e))
        }
    }
}

#[async_trait]
impl ToolSource for McpClient {
    fn id(&self) -> &str {
        &self.config.id
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        self.initialize().await?;

        let response = self.send_request(&McpRequest::new("tools/list", None)).await?;
        if let Some(error) = response.error {
            return Err(RoutebookError::Upstream(format!("tools/list failed: {}", error.message)));
        }

        let result = response.result.unwrap_or(json!({}));
        let tools: Vec<McpTool> = result
            .get("tools")
            .and_then(|t| serde_json::from_value(t.clone()).ok())
            .unwrap_or_default();

        log::info!("Loaded {} tools from {}", tools.len(), self.config.name);

        Ok(tools
            .into_iter()
            .map(|t| {
                let descriptor = ToolDescriptor::new(t.name, t.description.unwrap_or_default()).with_source(&self.config.id);
                match t.input_schema {
                    Some(schema) => descriptor.with_schema(schema),
                    None => descriptor,
                }
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        self.initialize().await?;

        log::debug!("Calling tool {} on {}", name, self.config.name);

        let request = McpRequest::new(
            "tools/call",
            Some(json!({
                "name": name,
                "arguments": arguments
            })),
        );

        let response = self.send_request(&request).await?;
        if let Some(error) = response.error {
            return Err(RoutebookError::Upstream(format!("Tool call failed: {}", error.message)));
        }

        normalize_tool_result(response.result.unwrap_or(Value::Null))
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("id", &self.config.id)
            .field("url", &self.config.url)
            .finish()
    }
}

/// Connector that opens an MCP client per registered source
pub struct McpConnector {
    timeout: Duration,
}

impl McpConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ToolSourceConnector for McpConnector {
    async fn connect(&self, config: &ToolSourceConfig) -> Result<Arc<dyn ToolSource>> {
        let client = McpClient::new(config.clone(), self.timeout)?;
        client.initialize().await?;
        Ok(Arc::new(client))
    }
}

/// Decode a JSON-RPC body, taking the last `data:` event of an SSE stream
fn parse_response_body(body: &str, is_event_stream: bool) -> Result<McpResponse> {
    let payload = if is_event_stream {
        body.lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim)
            .filter(|data| !data.is_empty())
            .last()
            .ok_or_else(|| RoutebookError::Upstream("event stream carried no data".to_string()))?
    } else {
        body
    };

    serde_json::from_str(payload).map_err(|e| RoutebookError::Upstream(format!("Failed to parse MCP response: {}", e)))
}

/// Reduce a `tools/call` result to the value later steps bind against
pub fn normalize_tool_result(result: Value) -> Result<Value> {
    let text = result
        .get("content")
        .and_then(|c| c.as_array())
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|t| !t.is_empty());

    if result.get("isError").and_then(|e| e.as_bool()).unwrap_or(false) {
        return Err(RoutebookError::Upstream(
            text.unwrap_or_else(|| "tool reported an error".to_string()),
        ));
    }

    if let Some(structured) = result.get("structuredContent") {
        return Ok(structured.clone());
    }

    Ok(text.map(Value::String).unwrap_or(result))
}
