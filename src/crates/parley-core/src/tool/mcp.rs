//! MCP client over streamable HTTP.
//!
//! Every message is a JSON-RPC 2.0 object POSTed to a single endpoint. The
//! server answers either with a JSON body or with a `text/event-stream`
//! whose `data:` lines carry the response; both are accepted.
//!
//! The session is opened lazily on first use:
//!
//! ```text
//! POST initialize                 ──▶  result + Mcp-Session-Id header
//! POST notifications/initialized  ──▶  202 Accepted
//! POST tools/list | tools/call    ──▶  (Mcp-Session-Id echoed on every request)
//! ```
//!
//! A 404 on a request carrying a session id means the server dropped the
//! session; it is discarded so the next call re-initializes.

use super::{RemoteTool, ToolError, ToolOutput, ToolTransport};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Protocol revision sent in `initialize`.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

const SESSION_HEADER: &str = "Mcp-Session-Id";
const PROTOCOL_HEADER: &str = "MCP-Protocol-Version";

/// JSON-RPC request id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(i64),
    String(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: JsonRpcId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: JsonRpcId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<JsonRpcId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone)]
struct McpSession {
    id: Option<String>,
    protocol_version: String,
}

/// [`ToolTransport`] speaking MCP streamable HTTP.
pub struct McpHttpTransport {
    server: String,
    url: String,
    client: reqwest::Client,
    session: Mutex<Option<McpSession>>,
    next_id: AtomicI64,
}

impl McpHttpTransport {
    pub fn new(server: impl Into<String>, url: impl Into<String>) -> Self {
        Self::with_client(server, url, reqwest::Client::new())
    }

    /// Use a preconfigured client (proxies, TLS roots, connection limits).
    pub fn with_client(
        server: impl Into<String>,
        url: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            server: server.into(),
            url: url.into(),
            client,
            session: Mutex::new(None),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn next_id(&self) -> JsonRpcId {
        JsonRpcId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn send(
        &self,
        body: &impl Serialize,
        session: Option<&McpSession>,
    ) -> Result<reqwest::Response, ToolError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(session) = session {
            request = request.header(PROTOCOL_HEADER, &session.protocol_version);
            if let Some(id) = &session.id {
                request = request.header(SESSION_HEADER, id);
            }
        }

        request.send().await.map_err(classify_reqwest_error)
    }

    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response, ToolError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ToolError::bad_status(format!(
            "{} returned {}: {}",
            self.server,
            status,
            super::truncate_chars(body.trim(), 200)
        )))
    }

    async fn post(
        &self,
        body: &impl Serialize,
        session: Option<&McpSession>,
    ) -> Result<reqwest::Response, ToolError> {
        let response = self.send(body, session).await?;
        self.check_status(response).await
    }

    async fn open_session(&self) -> Result<McpSession, ToolError> {
        let request = JsonRpcRequest::new(
            self.next_id(),
            "initialize",
            Some(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": "parley",
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),
        );

        let response = self.post(&request, None).await?;
        let session_id = header_str(response.headers(), SESSION_HEADER);
        let result = decode_response(response, &request.id).await?;

        let protocol_version = result
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION)
            .to_string();
        let session = McpSession {
            id: session_id,
            protocol_version,
        };

        self.post(&JsonRpcNotification::new("notifications/initialized"), Some(&session))
            .await?;

        debug!(
            server = %self.server,
            session = session.id.as_deref().unwrap_or("-"),
            "MCP session initialized"
        );
        Ok(session)
    }

    async fn session(&self) -> Result<McpSession, ToolError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }
        let session = self.open_session().await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    /// Send one request and return its `result`.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ToolError> {
        let session = self.session().await?;
        let request = JsonRpcRequest::new(self.next_id(), method, params);
        let response = self.send(&request, Some(&session)).await?;

        if response.status() == StatusCode::NOT_FOUND && session.id.is_some() {
            debug!(server = %self.server, "MCP session expired, discarding");
            *self.session.lock().await = None;
        }
        let response = self.check_status(response).await?;
        decode_response(response, &request.id).await
    }
}

#[async_trait]
impl ToolTransport for McpHttpTransport {
    fn server(&self) -> &str {
        &self.server
    }

    async fn list_tools(&self) -> Result<Vec<RemoteTool>, ToolError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = self.request("tools/list", params).await?;

            let page: Vec<RemoteTool> =
                serde_json::from_value(result.get("tools").cloned().unwrap_or(json!([])))
                    .map_err(|e| ToolError::malformed(format!("invalid tools/list result: {}", e)))?;
            tools.extend(page);

            match result.get("nextCursor").and_then(Value::as_str) {
                Some(next) if !next.is_empty() => cursor = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(tools)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput, ToolError> {
        let result = self
            .request(
                "tools/call",
                Some(json!({ "name": name, "arguments": arguments })),
            )
            .await?;

        serde_json::from_value(result)
            .map_err(|e| ToolError::malformed(format!("invalid tools/call result: {}", e)))
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn classify_reqwest_error(err: reqwest::Error) -> ToolError {
    if err.is_timeout() {
        ToolError::new(super::ToolErrorKind::Timeout, err.to_string())
    } else if err.is_decode() {
        ToolError::malformed(err.to_string())
    } else {
        ToolError::unreachable(err.to_string())
    }
}

async fn decode_response(response: reqwest::Response, id: &JsonRpcId) -> Result<Value, ToolError> {
    let is_stream = header_str(response.headers(), CONTENT_TYPE.as_str())
        .map(|ct| ct.starts_with("text/event-stream"))
        .unwrap_or(false);
    let body = response.text().await.map_err(classify_reqwest_error)?;

    let rpc = if is_stream {
        parse_event_stream(&body, id)?
    } else {
        serde_json::from_str::<JsonRpcResponse>(&body)
            .map_err(|e| ToolError::malformed(format!("invalid JSON-RPC body: {}", e)))?
    };
    into_result(rpc)
}

fn into_result(rpc: JsonRpcResponse) -> Result<Value, ToolError> {
    if let Some(err) = rpc.error {
        return Err(ToolError::malformed(format!(
            "JSON-RPC error {}: {}",
            err.code, err.message
        )));
    }
    Ok(rpc.result.unwrap_or(Value::Null))
}

/// Find the response to `id` among the events of an SSE body.
pub(crate) fn parse_event_stream(body: &str, id: &JsonRpcId) -> Result<JsonRpcResponse, ToolError> {
    let normalized = body.replace("\r\n", "\n");
    for event in normalized.split("\n\n") {
        let data: Vec<&str> = event
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|d| d.strip_prefix(' ').unwrap_or(d))
            .collect();
        if data.is_empty() {
            continue;
        }

        match serde_json::from_str::<JsonRpcResponse>(&data.join("\n")) {
            Ok(rpc) if rpc.id.as_ref() == Some(id) => return Ok(rpc),
            Ok(_) => continue,
            Err(e) => warn!(error = %e, "skipping unparsable MCP event"),
        }
    }

    Err(ToolError::malformed("event stream ended without a response"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_jsonrpc() {
        let request = JsonRpcRequest::new(JsonRpcId::Number(7), "tools/list", None);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 7);
        assert!(value.get("params").is_none());
    }

    #[test]
    fn test_event_stream_picks_matching_id() {
        let body = "event: message\r\n\
                    data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\r\n\r\n\
                    event: message\r\n\
                    data: {\"jsonrpc\":\"2.0\",\"id\":3,\"result\":{\"ok\":true}}\r\n\r\n";

        let rpc = parse_event_stream(body, &JsonRpcId::Number(3)).unwrap();
        assert_eq!(into_result(rpc).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn test_event_stream_without_response_is_malformed() {
        let err = parse_event_stream("data: not json\n\n", &JsonRpcId::Number(1)).unwrap_err();
        assert_eq!(err.kind, super::super::ToolErrorKind::MalformedResponse);
    }

    #[test]
    fn test_jsonrpc_error_is_malformed_response() {
        let rpc: JsonRpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32602, "message": "Unknown tool: nope"}
        }))
        .unwrap();
        let err = into_result(rpc).unwrap_err();
        assert_eq!(err.kind, super::super::ToolErrorKind::MalformedResponse);
        assert!(err.message.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = McpHttpTransport::new("med_tools", format!("http://{}/mcp", addr));
        let err = transport.list_tools().await.unwrap_err();
        assert_eq!(err.kind, super::super::ToolErrorKind::Unreachable);
    }
}
