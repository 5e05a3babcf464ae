//! Streamable-HTTP transport for MCP servers.
//!
//! Every JSON-RPC exchange is an HTTP POST to the endpoint. Servers may
//! answer with a plain JSON body or with an SSE stream of `data:` frames;
//! both are accepted. Session and protocol-version headers returned by the
//! server are captured and replayed on subsequent requests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT};
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::protocol::{
    methods, ClientCapabilities, Implementation, InitializeRequest, InitializeResponse,
    JsonRpcError, JsonRpcRequest, SUPPORTED_PROTOCOL_VERSIONS,
};

const CLIENT_NAME: &str = "crm-agent-rs";
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

const HEADER_PROTOCOL_VERSION: &str = "MCP-Protocol-Version";
const HEADER_SESSION_ID: &str = "Mcp-Session-Id";

const SSE_ACCEPT: &str = "application/json, text/event-stream";
const BODY_PREVIEW_CHARS: usize = 240;

/// Default timeout for one MCP round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Low-level transport failures. The bridge maps these into the public
/// error taxonomy.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{0}")]
    Rpc(JsonRpcError),
}

/// One MCP session. Implementations are single-shot: a failed call is
/// reported, never retried.
#[async_trait]
pub trait McpTransport: Send + Sync + std::fmt::Debug {
    /// Perform the MCP handshake and return the server's initialize result.
    async fn initialize(&self) -> Result<InitializeResponse, TransportError>;

    /// Send a request and return its JSON-RPC `result` payload.
    async fn request(&self, method: &str, params: Option<Value>)
        -> Result<Value, TransportError>;

    /// Send a notification; no response payload is expected.
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError>;

    /// The endpoint this transport talks to.
    fn endpoint(&self) -> &str;
}

/// MCP over streamable HTTP.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    extra_headers: HeaderMap,
    next_id: AtomicI64,
    protocol_version: Mutex<Option<String>>,
    session_id: Mutex<Option<String>>,
}

impl HttpTransport {
    /// Build a transport for `endpoint`. `extra_headers` carries
    /// provider-specific credentials (for example a Zoho bearer token).
    pub fn new(
        endpoint: &str,
        extra_headers: HeaderMap,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connect(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            extra_headers,
            next_id: AtomicI64::new(1),
            protocol_version: Mutex::new(None),
            session_id: Mutex::new(None),
        })
    }

    fn next_request_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn send(
        &self,
        request: &JsonRpcRequest,
        expect_response: bool,
    ) -> Result<Value, TransportError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, SSE_ACCEPT)
            .headers(self.extra_headers.clone());
        if let Some(version) = self.protocol_version.lock().await.as_deref() {
            builder = builder.header(HEADER_PROTOCOL_VERSION, version);
        }
        if let Some(session) = self.session_id.lock().await.as_deref() {
            builder = builder.header(HEADER_SESSION_ID, session);
        }

        let response = builder
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Connect(format!("POST {} failed: {}", self.endpoint, e)))?;

        self.capture_headers(response.headers()).await;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            // The server forgot our session; drop the stale id so a future
            // handshake starts clean.
            self.session_id.lock().await.take();
        }
        if !expect_response
            && (status == StatusCode::ACCEPTED || status == StatusCode::NO_CONTENT)
        {
            return Ok(Value::Null);
        }

        let body = response.text().await.map_err(|e| {
            TransportError::Connect(format!("failed to read response body: {}", e))
        })?;
        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                body: preview(&body),
            });
        }
        if body.trim().is_empty() {
            if expect_response {
                return Err(TransportError::InvalidResponse(format!(
                    "empty response body for method '{}'",
                    request.method
                )));
            }
            return Ok(Value::Null);
        }

        let envelope = parse_json_or_sse_response(&body)?;
        if let Some(error) = envelope.get("error") {
            let rpc: JsonRpcError = serde_json::from_value(error.clone()).map_err(|e| {
                TransportError::InvalidResponse(format!("malformed JSON-RPC error object: {}", e))
            })?;
            return Err(TransportError::Rpc(rpc));
        }
        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn capture_headers(&self, headers: &HeaderMap) {
        if let Some(session) = header_value(headers, HEADER_SESSION_ID) {
            *self.session_id.lock().await = Some(session);
        }
        if let Some(version) = header_value(headers, HEADER_PROTOCOL_VERSION) {
            *self.protocol_version.lock().await = Some(version);
        }
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn initialize(&self) -> Result<InitializeResponse, TransportError> {
        let preferred = SUPPORTED_PROTOCOL_VERSIONS[0];
        *self.protocol_version.lock().await = Some(preferred.to_string());

        let params = InitializeRequest {
            protocol_version: preferred.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation::new(CLIENT_NAME, CLIENT_VERSION),
        };
        let result = self
            .request(methods::INITIALIZE, Some(serde_json::to_value(&params)?))
            .await?;

        let response: InitializeResponse = serde_path_to_error::deserialize(result)
            .map_err(|e| {
                TransportError::InvalidResponse(format!(
                    "malformed initialize result at {}: {}",
                    e.path(),
                    e.inner()
                ))
            })?;
        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&response.protocol_version.as_str()) {
            return Err(TransportError::InvalidResponse(format!(
                "server negotiated unsupported protocol version '{}'",
                response.protocol_version
            )));
        }
        *self.protocol_version.lock().await = Some(response.protocol_version.clone());
        debug!(
            "initialized MCP session: protocol {}, server {}",
            response.protocol_version,
            response
                .server_info
                .as_ref()
                .map(|s| format!("{} {}", s.name, s.version))
                .unwrap_or_else(|| "<unnamed>".to_string())
        );

        // Some servers reject the follow-up notification; the session still
        // works, so log and move on.
        if let Err(e) = self.notify(methods::INITIALIZED, None).await {
            warn!("initialized notification rejected: {}", e);
        }
        Ok(response)
    }

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, TransportError> {
        let request = JsonRpcRequest::new(self.next_request_id(), method, params);
        self.send(&request, true).await
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        let request = JsonRpcRequest::notification(method, params);
        self.send(&request, false).await.map(|_| ())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Accept either a plain JSON body or SSE `data:` frames carrying JSON.
fn parse_json_or_sse_response(body: &str) -> Result<Value, TransportError> {
    if let Ok(value) = serde_json::from_str(body) {
        return Ok(value);
    }
    let data_lines: Vec<&str> = body
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|rest| !rest.is_empty())
        .collect();
    if data_lines.is_empty() {
        return Err(TransportError::InvalidResponse(
            "response body contains no JSON payload or SSE data lines".to_string(),
        ));
    }
    let joined = data_lines.join("\n");
    serde_json::from_str(&joined).map_err(|e| {
        TransportError::InvalidResponse(format!("SSE data is not valid JSON: {}", e))
    })
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn preview(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_PREVIEW_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(BODY_PREVIEW_CHARS).collect();
        format!("{}...", head)
    }
}
