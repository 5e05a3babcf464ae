//! The tool bridge: one connected MCP session plus the tool catalog
//! discovered over it.

use std::collections::HashMap;
use std::time::Duration;

use jsonschema::{Draft, JSONSchema};
use reqwest::header::HeaderMap;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::protocol::{
    methods, CallToolParams, CallToolResult, Implementation, ListToolsResult, Tool,
};
use super::transport::{HttpTransport, McpTransport, TransportError, DEFAULT_REQUEST_TIMEOUT};
use crate::error::{AgentError, Result};

const MAX_SCHEMA_ERRORS: usize = 3;

/// What to do when the server advertises zero tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyCatalogPolicy {
    /// Treat an empty catalog as a discovery failure. An agent with no
    /// tools is almost always pointed at the wrong endpoint.
    #[default]
    Reject,
    /// Accept an empty catalog; the model runs without tools.
    Allow,
}

/// The discovered tool set, in server order, indexed by name.
#[derive(Debug, Default)]
pub struct Catalog {
    tools: Vec<Tool>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    fn build(tools: Vec<Tool>, policy: EmptyCatalogPolicy) -> Result<Self> {
        if tools.is_empty() && policy == EmptyCatalogPolicy::Reject {
            return Err(AgentError::Discovery(
                "server advertised an empty tool catalog".to_string(),
            ));
        }
        let mut by_name = HashMap::with_capacity(tools.len());
        for (index, tool) in tools.iter().enumerate() {
            if by_name.insert(tool.name.clone(), index).is_some() {
                return Err(AgentError::Discovery(format!(
                    "duplicate tool name '{}' in catalog",
                    tool.name
                )));
            }
        }
        Ok(Self { tools, by_name })
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.by_name.get(name).map(|&index| &self.tools[index])
    }

    /// Tools in the order the server advertised them.
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The catalog in the chat-completions `tools` array shape.
    pub fn to_model_tools(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description.clone().unwrap_or_default(),
                        "parameters": normalized_schema(&tool.input_schema),
                    }
                })
            })
            .collect()
    }
}

/// A connected MCP session and its catalog.
///
/// `connect` performs exactly one handshake attempt; any failure is a
/// terminal [`AgentError::Connection`]. Likewise nothing here retries a
/// failed call.
#[derive(Debug)]
pub struct ToolBridge {
    transport: Box<dyn McpTransport>,
    catalog: Catalog,
    server_info: Option<Implementation>,
    protocol_version: String,
}

impl ToolBridge {
    /// Connect with default headers and timeout.
    pub async fn connect(endpoint: &str) -> Result<Self> {
        Self::connect_with(endpoint, HeaderMap::new(), DEFAULT_REQUEST_TIMEOUT).await
    }

    /// Connect with provider credentials and an explicit per-call timeout.
    pub async fn connect_with(
        endpoint: &str,
        headers: HeaderMap,
        timeout: Duration,
    ) -> Result<Self> {
        let transport = HttpTransport::new(endpoint, headers, timeout)
            .map_err(|e| connection_error(endpoint, e))?;
        Self::over_transport(Box::new(transport)).await
    }

    /// Handshake over an already-built transport.
    pub async fn over_transport(transport: Box<dyn McpTransport>) -> Result<Self> {
        let response = transport
            .initialize()
            .await
            .map_err(|e| connection_error(transport.endpoint(), e))?;
        info!(
            "connected to {} (protocol {})",
            transport.endpoint(),
            response.protocol_version
        );
        Ok(Self {
            transport,
            catalog: Catalog::default(),
            server_info: response.server_info,
            protocol_version: response.protocol_version,
        })
    }

    /// Fetch the server's full tool catalog, following pagination cursors.
    ///
    /// The result is finite and held in memory; a malformed page, a
    /// duplicate tool name, or (under [`EmptyCatalogPolicy::Reject`]) an
    /// empty catalog fails with [`AgentError::Discovery`].
    pub async fn discover_tools(&mut self, policy: EmptyCatalogPolicy) -> Result<&[Tool]> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.take().map(|c| json!({ "cursor": c }));
            let result = self
                .transport
                .request(methods::TOOLS_LIST, params)
                .await
                .map_err(|e| AgentError::Discovery(e.to_string()))?;
            let page: ListToolsResult = serde_path_to_error::deserialize(result).map_err(|e| {
                AgentError::Discovery(format!(
                    "malformed tool catalog at {}: {}",
                    e.path(),
                    e.inner()
                ))
            })?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        self.catalog = Catalog::build(tools, policy)?;
        info!(
            "discovered {} tool(s) from {}: [{}]",
            self.catalog.len(),
            self.transport.endpoint(),
            self.catalog.names().join(", ")
        );
        Ok(self.catalog.tools())
    }

    /// Invoke one catalog tool by name.
    ///
    /// Arguments are validated against the tool's input schema before
    /// anything is sent; validation failures are non-fatal so the model can
    /// correct its call. A name missing from the catalog never reaches the
    /// server. Invocation may mutate remote CRM data; nothing here retries.
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let tool = self
            .catalog
            .get(name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))?;
        let arguments = validate_arguments(tool, arguments)?;
        if tool.is_destructive() {
            debug!("tool '{}' may mutate remote CRM data", name);
        } else if tool.is_idempotent() {
            debug!("tool '{}' is marked idempotent", name);
        }

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result = self
            .transport
            .request(methods::TOOLS_CALL, Some(serde_json::to_value(&params)?))
            .await
            .map_err(|e| invocation_error(name, e))?;
        serde_path_to_error::deserialize(result).map_err(|e| AgentError::Invocation {
            tool: name.to_string(),
            reason: format!("malformed tool result at {}: {}", e.path(), e.inner()),
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    pub fn server_info(&self) -> Option<&Implementation> {
        self.server_info.as_ref()
    }

    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    pub fn to_model_tools(&self) -> Vec<Value> {
        self.catalog.to_model_tools()
    }
}

fn connection_error(endpoint: &str, e: TransportError) -> AgentError {
    AgentError::Connection {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    }
}

fn invocation_error(tool: &str, e: TransportError) -> AgentError {
    AgentError::Invocation {
        tool: tool.to_string(),
        reason: e.to_string(),
    }
}

/// Treat a non-object schema (some servers send `null`) as accept-anything.
fn normalized_schema(schema: &Value) -> Value {
    if schema.is_object() {
        schema.clone()
    } else {
        json!({"type": "object", "properties": {}})
    }
}

/// Check `arguments` against the tool's input schema, reporting at most
/// [`MAX_SCHEMA_ERRORS`] violations.
fn validate_arguments(tool: &Tool, arguments: Value) -> Result<Option<Map<String, Value>>> {
    let arguments = match arguments {
        Value::Null => None,
        Value::Object(map) => Some(map),
        other => {
            return Err(AgentError::Validation(format!(
                "arguments for tool '{}' must be a JSON object, got {}",
                tool.name,
                json_type_name(&other)
            )))
        }
    };
    if !tool.input_schema.is_object() {
        return Ok(arguments);
    }

    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&tool.input_schema)
        .map_err(|e| {
            AgentError::Validation(format!(
                "tool '{}' has an uncompilable input schema: {}",
                tool.name, e
            ))
        })?;
    let instance = arguments
        .clone()
        .map(Value::Object)
        .unwrap_or_else(|| json!({}));
    if let Err(errors) = compiled.validate(&instance) {
        let mut details = Vec::new();
        let mut truncated = false;
        for (index, error) in errors.enumerate() {
            if index >= MAX_SCHEMA_ERRORS {
                truncated = true;
                break;
            }
            let path = error.instance_path.to_string();
            let location = if path.is_empty() {
                "<root>".to_string()
            } else {
                path
            };
            details.push(format!("{} at {}", error, location));
        }
        let mut message = details.join("; ");
        if truncated {
            message.push_str("; additional errors truncated");
        }
        return Err(AgentError::Validation(format!(
            "arguments for tool '{}' failed schema validation: {}",
            tool.name, message
        )));
    }
    Ok(arguments)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::InitializeResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn tool_json(name: &str) -> Value {
        json!({
            "name": name,
            "description": format!("The {} tool", name),
            "inputSchema": {
                "type": "object",
                "properties": {
                    "last_name": {"type": "string"},
                    "email": {"type": "string"}
                },
                "required": ["last_name"]
            }
        })
    }

    /// Scripted in-process transport: serves fixed tools/list pages and a
    /// fixed tools/call result, recording every method it sees.
    #[derive(Debug)]
    struct ScriptedTransport {
        calls: Mutex<Vec<String>>,
        list_pages: Vec<Value>,
        list_served: AtomicUsize,
        call_result: Value,
    }

    impl ScriptedTransport {
        fn new(list_pages: Vec<Value>, call_result: Value) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                list_pages,
                list_served: AtomicUsize::new(0),
                call_result,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl McpTransport for ScriptedTransport {
        async fn initialize(&self) -> std::result::Result<InitializeResponse, TransportError> {
            let response = json!({
                "protocolVersion": "2025-06-18",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "scripted", "version": "0.0.1"}
            });
            Ok(serde_json::from_value(response).unwrap())
        }

        async fn request(
            &self,
            method: &str,
            _params: Option<Value>,
        ) -> std::result::Result<Value, TransportError> {
            self.calls.lock().unwrap().push(method.to_string());
            match method {
                methods::TOOLS_LIST => {
                    let index = self.list_served.fetch_add(1, Ordering::SeqCst);
                    Ok(self.list_pages[index].clone())
                }
                methods::TOOLS_CALL => Ok(self.call_result.clone()),
                other => Err(TransportError::InvalidResponse(format!(
                    "unexpected method {}",
                    other
                ))),
            }
        }

        async fn notify(
            &self,
            _method: &str,
            _params: Option<Value>,
        ) -> std::result::Result<(), TransportError> {
            Ok(())
        }

        fn endpoint(&self) -> &str {
            "http://scripted.test/mcp"
        }
    }

    #[async_trait]
    impl<T: McpTransport> McpTransport for std::sync::Arc<T> {
        async fn initialize(&self) -> std::result::Result<InitializeResponse, TransportError> {
            (**self).initialize().await
        }
        async fn request(
            &self,
            method: &str,
            params: Option<Value>,
        ) -> std::result::Result<Value, TransportError> {
            (**self).request(method, params).await
        }
        async fn notify(
            &self,
            method: &str,
            params: Option<Value>,
        ) -> std::result::Result<(), TransportError> {
            (**self).notify(method, params).await
        }
        fn endpoint(&self) -> &str {
            (**self).endpoint()
        }
    }

    async fn scripted_bridge(
        transport: ScriptedTransport,
    ) -> (ToolBridge, std::sync::Arc<ScriptedTransport>) {
        let transport = std::sync::Arc::new(transport);
        let bridge = ToolBridge::over_transport(Box::new(transport.clone()))
            .await
            .unwrap();
        (bridge, transport)
    }

    #[test]
    fn test_catalog_rejects_duplicate_names() {
        let tools: Vec<Tool> = vec![
            serde_json::from_value(tool_json("create_lead")).unwrap(),
            serde_json::from_value(tool_json("create_lead")).unwrap(),
        ];
        let err = Catalog::build(tools, EmptyCatalogPolicy::Reject).unwrap_err();
        assert_eq!(err.error_code(), "DISCOVERY_ERROR");
        assert!(err.to_string().contains("duplicate tool name 'create_lead'"));
    }

    #[test]
    fn test_empty_catalog_policy() {
        let err = Catalog::build(Vec::new(), EmptyCatalogPolicy::Reject).unwrap_err();
        assert_eq!(err.error_code(), "DISCOVERY_ERROR");

        let catalog = Catalog::build(Vec::new(), EmptyCatalogPolicy::Allow).unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.to_model_tools().is_empty());
    }

    #[test]
    fn test_catalog_preserves_server_order() {
        let tools: Vec<Tool> = vec![
            serde_json::from_value(tool_json("zeta")).unwrap(),
            serde_json::from_value(tool_json("alpha")).unwrap(),
        ];
        let catalog = Catalog::build(tools, EmptyCatalogPolicy::Reject).unwrap();
        assert_eq!(catalog.names(), vec!["zeta", "alpha"]);
        assert!(catalog.get("alpha").is_some());
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn test_model_tools_shape() {
        let tools: Vec<Tool> = vec![serde_json::from_value(tool_json("create_lead")).unwrap()];
        let catalog = Catalog::build(tools, EmptyCatalogPolicy::Reject).unwrap();
        let model_tools = catalog.to_model_tools();
        assert_eq!(model_tools.len(), 1);
        assert_eq!(model_tools[0]["type"], "function");
        assert_eq!(model_tools[0]["function"]["name"], "create_lead");
        assert_eq!(
            model_tools[0]["function"]["parameters"]["required"],
            json!(["last_name"])
        );
    }

    #[test]
    fn test_null_schema_normalizes_to_open_object() {
        let tool: Tool = serde_json::from_value(json!({
            "name": "anything",
            "inputSchema": null
        }))
        .unwrap();
        let catalog = Catalog::build(vec![tool], EmptyCatalogPolicy::Reject).unwrap();
        let model_tools = catalog.to_model_tools();
        assert_eq!(
            model_tools[0]["function"]["parameters"],
            json!({"type": "object", "properties": {}})
        );
    }

    #[test]
    fn test_validate_arguments_rejects_missing_required() {
        let tool: Tool = serde_json::from_value(tool_json("create_lead")).unwrap();
        let err = validate_arguments(&tool, json!({"email": "x@example.com"})).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("create_lead"));
    }

    #[test]
    fn test_validate_arguments_rejects_non_object() {
        let tool: Tool = serde_json::from_value(tool_json("create_lead")).unwrap();
        let err = validate_arguments(&tool, json!("just a string")).unwrap_err();
        assert!(err.to_string().contains("must be a JSON object"));
    }

    #[test]
    fn test_validate_arguments_accepts_valid() {
        let tool: Tool = serde_json::from_value(tool_json("create_lead")).unwrap();
        let args = validate_arguments(
            &tool,
            json!({"last_name": "Connor", "email": "sarah.c@example.com"}),
        )
        .unwrap();
        assert_eq!(args.unwrap()["last_name"], json!("Connor"));
    }

    #[tokio::test]
    async fn test_discovery_follows_cursors() {
        let pages = vec![
            json!({"tools": [tool_json("create_lead")], "nextCursor": "page-2"}),
            json!({"tools": [tool_json("search_contacts")]}),
        ];
        let transport = ScriptedTransport::new(pages, json!({"content": []}));
        let (mut bridge, recorder) = scripted_bridge(transport).await;

        let tools = bridge
            .discover_tools(EmptyCatalogPolicy::Reject)
            .await
            .unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(
            recorder
                .calls()
                .iter()
                .filter(|m| *m == methods::TOOLS_LIST)
                .count(),
            2
        );
        assert_eq!(bridge.catalog().names(), vec!["create_lead", "search_contacts"]);
    }

    #[tokio::test]
    async fn test_duplicate_names_across_pages_fail_discovery() {
        let pages = vec![
            json!({"tools": [tool_json("create_lead")], "nextCursor": "page-2"}),
            json!({"tools": [tool_json("create_lead")]}),
        ];
        let transport = ScriptedTransport::new(pages, json!({"content": []}));
        let (mut bridge, _) = scripted_bridge(transport).await;

        let err = bridge
            .discover_tools(EmptyCatalogPolicy::Reject)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "DISCOVERY_ERROR");
    }

    #[tokio::test]
    async fn test_unknown_tool_never_reaches_server() {
        let pages = vec![json!({"tools": [tool_json("create_lead")]})];
        let transport = ScriptedTransport::new(pages, json!({"content": []}));
        let (mut bridge, recorder) = scripted_bridge(transport).await;
        bridge
            .discover_tools(EmptyCatalogPolicy::Reject)
            .await
            .unwrap();

        let err = bridge
            .invoke("delete_lead", json!({"id": 1}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_TOOL");
        assert!(err.is_fatal());
        assert!(!recorder.calls().contains(&methods::TOOLS_CALL.to_string()));
    }

    #[tokio::test]
    async fn test_invalid_arguments_never_reach_server() {
        let pages = vec![json!({"tools": [tool_json("create_lead")]})];
        let transport = ScriptedTransport::new(pages, json!({"content": []}));
        let (mut bridge, recorder) = scripted_bridge(transport).await;
        bridge
            .discover_tools(EmptyCatalogPolicy::Reject)
            .await
            .unwrap();

        let err = bridge
            .invoke("create_lead", json!({"last_name": 42}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(!recorder.calls().contains(&methods::TOOLS_CALL.to_string()));
    }

    #[tokio::test]
    async fn test_invoke_returns_in_band_errors_as_results() {
        let pages = vec![json!({"tools": [tool_json("create_lead")]})];
        let failure = json!({
            "content": [{"type": "text", "text": "lead already exists"}],
            "isError": true
        });
        let transport = ScriptedTransport::new(pages, failure);
        let (mut bridge, _) = scripted_bridge(transport).await;
        bridge
            .discover_tools(EmptyCatalogPolicy::Reject)
            .await
            .unwrap();

        let result = bridge
            .invoke("create_lead", json!({"last_name": "Connor"}))
            .await
            .unwrap();
        assert!(result.errored());
        assert_eq!(result.text(), "lead already exists");
    }
}
