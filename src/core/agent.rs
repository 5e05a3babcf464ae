use crate::{
    config::{AgentConfig, DEFAULT_MAX_STEPS, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS},
    error::Result,
    mcp::ToolBridge,
    services::model_client::ModelClient,
};
use serde_json::Value;
use std::time::Duration;

/// Main agent
#[derive(Debug)]
pub struct Agent {
    model_client: ModelClient,
    bridge: ToolBridge,
    model: String,
    max_steps: usize,
    max_tokens: Option<u32>,
    timeout: Duration,
}

impl Agent {
    /// Build an agent over an already-connected bridge.
    pub fn new(api_key: String, bridge: ToolBridge) -> Self {
        Self {
            model_client: ModelClient::new(api_key),
            bridge,
            model: DEFAULT_MODEL.to_string(),
            max_steps: DEFAULT_MAX_STEPS,
            max_tokens: Some(1000),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Wire an agent from loaded configuration and a connected bridge.
    pub fn from_config(config: &AgentConfig, bridge: ToolBridge) -> Self {
        Self::new(config.api_key.clone(), bridge)
            .with_model(config.model.clone())
            .with_base_url(config.model_base_url.clone())
            .with_max_steps(config.max_steps)
            .with_timeout(config.request_timeout)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.model_client.set_base_url(base_url);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub(crate) fn bridge(&self) -> &ToolBridge {
        &self.bridge
    }

    pub(crate) fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) async fn make_raw_request(&self, request_body: &Value) -> Result<Value> {
        self.model_client
            .chat_completion(request_body, self.timeout)
            .await
    }
}
