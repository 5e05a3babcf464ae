use thiserror::Error;

/// Main error type for the agent system
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Missing required environment variable: {0}")]
    MissingConfiguration(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("Tool discovery failed: {0}")]
    Discovery(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invocation of tool '{tool}' failed: {reason}")]
    Invocation { tool: String, reason: String },

    #[error("Step limit of {0} exceeded")]
    StepLimitExceeded(usize),

    #[error("Model API error: {0}")]
    Model(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid tool call: {0}")]
    InvalidToolCall(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Authentication error: {0}")]
    Auth(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Check if this error ends the run. Non-fatal errors are fed back to
    /// the model as error observations so it can correct itself.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AgentError::Validation(_)
                | AgentError::InvalidToolCall(_)
                | AgentError::Serialization(_)
        )
    }

    /// Get the error code for structured responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AgentError::MissingConfiguration(_) => "MISSING_CONFIGURATION",
            AgentError::Configuration(_) => "INVALID_CONFIGURATION",
            AgentError::Connection { .. } => "CONNECTION_ERROR",
            AgentError::Discovery(_) => "DISCOVERY_ERROR",
            AgentError::UnknownTool(_) => "UNKNOWN_TOOL",
            AgentError::Invocation { .. } => "INVOCATION_ERROR",
            AgentError::StepLimitExceeded(_) => "STEP_LIMIT_EXCEEDED",
            AgentError::Model(_) => "MODEL_ERROR",
            AgentError::Serialization(_) => "SERIALIZATION_ERROR",
            AgentError::Validation(_) => "VALIDATION_ERROR",
            AgentError::InvalidToolCall(_) => "INVALID_TOOL_CALL",
            AgentError::Timeout(_) => "TIMEOUT_ERROR",
            AgentError::Auth(_) => "AUTH_ERROR",
        }
    }

    /// Convert to a structured error payload
    pub fn to_error_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
                "fatal": self.is_fatal()
            }
        })
    }
}
