use std::time::Duration;

use crate::crm::CrmProvider;
use crate::error::{AgentError, Result};
use crate::mcp::EmptyCatalogPolicy;

/// Default chat model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
/// Default OpenAI-compatible endpoint for the model provider.
pub const DEFAULT_MODEL_BASE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai";
/// Default reasoning-loop step limit.
pub const DEFAULT_MAX_STEPS: usize = 10;
/// Default per-model-round timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Runtime configuration, loaded once at startup.
///
/// Everything comes from the process environment; loading performs no
/// network activity. A missing required variable fails with
/// [`AgentError::MissingConfiguration`] naming that variable.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Which CRM provider profile is active.
    pub provider: CrmProvider,
    /// Tool-server endpoint URL for the active provider.
    pub endpoint: String,
    /// Model API key.
    pub api_key: String,
    /// Chat model name.
    pub model: String,
    /// Chat-completions base URL.
    pub model_base_url: String,
    /// Maximum number of model rounds per run.
    pub max_steps: usize,
    /// Timeout applied to each model round.
    pub request_timeout: Duration,
    /// What to do when the server advertises zero tools.
    pub empty_catalog_policy: EmptyCatalogPolicy,
}

impl AgentConfig {
    /// Load configuration from the environment.
    ///
    /// Reads `ACTIVE_CRM` to pick the provider, then requires that
    /// provider's endpoint variable and `GOOGLE_API_KEY`. Optional knobs
    /// fall back to defaults; an unparseable optional value is a
    /// configuration error rather than a silent default.
    pub fn from_env() -> Result<Self> {
        let provider = match optional_var("ACTIVE_CRM") {
            Some(raw) => raw.parse::<CrmProvider>()?,
            None => CrmProvider::default(),
        };
        Self::from_env_for(provider)
    }

    /// Load configuration for an explicitly chosen provider, ignoring
    /// `ACTIVE_CRM`.
    pub fn from_env_for(provider: CrmProvider) -> Result<Self> {
        let endpoint = required_var(provider.endpoint_var())?;
        let api_key = required_var("GOOGLE_API_KEY")?;

        let model = optional_var("CRM_AGENT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let model_base_url = optional_var("CRM_AGENT_MODEL_BASE_URL")
            .unwrap_or_else(|| DEFAULT_MODEL_BASE_URL.to_string());
        let max_steps = parsed_var("CRM_AGENT_MAX_STEPS", DEFAULT_MAX_STEPS)?;
        let timeout_secs = parsed_var("CRM_AGENT_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        let empty_catalog_policy = if bool_var("CRM_AGENT_ALLOW_EMPTY_CATALOG", false)? {
            EmptyCatalogPolicy::Allow
        } else {
            EmptyCatalogPolicy::Reject
        };

        Ok(Self {
            provider,
            endpoint,
            api_key,
            model,
            model_base_url,
            max_steps,
            request_timeout: Duration::from_secs(timeout_secs),
            empty_catalog_policy,
        })
    }

    /// Build a configuration directly, with defaults for the optional knobs.
    pub fn new(
        provider: CrmProvider,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            model_base_url: DEFAULT_MODEL_BASE_URL.to_string(),
            max_steps: DEFAULT_MAX_STEPS,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            empty_catalog_policy: EmptyCatalogPolicy::Reject,
        }
    }
}

/// Read an environment variable, treating empty or whitespace-only values
/// as absent.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required_var(name: &str) -> Result<String> {
    optional_var(name).ok_or_else(|| AgentError::MissingConfiguration(name.to_string()))
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(name) {
        Some(raw) => raw.parse().map_err(|e| {
            AgentError::Configuration(format!("invalid value for {}: {}", name, e))
        }),
        None => Ok(default),
    }
}

fn bool_var(name: &str, default: bool) -> Result<bool> {
    match optional_var(name) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => Err(AgentError::Configuration(format!(
                "invalid value for {}: expected a boolean, got '{}'",
                name, other
            ))),
        },
        None => Ok(default),
    }
}
