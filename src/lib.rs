//! crm-agent-rs: an LLM-driven agent for remote CRM tool servers
//!
//! This library wires a chat model's tool-calling loop to a remote MCP tool
//! server. The bridge connects once, discovers the server's tool catalog,
//! and dispatches the model's proposed calls with schema-checked arguments;
//! the runner walks an explicit state machine under a hard step limit, and
//! every failure is terminal rather than retried.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use crm_agent_rs::mcp::DEFAULT_REQUEST_TIMEOUT;
//! use crm_agent_rs::{Agent, AgentConfig, ToolBridge};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AgentConfig::from_env()?;
//!     let headers = config.provider.auth_headers().await;
//!     let mut bridge =
//!         ToolBridge::connect_with(&config.endpoint, headers, DEFAULT_REQUEST_TIMEOUT).await?;
//!     bridge.discover_tools(config.empty_catalog_policy).await?;
//!
//!     let agent = Agent::from_config(&config, bridge);
//!     let result = agent.run("Create a lead for Jane Doe at Acme Corp.").await?;
//!     println!("{}", result.output);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod crm;
pub mod error;
pub mod mcp;
pub(crate) mod services;
pub mod types;

pub use crate::config::AgentConfig;
pub use crate::core::{Agent, AgentMemory, AgentStep, LoopState, RunResult, TokenUsage};
pub use crate::crm::{CrmProvider, ZohoTokenManager};
pub use crate::error::{AgentError, Result};
pub use crate::mcp::{Catalog, EmptyCatalogPolicy, McpTransport, Tool, ToolBridge};

#[cfg(feature = "cli")]
pub mod cli;
