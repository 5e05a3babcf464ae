use std::time::Duration;

use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use tracing::{error, info};

use crate::config::AgentConfig;
use crate::core::Agent;
use crate::crm::{CrmProvider, ZohoTokenManager};
use crate::mcp::{ToolBridge, DEFAULT_REQUEST_TIMEOUT};

/// Prompt used when none is given on the command line.
const DEMO_PROMPT: &str = "Create a new lead in Zoho CRM for Sarah Connor with email \
     sarah.c@example.com and company T-800 Corp. Confirm once the lead is recorded.";

/// CLI entry point for the crm-agent tool.
pub async fn run() -> anyhow::Result<()> {
    // Load environment variables from a .env file when present
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let matches = Command::new("crm-agent")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Drives an LLM tool-calling loop against a remote CRM tool server")
        .arg(
            Arg::new("prompt")
                .help("The task to hand to the agent (defaults to a demo lead-creation task)")
                .index(1),
        )
        .arg(
            Arg::new("crm")
                .long("crm")
                .value_name("PROVIDER")
                .help("CRM provider: zoho, hubspot, or salesforce (overrides ACTIVE_CRM)"),
        )
        .arg(
            Arg::new("model")
                .short('m')
                .long("model")
                .value_name("MODEL")
                .help("Chat model to use (overrides CRM_AGENT_MODEL)"),
        )
        .arg(
            Arg::new("max-steps")
                .short('i')
                .long("max-steps")
                .value_name("COUNT")
                .help("Maximum model rounds per run (overrides CRM_AGENT_MAX_STEPS)"),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_name("SECONDS")
                .help("Per-model-round timeout in seconds (overrides CRM_AGENT_TIMEOUT_SECS)"),
        )
        .arg(
            Arg::new("list-tools")
                .long("list-tools")
                .action(ArgAction::SetTrue)
                .help("Connect, print the discovered tool catalog, and exit"),
        )
        .arg(
            Arg::new("zoho-auth-url")
                .long("zoho-auth-url")
                .action(ArgAction::SetTrue)
                .help("Print the Zoho OAuth consent URL and exit"),
        )
        .arg(
            Arg::new("zoho-exchange-code")
                .long("zoho-exchange-code")
                .value_name("CODE")
                .help("Exchange a Zoho OAuth grant code for tokens and exit"),
        )
        .get_matches();

    // The OAuth bootstrap flags work without the rest of the configuration.
    if matches.get_flag("zoho-auth-url") {
        let manager = zoho_manager()?;
        println!("{}", manager.authorization_url()?);
        return Ok(());
    }
    if let Some(code) = matches.get_one::<String>("zoho-exchange-code") {
        let manager = zoho_manager()?;
        let tokens = manager.exchange_code(code).await?;
        println!(
            "Zoho tokens stored; access token valid until epoch {}.",
            tokens.expires_at
        );
        return Ok(());
    }

    let mut config = match matches.get_one::<String>("crm") {
        Some(raw) => AgentConfig::from_env_for(raw.parse::<CrmProvider>()?)?,
        None => AgentConfig::from_env()?,
    };
    if let Some(model) = matches.get_one::<String>("model") {
        config.model = model.clone();
    }
    if let Some(raw) = matches.get_one::<String>("max-steps") {
        config.max_steps = raw
            .parse()
            .context("--max-steps must be a positive integer")?;
    }
    if let Some(raw) = matches.get_one::<String>("timeout") {
        let secs: u64 = raw.parse().context("--timeout must be a number of seconds")?;
        config.request_timeout = Duration::from_secs(secs);
    }

    info!(
        "targeting {} at {}",
        config.provider.server_name(),
        config.endpoint
    );
    let headers = config.provider.auth_headers().await;
    let mut bridge =
        ToolBridge::connect_with(&config.endpoint, headers, DEFAULT_REQUEST_TIMEOUT).await?;
    bridge.discover_tools(config.empty_catalog_policy).await?;

    if matches.get_flag("list-tools") {
        println!(
            "{} advertises {} tool(s):",
            bridge.endpoint(),
            bridge.catalog().len()
        );
        for tool in bridge.catalog().tools() {
            match &tool.description {
                Some(description) => println!("  {} - {}", tool.name, description),
                None => println!("  {}", tool.name),
            }
        }
        return Ok(());
    }

    let prompt = matches
        .get_one::<String>("prompt")
        .cloned()
        .unwrap_or_else(|| DEMO_PROMPT.to_string());

    info!("running agent with model {} on: {}", config.model, prompt);
    let agent = Agent::from_config(&config, bridge);

    match agent.run(&prompt).await {
        Ok(result) => {
            println!("\nAgent Response:\n{}", result.output);
            info!(
                "agent run completed in {} step(s) with {} tool call(s)",
                result.steps_used,
                result.action_count()
            );
            Ok(())
        }
        Err(e) => {
            error!("agent run failed: {}", e);
            Err(e.into())
        }
    }
}

fn zoho_manager() -> anyhow::Result<ZohoTokenManager> {
    ZohoTokenManager::from_env()
        .context("Zoho OAuth is not configured; set ZOHO_CLIENT_ID and ZOHO_CLIENT_SECRET")
}
