//! Leadbridge MCP Server Binary
//!
//! Entry point for running the CRM tool gateway over stdio.
//!
//! ## Usage
//!
//! ```bash
//! # Run with config file discovery (leadbridge.toml)
//! LEADBRIDGE_CRM_API_KEY=fub-key leadbridge-mcp
//!
//! # Run with agent key authentication
//! LEADBRIDGE_MCP_AGENT_KEYS='[{"key":"key1","name":"Agent1","requests_per_minute":60}]' \
//!   LEADBRIDGE_AGENT_KEY=key1 leadbridge-mcp
//! ```

use std::sync::Arc;

use anyhow::Result;
use leadbridge_core::{AppConfig, LoadOptions};
use leadbridge_crm::CrmClient;
use leadbridge_mcp::{AuthManager, LeadbridgeMcpServer};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;

    // stdout carries the MCP protocol; logs must go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("starting Leadbridge MCP server");

    let crm = Arc::new(CrmClient::new(&config.crm)?);

    let server = if config.mcp.auth_enabled {
        info!(keys = config.mcp.agent_keys.len(), "agent key authentication enabled");
        let auth = AuthManager::from_config(&config.mcp);
        let agent_key = std::env::var("LEADBRIDGE_AGENT_KEY").ok();
        LeadbridgeMcpServer::with_auth(crm, auth, agent_key)
    } else {
        info!("running without agent authentication");
        LeadbridgeMcpServer::new(crm)
    };

    server.run_stdio().await?;

    Ok(())
}
