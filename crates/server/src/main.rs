mod extract;
mod health;
mod signature;
mod webhook;

use std::sync::Arc;

use anyhow::Result;
use leadbridge_core::{AppConfig, LoadOptions};
use leadbridge_crm::CrmClient;

use crate::webhook::{AppState, CrmForwarder};

fn init_logging(config: &AppConfig) {
    use leadbridge_core::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let crm = Arc::new(CrmClient::new(&config.crm)?);
    let state = AppState {
        sink: Arc::new(CrmForwarder::new(crm)),
        shared_secret: config.webhook.shared_secret.clone(),
    };

    tracing::info!(
        event_name = "system.server.signature_mode",
        correlation_id = "bootstrap",
        verification = if state.shared_secret.is_some() { "enabled" } else { "disabled" },
        "webhook signature verification mode initialized"
    );

    let app = webhook::router(state).merge(health::router());
    let address = format!("{}:{}", config.webhook.bind_address, config.webhook.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "leadbridge-server started"
    );

    axum::serve(listener, app).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "leadbridge-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
