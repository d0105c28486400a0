//! Shared foundation for the leadbridge adapter.
//!
//! Holds the configuration loader and the error taxonomy used by both
//! entry points (the MCP tool gateway and the webhook receiver). There is
//! deliberately no domain model here: the CRM is the system of record and
//! every entity is passed through as JSON.

pub mod config;
pub mod errors;

pub use config::{
    AgentKeyConfig, AppConfig, ConfigError, ConfigOverrides, CrmConfig, LoadOptions, LogFormat,
    LoggingConfig, McpConfig, WebhookConfig,
};
pub use errors::AdapterError;
