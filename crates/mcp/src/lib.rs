//! Leadbridge MCP (Model Context Protocol) Server
//!
//! This crate exposes the Follow Up Boss CRM to AI agents as a set of MCP
//! tools: contact CRUD, notes, tasks, call logging, and event-based lead
//! ingestion. Tools are thin adapters over [`leadbridge_crm::CrmClient`];
//! the CRM's JSON responses are returned to the agent unchanged so no
//! fidelity is lost between the API and the model.
//!
//! ## Architecture
//!
//! - `LeadbridgeMcpServer`: main server implementing the MCP protocol
//! - `auth`: agent key validation and sliding-window rate limiting
//! - `tools`: tool registry grouped by CRM entity

mod auth;
mod server;
mod tools;

pub use auth::{AgentKey, AuthDecision, AuthManager};
pub use server::LeadbridgeMcpServer;
pub use tools::*;

use leadbridge_core::AdapterError;
use serde_json::json;

/// Map an adapter error onto the JSON-RPC error space.
///
/// Caller mistakes (missing ids, empty bodies) become invalid-params so
/// the agent can correct its arguments; CRM-side failures become internal
/// errors carrying the upstream status and body as structured data. The
/// API key never appears in any of these messages.
pub fn rpc_error(err: AdapterError) -> rmcp::Error {
    match err {
        AdapterError::Validation(message) => rmcp::Error::invalid_params(message, None),
        AdapterError::Api { status, body } => rmcp::Error::internal_error(
            format!("crm request failed with status {status}"),
            Some(json!({"status": status, "body": body})),
        ),
        other => rmcp::Error::internal_error(other.user_message(), None),
    }
}

#[cfg(test)]
mod tests {
    use leadbridge_core::AdapterError;
    use serde_json::json;

    use super::rpc_error;

    #[test]
    fn validation_maps_to_invalid_params() {
        let err = rpc_error(AdapterError::validation("person id is required"));
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
        assert!(err.message.contains("person id is required"));
    }

    #[test]
    fn api_errors_carry_status_and_body_as_data() {
        let err = rpc_error(AdapterError::Api {
            status: 429,
            body: json!({"errorMessage": "rate limited"}),
        });
        assert_eq!(err.code, rmcp::model::ErrorCode::INTERNAL_ERROR);
        let data = err.data.expect("structured data");
        assert_eq!(data["status"], 429);
        assert_eq!(data["body"]["errorMessage"], "rate limited");
    }

    #[test]
    fn timeout_message_is_user_safe() {
        let err = rpc_error(AdapterError::Timeout { seconds: 30 });
        assert_eq!(err.code, rmcp::model::ErrorCode::INTERNAL_ERROR);
        assert!(err.message.contains("did not respond"));
        assert!(!err.message.to_lowercase().contains("key"));
    }
}
