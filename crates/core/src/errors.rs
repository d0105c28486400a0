use serde_json::Value;
use thiserror::Error;

/// Error taxonomy shared by the tool gateway and the webhook receiver.
///
/// Every variant is safe to render to a caller: no variant ever carries
/// the CRM API key or the webhook shared secret.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum AdapterError {
    /// Malformed or missing tool input, rejected before any CRM call.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The CRM answered with a non-success status. The status and the
    /// CRM's own error body are preserved; 429 passes through unmodified
    /// because retry policy is a caller concern.
    #[error("crm request failed with status {status}")]
    Api { status: u16, body: Value },
    /// The CRM did not respond within the bounded request timeout.
    #[error("crm did not respond within {seconds}s")]
    Timeout { seconds: u64 },
    /// Webhook signature mismatch. The request is rejected and nothing is
    /// forwarded downstream.
    #[error("webhook signature verification failed")]
    Signature,
    /// Connection-level failure (refused, DNS, TLS) before any HTTP
    /// status was produced.
    #[error("could not reach the crm: {0}")]
    Transport(String),
}

impl AdapterError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True when the CRM reported its per-key request-rate ceiling.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Api { status: 429, .. })
    }

    /// A short message suitable for surfaces that must not echo CRM
    /// error bodies verbatim.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Validation(_) => "The request input was invalid.",
            Self::Api { status: 429, .. } => "The CRM rate limit was exceeded. Retry later.",
            Self::Api { .. } => "The CRM rejected the request.",
            Self::Timeout { .. } => "The CRM did not respond in time.",
            Self::Signature => "The webhook signature could not be verified.",
            Self::Transport(_) => "The CRM could not be reached.",
        }
    }
}
