//! Agent key validation and rate limiting for the tool gateway.
//!
//! Over stdio there is one agent per process, identified by the key it
//! presents at startup. The manager validates that key on every tool call
//! and enforces a sliding-window request budget per key.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use leadbridge_core::McpConfig;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A registered agent key with its request budget.
#[derive(Debug, Clone)]
pub struct AgentKey {
    pub key: String,
    pub name: String,
    pub requests_per_minute: u32,
    pub issued_at: chrono::DateTime<chrono::Utc>,
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Allowed {
        agent: String,
        remaining: u32,
    },
    Denied {
        reason: String,
        /// Seconds until the window frees up, for rate-limit denials.
        retry_after_secs: Option<u64>,
    },
}

impl AuthDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    pub fn denial_reason(&self) -> Option<&str> {
        match self {
            Self::Denied { reason, .. } => Some(reason),
            Self::Allowed { .. } => None,
        }
    }
}

/// Key registry plus per-key sliding windows.
///
/// Keys are fixed at construction; only the windows mutate, so a single
/// async mutex around the window map is all the coordination needed.
#[derive(Debug, Clone)]
pub struct AuthManager {
    keys: Arc<HashMap<String, AgentKey>>,
    windows: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    window: Duration,
    required: bool,
}

impl AuthManager {
    /// Open gateway: every request is allowed, nothing is tracked.
    pub fn open() -> Self {
        Self {
            keys: Arc::new(HashMap::new()),
            windows: Arc::new(Mutex::new(HashMap::new())),
            window: Duration::from_secs(60),
            required: false,
        }
    }

    pub fn with_keys(keys: Vec<AgentKey>, window: Duration) -> Self {
        let keys = keys.into_iter().map(|entry| (entry.key.clone(), entry)).collect();
        Self {
            keys: Arc::new(keys),
            windows: Arc::new(Mutex::new(HashMap::new())),
            window,
            required: true,
        }
    }

    pub fn from_config(config: &McpConfig) -> Self {
        if !config.auth_enabled || config.agent_keys.is_empty() {
            return Self::open();
        }
        let keys = config
            .agent_keys
            .iter()
            .map(|entry| AgentKey {
                key: entry.key.clone(),
                name: entry.name.clone(),
                requests_per_minute: entry.requests_per_minute,
                issued_at: chrono::Utc::now(),
            })
            .collect();
        Self::with_keys(keys, Duration::from_secs(config.rate_limit_window_secs))
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Validate the presented key and charge one request against its
    /// window.
    pub async fn authorize(&self, presented: Option<&str>) -> AuthDecision {
        if !self.required {
            return AuthDecision::Allowed { agent: "anonymous".to_string(), remaining: u32::MAX };
        }

        let Some(presented) = presented else {
            return AuthDecision::Denied {
                reason: "agent key required".to_string(),
                retry_after_secs: None,
            };
        };
        let Some(entry) = self.keys.get(presented) else {
            return AuthDecision::Denied {
                reason: "unrecognized agent key".to_string(),
                retry_after_secs: None,
            };
        };

        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let window = windows.entry(entry.key.clone()).or_default();
        while window.front().is_some_and(|&at| now.duration_since(at) >= self.window) {
            window.pop_front();
        }

        let limit = entry.requests_per_minute as usize;
        if window.len() >= limit {
            let retry_after = window
                .front()
                .map(|&oldest| self.window.saturating_sub(now.duration_since(oldest)).as_secs())
                .unwrap_or(self.window.as_secs());
            warn!(agent = %entry.name, limit, "rate limit exceeded");
            return AuthDecision::Denied {
                reason: "rate limit exceeded".to_string(),
                retry_after_secs: Some(retry_after.max(1)),
            };
        }

        window.push_back(now);
        let remaining = (limit - window.len()) as u32;
        debug!(agent = %entry.name, remaining, "request authorized");
        AuthDecision::Allowed { agent: entry.name.clone(), remaining }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use leadbridge_core::{AgentKeyConfig, McpConfig};

    use super::{AgentKey, AuthDecision, AuthManager};

    fn test_key(limit: u32) -> AgentKey {
        AgentKey {
            key: "agent-key-1".to_string(),
            name: "voice-agent".to_string(),
            requests_per_minute: limit,
            issued_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn open_gateway_allows_anonymous_requests() {
        let auth = AuthManager::open();
        let decision = auth.authorize(None).await;
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn missing_and_unknown_keys_are_denied() {
        let auth = AuthManager::with_keys(vec![test_key(10)], Duration::from_secs(60));

        let decision = auth.authorize(None).await;
        assert_eq!(decision.denial_reason(), Some("agent key required"));

        let decision = auth.authorize(Some("wrong-key")).await;
        assert_eq!(decision.denial_reason(), Some("unrecognized agent key"));
    }

    #[tokio::test]
    async fn budget_exhaustion_reports_retry_after() {
        let auth = AuthManager::with_keys(vec![test_key(2)], Duration::from_secs(60));

        assert!(auth.authorize(Some("agent-key-1")).await.is_allowed());
        assert!(auth.authorize(Some("agent-key-1")).await.is_allowed());

        match auth.authorize(Some("agent-key-1")).await {
            AuthDecision::Denied { reason, retry_after_secs } => {
                assert_eq!(reason, "rate limit exceeded");
                assert!(retry_after_secs.is_some());
            }
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn disabled_config_builds_an_open_manager() {
        let config = McpConfig {
            auth_enabled: false,
            rate_limit_window_secs: 60,
            agent_keys: vec![AgentKeyConfig {
                key: "k".to_string(),
                name: "n".to_string(),
                requests_per_minute: 60,
            }],
        };
        let auth = AuthManager::from_config(&config);
        assert!(!auth.is_required());
    }
}
