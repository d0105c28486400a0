use std::time::Duration;

use leadbridge_core::{AdapterError, CrmConfig};
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Outbound HTTP client for the Follow Up Boss REST API.
///
/// Constructed once from [`CrmConfig`] and passed by reference (or inside
/// an `Arc`) to every component that talks to the CRM. Holds no mutable
/// state; concurrent calls need no coordination.
#[derive(Clone, Debug)]
pub struct CrmClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    timeout_secs: u64,
}

impl CrmClient {
    pub fn new(config: &CrmConfig) -> Result<Self, AdapterError> {
        // Config validation already enforces this; repeated here because
        // tests build CrmConfig by hand.
        if !config.base_url.trim().starts_with("https://") && !config.is_loopback() {
            return Err(AdapterError::validation(
                "crm base url must use https for non-loopback hosts",
            ));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| AdapterError::Transport(err.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Issue one CRM request and return the parsed JSON body.
    ///
    /// The API key is injected as basic-auth username with an empty
    /// password, the scheme the CRM requires. A no-content response is
    /// synthesized into `{"success": true}` rather than failing to parse
    /// an empty body.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, AdapterError> {
        self.send(method, path, &[], body).await
    }

    /// Variant of [`CrmClient::request`] carrying query parameters, used
    /// by the list endpoints.
    pub async fn request_with_query(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, AdapterError> {
        self.send(method, path, query, body).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, AdapterError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!(method = %method, path = %path, "crm request");

        let mut request = self
            .http
            .request(method, &url)
            .basic_auth(self.api_key.expose_secret(), Some(""));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|err| self.classify_send_error(err))?;
        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            return Ok(json!({"success": true}));
        }

        let bytes = response.bytes().await.map_err(|err| self.classify_send_error(err))?;

        if status.is_success() {
            if bytes.is_empty() {
                return Ok(json!({"success": true}));
            }
            return serde_json::from_slice(&bytes).map_err(|err| AdapterError::Api {
                status: status.as_u16(),
                body: Value::String(format!("unparseable response body: {err}")),
            });
        }

        // Preserve whatever the CRM said, JSON or not. 429 is surfaced
        // like any other status; retry policy belongs to the caller.
        let error_body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        warn!(status = status.as_u16(), path = %path, "crm request failed");
        Err(AdapterError::Api { status: status.as_u16(), body: error_body })
    }

    fn classify_send_error(&self, err: reqwest::Error) -> AdapterError {
        if err.is_timeout() {
            AdapterError::Timeout { seconds: self.timeout_secs }
        } else {
            // reqwest error display carries the url, never the auth header.
            AdapterError::Transport(err.to_string())
        }
    }
}
