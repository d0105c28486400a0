use axum::{http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub checked_at: String,
}

pub fn router() -> Router {
    Router::new().route("/health", get(health))
}

/// Liveness only. The CRM is deliberately not probed here; a health check
/// that spends CRM rate budget on every poll is worse than none.
pub async fn health() -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "ready",
        service: "leadbridge-server",
        version: env!("CARGO_PKG_VERSION"),
        checked_at: Utc::now().to_rfc3339(),
    };
    (StatusCode::OK, Json(payload))
}
