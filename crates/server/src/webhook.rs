//! Post-call webhook receiver.
//!
//! Accepts provider webhooks on `POST /webhook/{provider}`, verifies the
//! signature over the raw body, and forwards the call as a CRM event. The
//! provider is acknowledged with 200 once the payload is accepted; a CRM
//! failure after that point is logged and swallowed, because a retry from
//! the voice provider would not fix it and most providers disable
//! endpoints that keep failing.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use leadbridge_core::AdapterError;
use leadbridge_crm::{CrmClient, EVENT_SHAPE};
use secrecy::SecretString;
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::extract::WebhookPayload;
use crate::signature::{self, SIGNATURE_HEADER};

/// Destination for accepted call events. The production sink is the CRM
/// client; tests substitute a recorder.
#[async_trait]
pub trait CallEventSink: Send + Sync {
    async fn forward(&self, event: Map<String, Value>) -> Result<Value, AdapterError>;
}

pub struct CrmForwarder {
    crm: Arc<CrmClient>,
}

impl CrmForwarder {
    pub fn new(crm: Arc<CrmClient>) -> Self {
        Self { crm }
    }
}

#[async_trait]
impl CallEventSink for CrmForwarder {
    async fn forward(&self, event: Map<String, Value>) -> Result<Value, AdapterError> {
        self.crm.create_event(event).await
    }
}

#[derive(Clone)]
pub struct AppState {
    pub sink: Arc<dyn CallEventSink>,
    pub shared_secret: Option<SecretString>,
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/webhook/{provider}", post(receive)).with_state(state)
}

async fn receive(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let correlation_id = Uuid::new_v4().to_string();
    let offered = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());

    if signature::verify(state.shared_secret.as_ref(), &body, offered).is_err() {
        warn!(
            event_name = "webhook.signature_rejected",
            correlation_id = %correlation_id,
            provider = %provider,
            "webhook signature verification failed"
        );
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid signature"})));
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(
                event_name = "webhook.rejected_payload",
                correlation_id = %correlation_id,
                provider = %provider,
                error = %err,
                "webhook body is not valid JSON"
            );
            return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid JSON payload"})));
        }
    };

    let conversation_id = payload.conversation_id.clone();
    info!(
        event_name = "webhook.received",
        correlation_id = %correlation_id,
        provider = %provider,
        conversation_id = conversation_id.as_deref().unwrap_or("unknown"),
        turns = payload.transcript.len(),
        "post-call webhook accepted"
    );

    // The provider gets its ack regardless of what the CRM does next.
    match state.sink.forward(build_call_event(&provider, &payload)).await {
        Ok(created) => {
            let event = EVENT_SHAPE.entity(&created);
            info!(
                event_name = "webhook.forwarded",
                correlation_id = %correlation_id,
                provider = %provider,
                event_id = event["id"].as_str().unwrap_or("unknown"),
                "call event forwarded to crm"
            );
        }
        Err(err) => {
            warn!(
                event_name = "webhook.forward_failed",
                correlation_id = %correlation_id,
                provider = %provider,
                error = %err,
                "crm rejected the call event, acknowledging anyway"
            );
        }
    }

    let mut ack = json!({"status": "accepted"});
    if let Some(conversation_id) = conversation_id {
        ack["conversation_id"] = Value::String(conversation_id);
    }
    (StatusCode::OK, Json(ack))
}

/// Everything after this point is cut from the note; voice transcripts
/// can run long and the CRM rejects oversized bodies.
const MAX_NOTE_LEN: usize = 5000;

/// Event-level system name and person-level lead source for a provider.
fn provider_labels(provider: &str) -> (String, String) {
    match provider {
        "elevenlabs" => ("ElevenLabs".to_string(), "ElevenLabs AI Call".to_string()),
        other => (other.to_string(), format!("{other} AI Call")),
    }
}

fn bounded_note(mut note: String) -> String {
    if note.len() <= MAX_NOTE_LEN {
        return note;
    }
    let mut cut = MAX_NOTE_LEN;
    while !note.is_char_boundary(cut) {
        cut -= 1;
    }
    note.truncate(cut);
    note.push_str("\n[truncated]");
    note
}

/// Assemble the CRM event for one completed call. The person payload is
/// nested so the CRM performs its own find-or-create; this stays a single
/// CRM request end to end. The note carries duration, outcome, the
/// provider-generated summary when supplied, and the transcript.
fn build_call_event(provider: &str, payload: &WebhookPayload) -> Map<String, Value> {
    let (system, lead_source) = provider_labels(provider);

    let mut person = Map::new();
    person.insert("name".to_string(), Value::String(payload.caller_name()));
    if let Some(phone) = payload.caller_phone() {
        person.insert("phones".to_string(), json!([{"value": phone}]));
    }
    person.insert("source".to_string(), Value::String(lead_source));

    let mut note = String::from("AI voice call completed.");
    if let Some(conversation_id) = &payload.conversation_id {
        note.push_str(&format!("\nConversation: {conversation_id}"));
    }
    if let Some(agent_id) = &payload.agent_id {
        note.push_str(&format!("\nAgent: {agent_id}"));
    }
    if let Some(outcome) = payload.outcome() {
        note.push_str(&format!("\nOutcome: {outcome}"));
    }
    if let Some(duration) = payload.duration_secs() {
        note.push_str(&format!("\nDuration: {duration}s"));
    }
    if let Some(summary) = payload.call_summary() {
        note.push_str("\n\nSummary:\n");
        note.push_str(&summary);
    }
    let transcript = payload.transcript_text();
    if transcript.is_empty() {
        note.push_str("\n\n(no transcript)");
    } else {
        note.push_str("\n\nTranscript:\n");
        note.push_str(&transcript);
    }

    let mut event = Map::new();
    event.insert("type".to_string(), Value::String("call".to_string()));
    event.insert("source".to_string(), Value::String(system));
    event.insert("person".to_string(), Value::Object(person));
    event.insert("note".to_string(), Value::String(bounded_note(note)));
    event
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use hmac::{Hmac, Mac};
    use http_body_util::BodyExt;
    use leadbridge_core::AdapterError;
    use secrecy::SecretString;
    use serde_json::{json, Map, Value};
    use sha2::Sha256;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use super::{build_call_event, router, AppState, CallEventSink};
    use crate::extract::WebhookPayload;
    use crate::signature::SIGNATURE_HEADER;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<Map<String, Value>>>,
        fail_with: Mutex<Option<AdapterError>>,
    }

    #[async_trait::async_trait]
    impl CallEventSink for RecordingSink {
        async fn forward(&self, event: Map<String, Value>) -> Result<Value, AdapterError> {
            self.events.lock().await.push(event);
            match self.fail_with.lock().await.take() {
                Some(err) => Err(err),
                None => Ok(json!({"id": "ev-1"})),
            }
        }
    }

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn call_body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "conversation_id": "conv-1",
            "agent_id": "agent-9",
            "caller_name": "Jane Doe",
            "caller_phone": "+15551234567",
            "transcript": [
                {"role": "agent", "message": "Hello"},
                {"role": "user", "message": "Hi, calling about the listing"},
            ],
            "metadata": {"duration_secs": 90},
        }))
        .unwrap()
    }

    async fn post(
        state: AppState,
        body: Vec<u8>,
        signature: Option<String>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method("POST")
            .uri("/webhook/elevenlabs")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        let response = router(state)
            .oneshot(request.body(Body::from(body)).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn signed_payload_is_forwarded_and_acknowledged() {
        let sink = Arc::new(RecordingSink::default());
        let state = AppState {
            sink: sink.clone(),
            shared_secret: Some(SecretString::from("topsecret")),
        };
        let body = call_body();
        let signature = sign("topsecret", &body);

        let (status, ack) = post(state, body, Some(signature)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["status"], "accepted");
        assert_eq!(ack["conversation_id"], "conv-1");

        let events = sink.events.lock().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "call");
        assert_eq!(events[0]["source"], "ElevenLabs");
        assert_eq!(events[0]["person"]["name"], "Jane Doe");
        assert_eq!(events[0]["person"]["phones"][0]["value"], "+15551234567");
        assert_eq!(events[0]["person"]["source"], "ElevenLabs AI Call");
        assert!(events[0]["note"].is_string());
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_before_any_crm_call() {
        let sink = Arc::new(RecordingSink::default());
        let state = AppState {
            sink: sink.clone(),
            shared_secret: Some(SecretString::from("topsecret")),
        };

        let (status, body) = post(state, call_body(), Some(sign("wrong", &call_body()))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid signature");
        assert!(sink.events.lock().await.is_empty());
    }

    #[tokio::test]
    async fn missing_signature_is_rejected_when_secret_is_set() {
        let sink = Arc::new(RecordingSink::default());
        let state = AppState {
            sink: sink.clone(),
            shared_secret: Some(SecretString::from("topsecret")),
        };

        let (status, _) = post(state, call_body(), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(sink.events.lock().await.is_empty());
    }

    #[tokio::test]
    async fn unsigned_payload_is_accepted_without_a_secret() {
        let sink = Arc::new(RecordingSink::default());
        let state = AppState { sink: sink.clone(), shared_secret: None };

        let (status, _) = post(state, call_body(), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sink.events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn malformed_json_is_a_client_error() {
        let sink = Arc::new(RecordingSink::default());
        let state = AppState { sink: sink.clone(), shared_secret: None };

        let (status, body) = post(state, b"{not json".to_vec(), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid JSON payload");
        assert!(sink.events.lock().await.is_empty());
    }

    #[tokio::test]
    async fn crm_failure_is_swallowed_and_still_acknowledged() {
        let sink = Arc::new(RecordingSink::default());
        *sink.fail_with.lock().await = Some(AdapterError::Api {
            status: 500,
            body: json!({"errorMessage": "boom"}),
        });
        let state = AppState { sink: sink.clone(), shared_secret: None };

        let (status, ack) = post(state, call_body(), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["status"], "accepted");
        assert_eq!(sink.events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn empty_transcript_is_still_forwarded() {
        let sink = Arc::new(RecordingSink::default());
        let state = AppState { sink: sink.clone(), shared_secret: None };

        let body = serde_json::to_vec(&json!({
            "conversation_id": "conv-2",
            "transcript": [],
        }))
        .unwrap();
        let (status, _) = post(state, body, None).await;
        assert_eq!(status, StatusCode::OK);

        let events = sink.events.lock().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["person"]["name"], "Unknown Caller");
        let note = events[0]["note"].as_str().unwrap();
        assert!(note.contains("(no transcript)"));
    }

    #[test]
    fn note_carries_summary_outcome_and_duration() {
        let payload: WebhookPayload = serde_json::from_value(json!({
            "conversation_id": "conv-3",
            "call_summary": "Caller wants a showing this weekend.",
            "outcome": "interested",
            "transcript": [{"role": "user", "message": "Can I see the house Saturday?"}],
            "metadata": {"duration": 90},
        }))
        .unwrap();

        let event = build_call_event("elevenlabs", &payload);
        let note = event["note"].as_str().unwrap();
        assert!(note.contains("Outcome: interested"));
        assert!(note.contains("Duration: 90s"));
        assert!(note.contains("Caller wants a showing this weekend."));
        assert!(note.contains("user: Can I see the house Saturday?"));
    }

    #[test]
    fn oversized_transcripts_are_cut_down_before_forwarding() {
        let line = "user: tell me everything about every listing in the city".to_string();
        let turns: Vec<_> = (0..500)
            .map(|_| json!({"role": "user", "message": line.clone()}))
            .collect();
        let payload: WebhookPayload =
            serde_json::from_value(json!({"transcript": turns})).unwrap();

        let event = build_call_event("elevenlabs", &payload);
        let note = event["note"].as_str().unwrap();
        assert!(note.len() <= super::MAX_NOTE_LEN + "\n[truncated]".len());
        assert!(note.ends_with("[truncated]"));
    }

    #[test]
    fn unknown_provider_gets_generic_labels() {
        let payload: WebhookPayload = serde_json::from_value(json!({})).unwrap();
        let event = build_call_event("retell", &payload);
        assert_eq!(event["type"], "call");
        assert_eq!(event["source"], "retell");
        assert_eq!(event["person"]["source"], "retell AI Call");
    }
}
