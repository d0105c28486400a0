//! Post-call payload model and caller identity extraction.
//!
//! Voice providers are loose about where caller details live: sometimes
//! top-level, sometimes inside `metadata`, sometimes absent. Extraction
//! checks the known locations in order and falls back to a placeholder
//! name so the lead still lands in the CRM.

use serde::Deserialize;
use serde_json::{Map, Value};

/// Name used when the provider sent no caller identity at all.
pub const UNKNOWN_CALLER: &str = "Unknown Caller";

/// Post-call webhook body. Unrecognized fields are retained in `extra`
/// rather than rejected; providers add fields without notice.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub agent_id: Option<String>,

    #[serde(default)]
    pub conversation_id: Option<String>,

    #[serde(default)]
    pub transcript: Vec<TranscriptTurn>,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One turn of the conversation transcript.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptTurn {
    #[serde(default)]
    pub role: Option<String>,

    #[serde(default, alias = "text")]
    pub message: Option<String>,
}

impl WebhookPayload {
    /// Caller display name, from the top level first, then metadata.
    pub fn caller_name(&self) -> String {
        text_field(&self.extra, "caller_name")
            .or_else(|| text_field(&self.metadata, "caller_name"))
            .unwrap_or_else(|| UNKNOWN_CALLER.to_string())
    }

    /// Caller phone number, checking the locations providers actually use.
    pub fn caller_phone(&self) -> Option<String> {
        text_field(&self.extra, "caller_phone")
            .or_else(|| text_field(&self.extra, "phone_number"))
            .or_else(|| text_field(&self.metadata, "caller_phone"))
            .or_else(|| text_field(&self.metadata, "phone_number"))
    }

    /// Provider-generated call summary, when one was supplied.
    pub fn call_summary(&self) -> Option<String> {
        text_field(&self.extra, "call_summary")
            .or_else(|| text_field(&self.extra, "summary"))
            .or_else(|| text_field(&self.metadata, "call_summary"))
            .or_else(|| text_field(&self.metadata, "summary"))
    }

    /// Call outcome label, when the provider classified the call.
    pub fn outcome(&self) -> Option<String> {
        text_field(&self.extra, "outcome").or_else(|| text_field(&self.metadata, "outcome"))
    }

    /// Call duration in seconds. Providers disagree on the key name, so
    /// both `duration` and `duration_secs` are accepted.
    pub fn duration_secs(&self) -> Option<u64> {
        number_field(&self.extra, "duration")
            .or_else(|| number_field(&self.extra, "duration_secs"))
            .or_else(|| number_field(&self.metadata, "duration"))
            .or_else(|| number_field(&self.metadata, "duration_secs"))
    }

    /// Render the transcript as `role: text` lines. Turns with no text
    /// are skipped; an empty transcript renders as an empty string.
    pub fn transcript_text(&self) -> String {
        let lines: Vec<String> = self
            .transcript
            .iter()
            .filter_map(|turn| {
                let message = turn.message.as_deref()?.trim();
                if message.is_empty() {
                    return None;
                }
                let role = turn.role.as_deref().unwrap_or("unknown");
                Some(format!("{role}: {message}"))
            })
            .collect();
        lines.join("\n")
    }
}

fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn number_field(map: &Map<String, Value>, key: &str) -> Option<u64> {
    map.get(key).and_then(Value::as_u64)
}
