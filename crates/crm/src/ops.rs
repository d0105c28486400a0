use leadbridge_core::AdapterError;
use reqwest::Method;
use serde_json::{Map, Value};

use crate::client::CrmClient;
use crate::envelope::ResponseShape;

/// Declared envelope shape for the event endpoint, the one response the
/// adapter reads an entity out of itself. The pass-through endpoints hand
/// the CRM's body to the caller unopened and need no declaration.
pub const EVENT_SHAPE: ResponseShape = ResponseShape::Nested("event");

const UPDATE_TASK_FIELDS: &[&str] = &["description", "dueDate", "assignedTo", "completed"];

/// Pagination window for the list endpoints. The CRM caps page size at
/// 100; out-of-range values are clamped rather than rejected.
#[derive(Clone, Copy, Debug)]
pub struct PageQuery {
    pub limit: u32,
    pub offset: u32,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self { limit: 25, offset: 0 }
    }
}

impl PageQuery {
    fn params(self) -> Vec<(String, String)> {
        vec![
            ("limit".to_string(), self.limit.clamp(1, 100).to_string()),
            ("offset".to_string(), self.offset.to_string()),
        ]
    }
}

impl CrmClient {
    pub async fn list_people(
        &self,
        page: PageQuery,
        filters: &[(String, String)],
    ) -> Result<Value, AdapterError> {
        let params = merge_params(page, filters);
        self.request_with_query(Method::GET, "people", &params, None).await
    }

    pub async fn get_person(&self, person_id: &str) -> Result<Value, AdapterError> {
        let person_id = required_id("person id", person_id)?;
        self.request(Method::GET, &format!("people/{person_id}"), None).await
    }

    /// Create a contact. The CRM accepts either a name or an email as the
    /// minimal identity.
    pub async fn create_person(&self, fields: Map<String, Value>) -> Result<Value, AdapterError> {
        let body = clean_fields(fields);
        if !has_text_field(&body, "name") && !has_text_field(&body, "email") {
            return Err(AdapterError::validation("either name or email is required"));
        }
        self.request(Method::POST, "people", Some(&Value::Object(body))).await
    }

    /// Update a contact. The identifier is route data: any id-like key in
    /// the field map is stripped before the body goes on the wire.
    pub async fn update_person(
        &self,
        person_id: &str,
        fields: Map<String, Value>,
    ) -> Result<Value, AdapterError> {
        let person_id = required_id("person id", person_id)?;
        let body = strip_identifier_keys(clean_fields(fields));
        if body.is_empty() {
            return Err(AdapterError::validation("no valid update fields provided"));
        }
        self.request(Method::PUT, &format!("people/{person_id}"), Some(&Value::Object(body))).await
    }

    pub async fn delete_person(&self, person_id: &str) -> Result<Value, AdapterError> {
        let person_id = required_id("person id", person_id)?;
        self.request(Method::DELETE, &format!("people/{person_id}"), None).await
    }

    pub async fn list_notes(
        &self,
        page: PageQuery,
        person_id: Option<&str>,
    ) -> Result<Value, AdapterError> {
        let mut params = page.params();
        if let Some(person_id) = person_id.map(str::trim).filter(|value| !value.is_empty()) {
            params.push(("personId".to_string(), person_id.to_string()));
        }
        self.request_with_query(Method::GET, "notes", &params, None).await
    }

    pub async fn get_note(&self, note_id: &str) -> Result<Value, AdapterError> {
        let note_id = required_id("note id", note_id)?;
        self.request(Method::GET, &format!("notes/{note_id}"), None).await
    }

    pub async fn create_note(
        &self,
        person_id: &str,
        body: &str,
        is_html: bool,
    ) -> Result<Value, AdapterError> {
        let person_id = required_id("person id", person_id)?;
        let body = body.trim();
        if body.is_empty() {
            return Err(AdapterError::validation("note body is required"));
        }

        let mut payload = Map::new();
        payload.insert("personId".to_string(), Value::String(person_id));
        payload.insert("body".to_string(), Value::String(body.to_string()));
        if is_html {
            payload.insert("isHtml".to_string(), Value::Bool(true));
        }
        self.request(Method::POST, "notes", Some(&Value::Object(payload))).await
    }

    pub async fn list_tasks(
        &self,
        page: PageQuery,
        filters: &[(String, String)],
    ) -> Result<Value, AdapterError> {
        let params = merge_params(page, filters);
        self.request_with_query(Method::GET, "tasks", &params, None).await
    }

    pub async fn create_task(
        &self,
        description: &str,
        person_id: Option<&str>,
        due_date: Option<&str>,
        assigned_to: Option<&str>,
    ) -> Result<Value, AdapterError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(AdapterError::validation("task description is required"));
        }

        let mut payload = Map::new();
        payload.insert("description".to_string(), Value::String(description.to_string()));
        insert_text(&mut payload, "personId", person_id);
        // Due dates are opaque strings; the CRM validates the grammar.
        insert_text(&mut payload, "dueDate", due_date);
        insert_text(&mut payload, "assignedTo", assigned_to);
        self.request(Method::POST, "tasks", Some(&Value::Object(payload))).await
    }

    /// Update a task. Only the CRM's mutable task fields are accepted;
    /// anything else (including the identifier) is dropped.
    pub async fn update_task(
        &self,
        task_id: &str,
        fields: Map<String, Value>,
    ) -> Result<Value, AdapterError> {
        let task_id = required_id("task id", task_id)?;

        let mut body = Map::new();
        for key in UPDATE_TASK_FIELDS {
            if let Some(value) = fields.get(*key) {
                match value {
                    Value::Null => {}
                    Value::Bool(flag) if *key == "completed" => {
                        body.insert((*key).to_string(), Value::Bool(*flag));
                    }
                    Value::String(text) if !text.trim().is_empty() => {
                        body.insert((*key).to_string(), Value::String(text.trim().to_string()));
                    }
                    other if *key != "completed" => {
                        body.insert((*key).to_string(), other.clone());
                    }
                    _ => {}
                }
            }
        }
        if body.is_empty() {
            return Err(AdapterError::validation("no valid update fields provided"));
        }
        self.request(Method::PUT, &format!("tasks/{task_id}"), Some(&Value::Object(body))).await
    }

    pub async fn create_call(
        &self,
        person_id: &str,
        outcome: Option<&str>,
        note: Option<&str>,
        duration_secs: Option<u64>,
        call_time: Option<&str>,
    ) -> Result<Value, AdapterError> {
        let person_id = required_id("person id", person_id)?;

        let mut payload = Map::new();
        payload.insert("personId".to_string(), Value::String(person_id));
        insert_text(&mut payload, "outcome", outcome);
        insert_text(&mut payload, "note", note);
        if let Some(duration) = duration_secs {
            payload.insert("duration".to_string(), Value::from(duration));
        }
        insert_text(&mut payload, "callTime", call_time);
        self.request(Method::POST, "calls", Some(&Value::Object(payload))).await
    }

    /// Create an event. This is the CRM's preferred ingestion path for new
    /// leads: the nested person payload is passed through intact and the
    /// CRM itself performs the find-or-create, so the adapter never issues
    /// a separate contact-creation call.
    pub async fn create_event(&self, event: Map<String, Value>) -> Result<Value, AdapterError> {
        if !event.get("person").map(|person| person.is_object()).unwrap_or(false) {
            return Err(AdapterError::validation("event requires a person payload"));
        }
        let body = clean_fields(event);
        self.request(Method::POST, "events", Some(&Value::Object(body))).await
    }
}

fn required_id(label: &str, value: &str) -> Result<String, AdapterError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AdapterError::Validation(format!("{label} is required")));
    }
    Ok(trimmed.to_string())
}

fn merge_params(page: PageQuery, filters: &[(String, String)]) -> Vec<(String, String)> {
    let mut params = page.params();
    for (key, value) in filters {
        let value = value.trim();
        if !value.is_empty() {
            params.push((key.clone(), value.to_string()));
        }
    }
    params
}

fn insert_text(payload: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) {
        payload.insert(key.to_string(), Value::String(value.to_string()));
    }
}

fn has_text_field(fields: &Map<String, Value>, key: &str) -> bool {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false)
}

/// Drop nulls and blank strings, trim the rest. Nested objects (the event
/// person payload) are cleaned one level deep, matching what the CRM
/// tolerates.
fn clean_fields(fields: Map<String, Value>) -> Map<String, Value> {
    let mut cleaned = Map::new();
    for (key, value) in fields {
        match value {
            Value::Null => {}
            Value::String(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    cleaned.insert(key, Value::String(trimmed.to_string()));
                }
            }
            Value::Object(nested) => {
                let nested = clean_fields(nested);
                if !nested.is_empty() {
                    cleaned.insert(key, Value::Object(nested));
                }
            }
            other => {
                cleaned.insert(key, other);
            }
        }
    }
    cleaned
}

/// The identifier is route data, not body data; sending it in the
/// mutation body is a defect the CRM does not forgive quietly.
fn strip_identifier_keys(mut fields: Map<String, Value>) -> Map<String, Value> {
    for key in ["id", "personId", "person_id"] {
        fields.remove(key);
    }
    fields
}
