use serde_json::Value;

/// How a CRM endpoint wraps the entity it returns.
///
/// The CRM's response envelopes are not uniform: some endpoints nest the
/// entity under a named key (`{"person": {...}}`), others return it at the
/// top level. Each endpoint operation declares its shape once instead of
/// probing fields ad hoc; a new endpoint adds one declaration here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseShape {
    /// Entity sits at the top level of the response body.
    Flat,
    /// Entity is nested under the named key. Falls back to the flat body
    /// when the key is absent, since the CRM is not strict about this.
    Nested(&'static str),
}

impl ResponseShape {
    /// Extract the entity from an owned response body.
    pub fn unwrap(self, payload: Value) -> Value {
        match self {
            Self::Flat => payload,
            Self::Nested(key) => match payload {
                Value::Object(mut map) if map.contains_key(key) => {
                    map.remove(key).unwrap_or(Value::Null)
                }
                other => other,
            },
        }
    }

    /// Borrowing view of the entity inside a response body.
    pub fn entity<'a>(&self, payload: &'a Value) -> &'a Value {
        match self {
            Self::Flat => payload,
            Self::Nested(key) => payload.get(key).unwrap_or(payload),
        }
    }
}
