//! Normalized outcome of a remote call

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Status, body and per-field validation feedback of the last remote call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    status: u16,
    data: Value,
    message: String,
    feedbacks: IndexMap<String, String>,
}

impl Default for ApiResponse {
    fn default() -> Self {
        Self {
            status: 200,
            data: Value::Object(Map::new()),
            message: String::new(),
            feedbacks: IndexMap::new(),
        }
    }
}

/// A `validation.rule,arg1,arg2` feedback key resolved into its parts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFeedback {
    pub attribute: String,
    pub rule: String,
    pub value: String,
    pub message: String,
}

impl ApiResponse {
    /// Build from a raw body; a `message` in the body wins over `status_text`
    pub fn new(status: u16, data: Value, status_text: &str) -> Self {
        let message = data
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or(status_text)
            .to_string();
        let feedbacks = data
            .get("errors")
            .and_then(Value::as_object)
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|(field, messages)| {
                        first_message(messages).map(|m| (field.clone(), m))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            status,
            data,
            message,
            feedbacks,
        }
    }

    pub fn ok(data: Value) -> Self {
        Self::new(200, data, "OK")
    }

    /// Placeholder for a call that never got an answer (connection error,
    /// abort). Status `0` counts as failed.
    pub fn unreachable(message: &str) -> Self {
        Self::new(0, Value::Object(Map::new()), message)
    }

    pub fn with_status(status: u16, data: Value) -> Self {
        Self::new(status, data, "")
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn feedbacks(&self) -> &IndexMap<String, String> {
        &self.feedbacks
    }

    /// Any status outside 2xx
    pub fn failed(&self) -> bool {
        !(200..300).contains(&self.status)
    }

    pub fn success(&self) -> bool {
        !self.failed()
    }

    pub fn failed_by_session_expire(&self) -> bool {
        (self.status == 401 && self.message == "Unauthenticated.") || self.status == 419
    }

    /// Whether the server reported feedback for `field`
    pub fn fail(&self, field: &str) -> bool {
        self.feedbacks.contains_key(field)
    }

    /// `Some(false)` for a failed field, `None` while nothing is known
    pub fn state(&self, field: &str) -> Option<bool> {
        self.fail(field).then_some(false)
    }

    /// Human readable feedback for `field`, empty when there is none
    pub fn feedback(&self, field: &str) -> String {
        self.validation(field)
            .map(|v| v.message)
            .unwrap_or_default()
    }

    pub fn validation(&self, field: &str) -> Option<ValidationFeedback> {
        let raw = self.feedbacks.get(field)?;
        let key = raw.strip_prefix("validation.").unwrap_or(raw);
        let mut parts = key.split(',');
        let rule = parts.next().unwrap_or_default().trim().to_string();
        let value = parts.map(str::trim).collect::<Vec<_>>().join(", ");
        Some(ValidationFeedback {
            attribute: field.to_string(),
            message: rule.clone(),
            rule,
            value,
        })
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn to_json(&self) -> Value {
        json!({
            "status": self.status,
            "data": self.data,
            "message": self.message,
            "feedbacks": self.feedbacks,
        })
    }
}

fn first_message(messages: &Value) -> Option<String> {
    match messages {
        Value::Array(items) => items.first().and_then(Value::as_str).map(str::to_string),
        Value::String(message) => Some(message.clone()),
        _ => None,
    }
}
