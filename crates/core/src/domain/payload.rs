// Task Payload (input handed to an isolated Task Unit)

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Input payload for one task invocation.
///
/// The payload is handed off by value: the context receives its own copy
/// and no accessor hands out a mutable reference, so it cannot change once
/// the coordinator has delivered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Value);

impl Payload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Parse a payload from JSON text.
    ///
    /// Text that is not valid JSON is taken as a plain string payload, so
    /// `hello` and `"hello"` both produce the string `hello`.
    pub fn from_json_or_string(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(value) => Self(value),
            Err(_) => Self(Value::String(text.to_string())),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn as_str(&self) -> Option<&str> {
        self.0.as_str()
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self(Value::Null)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self(Value::String(s.to_string()))
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self(Value::String(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_or_string() {
        assert_eq!(Payload::from_json_or_string("\"hello\"").as_str(), Some("hello"));
        assert_eq!(Payload::from_json_or_string("hello").as_str(), Some("hello"));
        assert_eq!(
            Payload::from_json_or_string("{\"ms\": 5}").as_value(),
            &json!({"ms": 5})
        );
    }

    #[test]
    fn test_clone_is_independent_copy() {
        let original = Payload::new(json!({"items": [1, 2, 3]}));
        let handed_off = original.clone();

        let mut value = handed_off.into_value();
        value["items"] = json!([]);

        assert_eq!(original.as_value(), &json!({"items": [1, 2, 3]}));
    }

    #[test]
    fn test_serializes_transparently() {
        let payload = Payload::from("hello");
        assert_eq!(serde_json::to_string(&payload).unwrap(), "\"hello\"");
    }
}
