use serde_json::Value;

use crate::error::{ClientError, Result};

/// Serializer capability used for request bodies and response parsing
pub trait Serializer: Send + Sync {
    fn serialize(&self, value: &Value) -> Result<String>;

    /// Parse a raw body; bodies that are not valid documents come back as a JSON string
    fn deserialize(&self, raw: &str) -> Value;
}

/// Default JSON serializer
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &Value) -> Result<String> {
        serde_json::to_string(value).map_err(|e| ClientError::Serialization(e.to_string()).into())
    }

    fn deserialize(&self, raw: &str) -> Value {
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    }
}

/// Render a request body: strings are sent verbatim, everything else is serialized
pub fn normalize_data(data: Option<&Value>, serializer: &dyn Serializer) -> Result<Option<String>> {
    match data {
        None => Ok(None),
        Some(Value::String(raw)) => Ok(Some(raw.clone())),
        Some(value) => serializer.serialize(value).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialize() {
        let s = JsonSerializer.serialize(&json!({"_key": "1", "val": 1})).unwrap();
        assert_eq!(s, r#"{"_key":"1","val":1}"#);
    }

    #[test]
    fn test_deserialize_falls_back_to_string() {
        assert_eq!(JsonSerializer.deserialize(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(JsonSerializer.deserialize("plain text"), json!("plain text"));
        assert_eq!(JsonSerializer.deserialize(""), json!(""));
    }

    #[test]
    fn test_normalize_data() {
        assert_eq!(normalize_data(None, &JsonSerializer).unwrap(), None);
        assert_eq!(
            normalize_data(Some(&json!("{\"raw\":true}")), &JsonSerializer).unwrap(),
            Some("{\"raw\":true}".to_string())
        );
        assert_eq!(
            normalize_data(Some(&json!([1, 2])), &JsonSerializer).unwrap(),
            Some("[1,2]".to_string())
        );
    }
}
