use serde_json::Value;
use std::collections::BTreeMap;

use crate::request::Method;
use crate::serializer::Serializer;

/// Raw HTTP response plus the fields derived from its body
///
/// The transport builds a bare response with [`Response::new`]; the connection
/// then calls [`Response::prepare`] to parse the body and pick up the server
/// error number. Header names are stored lower-cased.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub status_code: u16,
    pub status_text: String,
    pub raw_body: String,
    pub body: Value,
    pub error_code: Option<i64>,
    pub error_message: Option<String>,
    pub is_success: bool,
}

impl Response {
    pub fn new(
        method: Method,
        url: impl Into<String>,
        headers: BTreeMap<String, String>,
        status_code: u16,
        status_text: impl Into<String>,
        raw_body: impl Into<String>,
    ) -> Self {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();

        Self {
            method,
            url: url.into(),
            headers,
            status_code,
            status_text: status_text.into(),
            raw_body: raw_body.into(),
            body: Value::Null,
            error_code: None,
            error_message: None,
            is_success: (200..300).contains(&status_code),
        }
    }

    /// Parse the raw body and derive `error_code`, `error_message` and `is_success`
    pub fn prepare(mut self, serializer: &dyn Serializer, deserialize: bool) -> Self {
        if deserialize {
            self.body = serializer.deserialize(&self.raw_body);
            if let Value::Object(map) = &self.body {
                self.error_code = map.get("errorNum").and_then(Value::as_i64);
                self.error_message = map
                    .get("errorMessage")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
        } else {
            self.body = Value::String(self.raw_body.clone());
        }

        self.is_success = (200..300).contains(&self.status_code) && self.error_code.is_none();
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Field of an object body, if present
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::JsonSerializer;

    fn response(status: u16, body: &str) -> Response {
        let mut headers = BTreeMap::new();
        headers.insert("X-Arango-Async-Id".to_string(), "42".to_string());
        Response::new(Method::Post, "http://localhost:8529/_api/document/c", headers, status, "Conflict", body)
    }

    #[test]
    fn test_prepare_error_body() {
        let body = r#"{"code":409,"error":true,"errorNum":1210,"errorMessage":"unique constraint violated"}"#;
        let resp = response(409, body).prepare(&JsonSerializer, true);

        assert!(!resp.is_success);
        assert_eq!(resp.error_code, Some(1210));
        assert_eq!(resp.error_message.as_deref(), Some("unique constraint violated"));
        assert_eq!(resp.body["code"], 409);
    }

    #[test]
    fn test_prepare_error_num_on_2xx_is_failure() {
        let resp = response(200, r#"{"errorNum":10,"errorMessage":"bad"}"#).prepare(&JsonSerializer, true);
        assert!(!resp.is_success);
    }

    #[test]
    fn test_prepare_raw_body() {
        let resp = response(200, "not json").prepare(&JsonSerializer, false);
        assert!(resp.is_success);
        assert_eq!(resp.body, Value::String("not json".to_string()));
        assert_eq!(resp.error_code, None);
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let resp = response(202, "");
        assert_eq!(resp.header("x-arango-async-id"), Some("42"));
        assert_eq!(resp.header("X-ARANGO-ASYNC-ID"), Some("42"));
    }
}
