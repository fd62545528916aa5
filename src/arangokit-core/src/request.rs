use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// HTTP method of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing API request
///
/// Headers are kept in a sorted map so batch parts render deterministically.
/// `read`, `write` and `exclusive` list the collections a request touches;
/// only the transaction executor looks at them.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub endpoint: String,
    pub headers: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub data: Option<Value>,
    pub read: Option<Vec<String>>,
    pub write: Option<Vec<String>>,
    pub exclusive: Option<Vec<String>>,
    pub deserialize: bool,
}

impl Request {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("charset".to_string(), "utf-8".to_string());
        headers.insert("content-type".to_string(), "application/json".to_string());

        Self {
            method,
            endpoint: endpoint.into(),
            headers,
            params: BTreeMap::new(),
            data: None,
            read: None,
            write: None,
            exclusive: None,
            deserialize: true,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Post, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Put, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Delete, endpoint)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    /// Set a boolean query parameter the way the server expects it ("1"/"0")
    pub fn with_flag(self, name: impl Into<String>, value: bool) -> Self {
        self.with_param(name, if value { "1" } else { "0" })
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_read(mut self, collections: Vec<String>) -> Self {
        self.read = Some(collections);
        self
    }

    pub fn with_write(mut self, collections: Vec<String>) -> Self {
        self.write = Some(collections);
        self
    }

    pub fn with_exclusive(mut self, collections: Vec<String>) -> Self {
        self.exclusive = Some(collections);
        self
    }

    /// Keep the response body as a raw string instead of parsing it
    pub fn raw_response(mut self) -> Self {
        self.deserialize = false;
        self
    }

    /// True when the request declares its own collection access
    pub fn declares_collections(&self) -> bool {
        self.read.is_some() || self.write.is_some() || self.exclusive.is_some()
    }

    /// Endpoint with the query string appended
    pub fn path_and_query(&self) -> String {
        if self.params.is_empty() {
            return self.endpoint.clone();
        }

        let query = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.endpoint, query)
    }
}
