//! Scripted transport for unit tests

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use arangokit_core::error::{ClientError, Result};
use arangokit_core::http::{BasicAuth, HttpClient};
use arangokit_core::request::Method;
use arangokit_core::resolver::SingleHostResolver;
use arangokit_core::response::Response;
use arangokit_core::serializer::JsonSerializer;

use crate::connection::{Auth, Connection};

/// One request as seen by the transport
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub data: Option<String>,
    pub auth: Option<BasicAuth>,
}

type Responder = Box<dyn Fn(&RecordedCall) -> Result<Response> + Send + Sync>;

pub struct MockHttpClient {
    responder: Responder,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockHttpClient {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&RecordedCall) -> Result<Response> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer calls in order from `responses`
    pub fn scripted(responses: Vec<Result<Response>>) -> Self {
        let queue = Mutex::new(VecDeque::from(responses));
        Self::new(move |call| {
            queue.lock().pop_front().unwrap_or_else(|| {
                Err(ClientError::Connection(format!("no scripted response for {}", call.url)).into())
            })
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send_request(
        &self,
        method: Method,
        url: &str,
        headers: &BTreeMap<String, String>,
        params: &BTreeMap<String, String>,
        data: Option<String>,
        auth: Option<&BasicAuth>,
    ) -> Result<Response> {
        let call = RecordedCall {
            method,
            url: url.to_string(),
            headers: headers.clone(),
            params: params.clone(),
            data,
            auth: auth.cloned(),
        };
        let result = (self.responder)(&call).map(|mut response| {
            response.method = method;
            response.url = url.to_string();
            response
        });
        self.calls.lock().push(call);
        result
    }
}

/// Unprepared response with a JSON body
pub fn json_response(status: u16, body: Value) -> Response {
    raw_response(status, &body.to_string())
}

pub fn raw_response(status: u16, body: &str) -> Response {
    Response::new(Method::Get, "", BTreeMap::new(), status, status_text(status), body)
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        409 => "Conflict",
        _ => "Unknown",
    }
}

/// Unsigned token carrying only an `exp` claim
pub fn fake_jwt(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(json!({"alg": "HS256", "typ": "JWT"}).to_string());
    let claims = URL_SAFE_NO_PAD.encode(json!({"exp": exp, "iss": "arangodb"}).to_string());
    format!("{}.{}.signature", header, claims)
}

/// Basic-auth connection to database "test" on a single host
pub fn mock_connection(http: Arc<MockHttpClient>) -> Arc<Connection> {
    Arc::new(Connection::new(
        &["http://127.0.0.1:8529".to_string()],
        "test",
        Auth::basic("root", "passwd"),
        Arc::new(SingleHostResolver::new(1, None).unwrap()),
        http,
        Arc::new(JsonSerializer),
    )
    .unwrap())
}
