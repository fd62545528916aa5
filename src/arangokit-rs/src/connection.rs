//! One logical session against a database
//!
//! The connection turns an endpoint into a full URL on the host the resolver
//! picks, attaches credentials, hands the request to the transport and parses
//! what comes back. Non-success responses are returned untouched; turning them
//! into typed errors is the job of each operation's response handler.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arangokit_core::error::{ArangoError, ClientError, ErrorKind, Result, ServerError};
use arangokit_core::http::{BasicAuth, HttpClient};
use arangokit_core::request::Request;
use arangokit_core::resolver::HostResolver;
use arangokit_core::response::Response;
use arangokit_core::serializer::{normalize_data, Serializer};

/// Authentication mode of a connection
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// HTTP basic credentials on every request
    Basic { username: String, password: String },
    /// Credentials exchanged for a JWT that is refreshed when it expires
    Jwt { username: String, password: String },
    /// Pre-issued superuser JWT, never refreshed
    SuperuserToken(String),
}

impl Auth {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Auth::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn jwt(username: impl Into<String>, password: impl Into<String>) -> Self {
        Auth::Jwt {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Build credentials for a username/password auth method name
    pub fn from_method(
        method: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        Ok(match method.parse::<AuthMethod>()? {
            AuthMethod::Basic => Auth::basic(username, password),
            AuthMethod::Jwt => Auth::jwt(username, password),
        })
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Basic { username, .. } => write!(f, "Basic({})", username),
            Auth::Jwt { username, .. } => write!(f, "Jwt({})", username),
            Auth::SuperuserToken(_) => f.write_str("SuperuserToken"),
        }
    }
}

/// Auth method names accepted for username/password logins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Basic,
    Jwt,
}

impl FromStr for AuthMethod {
    type Err = ClientError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "basic" => Ok(AuthMethod::Basic),
            "jwt" => Ok(AuthMethod::Jwt),
            other => Err(ClientError::InvalidArgument(format!(
                "invalid auth_method: {}",
                other
            ))),
        }
    }
}

#[derive(Default)]
struct JwtState {
    token: Option<String>,
    exp: Option<i64>,
}

enum Credential {
    Basic(BasicAuth),
    Jwt {
        username: String,
        password: String,
        state: RwLock<JwtState>,
    },
    Superuser {
        header: String,
    },
}

pub struct Connection {
    db_name: String,
    url_prefixes: Vec<String>,
    resolver: Arc<dyn HostResolver>,
    http: Arc<dyn HttpClient>,
    serializer: Arc<dyn Serializer>,
    credential: Credential,
    exp_leeway: i64,
}

impl Connection {
    pub fn new(
        hosts: &[String],
        db_name: &str,
        auth: Auth,
        resolver: Arc<dyn HostResolver>,
        http: Arc<dyn HttpClient>,
        serializer: Arc<dyn Serializer>,
    ) -> Result<Self> {
        if resolver.host_count() != hosts.len() {
            return Err(ClientError::InvalidArgument(format!(
                "resolver expects {} host(s) but {} were given",
                resolver.host_count(),
                hosts.len()
            ))
            .into());
        }

        let url_prefixes = hosts
            .iter()
            .map(|host| format!("{}/_db/{}", host.trim_end_matches('/'), db_name))
            .collect();

        let credential = match auth {
            Auth::Basic { username, password } => Credential::Basic(BasicAuth { username, password }),
            Auth::Jwt { username, password } => Credential::Jwt {
                username,
                password,
                state: RwLock::new(JwtState::default()),
            },
            Auth::SuperuserToken(token) => Credential::Superuser {
                header: format!("bearer {}", token),
            },
        };

        Ok(Self {
            db_name: db_name.to_string(),
            url_prefixes,
            resolver,
            http,
            serializer,
            credential,
            exp_leeway: 0,
        })
    }

    /// Seconds subtracted from a token's expiry before it counts as stale
    pub fn with_exp_leeway(mut self, seconds: i64) -> Self {
        self.exp_leeway = seconds;
        self
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn username(&self) -> Option<&str> {
        match &self.credential {
            Credential::Basic(auth) => Some(&auth.username),
            Credential::Jwt { username, .. } => Some(username),
            Credential::Superuser { .. } => None,
        }
    }

    pub fn url_prefixes(&self) -> &[String] {
        &self.url_prefixes
    }

    pub fn serializer(&self) -> &dyn Serializer {
        self.serializer.as_ref()
    }

    pub fn serialize(&self, value: &Value) -> Result<String> {
        self.serializer.serialize(value)
    }

    pub fn deserialize(&self, raw: &str) -> Value {
        self.serializer.deserialize(raw)
    }

    /// Current JWT, if this is a JWT connection holding one
    pub fn token(&self) -> Option<String> {
        match &self.credential {
            Credential::Jwt { state, .. } => state.read().token.clone(),
            _ => None,
        }
    }

    /// Send a request and return the prepared response
    ///
    /// On a JWT connection a missing or expired token is refreshed first, and
    /// a 401 reply triggers one refresh followed by one resend.
    pub async fn send_request(&self, mut request: Request) -> Result<Response> {
        let mut refreshed = false;
        if self.token_is_stale() {
            self.refresh_token().await?;
            refreshed = true;
        }
        self.attach_auth(&mut request);

        let host_index = self.resolver.get_host_index(&HashSet::new());
        let response = self.process_request(host_index, &request).await?;

        if !matches!(self.credential, Credential::Jwt { .. }) || response.status_code != 401 {
            return Ok(response);
        }
        if refreshed {
            return Err(ServerError::new(ErrorKind::JwtAuth, &request, response).into());
        }

        tracing::debug!(endpoint = %request.endpoint, "Token rejected, refreshing");
        self.refresh_token().await?;
        self.attach_auth(&mut request);

        let response = self.process_request(host_index, &request).await?;
        if response.status_code == 401 {
            return Err(ServerError::new(ErrorKind::JwtAuth, &request, response).into());
        }
        Ok(response)
    }

    /// Exchange the stored credentials for a fresh JWT
    ///
    /// No-op for basic and superuser-token connections.
    pub async fn refresh_token(&self) -> Result<()> {
        let (username, password, state) = match &self.credential {
            Credential::Jwt {
                username,
                password,
                state,
            } => (username, password, state),
            _ => return Ok(()),
        };

        let request = Request::post("/_open/auth").with_data(json!({
            "username": username,
            "password": password,
        }));
        let host_index = self.resolver.get_host_index(&HashSet::new());
        let response = self.process_request(host_index, &request).await?;
        if !response.is_success {
            return Err(ServerError::new(ErrorKind::JwtAuth, &request, response).into());
        }

        let token = response
            .field("jwt")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::MalformedResponse("auth response carries no jwt".to_string()))?
            .to_string();

        let exp = decode_token_exp(&token);
        if let Some(exp) = exp {
            if exp < chrono::Utc::now().timestamp() {
                return Err(ClientError::JwtExpired("JWT token has expired".to_string()).into());
            }
        }

        let mut state = state.write();
        state.token = Some(token);
        state.exp = exp;
        tracing::info!(db = %self.db_name, "JWT token refreshed");
        Ok(())
    }

    /// Check that the server is reachable and accepts the credentials
    pub async fn ping(&self) -> Result<u16> {
        let request = Request::get("/_api/collection");
        let response = match self.send_request(request).await {
            Ok(response) => response,
            Err(ArangoError::Client(ClientError::Connection(msg))) => {
                return Err(ClientError::ServerConnection(format!("bad connection: {}", msg)).into());
            }
            Err(e) => return Err(e),
        };

        if matches!(response.status_code, 401 | 403) {
            return Err(ClientError::ServerConnection("bad username and/or password".to_string()).into());
        }
        if !response.is_success {
            let message = response
                .error_message
                .unwrap_or_else(|| "bad server response".to_string());
            return Err(ClientError::ServerConnection(message).into());
        }
        Ok(response.status_code)
    }

    fn token_is_stale(&self) -> bool {
        let Credential::Jwt { state, .. } = &self.credential else {
            return false;
        };
        let state = state.read();
        match (&state.token, state.exp) {
            (None, _) => true,
            (Some(_), Some(exp)) => exp - self.exp_leeway <= chrono::Utc::now().timestamp(),
            (Some(_), None) => false,
        }
    }

    fn attach_auth(&self, request: &mut Request) {
        let header = match &self.credential {
            Credential::Basic(_) => return,
            Credential::Jwt { state, .. } => match &state.read().token {
                Some(token) => format!("bearer {}", token),
                None => return,
            },
            Credential::Superuser { header } => header.clone(),
        };
        request.headers.insert("authorization".to_string(), header);
    }

    fn basic_auth(&self) -> Option<&BasicAuth> {
        match &self.credential {
            Credential::Basic(auth) => Some(auth),
            _ => None,
        }
    }

    /// Send to `host_index`, failing over to other hosts on transport errors
    async fn process_request(&self, mut host_index: usize, request: &Request) -> Result<Response> {
        let data = normalize_data(request.data.as_ref(), self.serializer.as_ref())?;
        let max_tries = self.resolver.max_tries();
        let host_count = self.resolver.host_count();
        let mut indexes_to_filter = HashSet::new();
        let mut tries = 0;

        loop {
            let url = format!("{}{}", self.url_prefixes[host_index], request.endpoint);
            tracing::debug!(method = %request.method, %url, "Sending request");

            let result = self
                .http
                .send_request(
                    request.method,
                    &url,
                    &request.headers,
                    &request.params,
                    data.clone(),
                    self.basic_auth(),
                )
                .await;

            match result {
                Ok(response) => {
                    self.resolver.mark_succeeded(host_index);
                    return Ok(response.prepare(self.serializer.as_ref(), request.deserialize));
                }
                Err(ArangoError::Client(ClientError::Connection(msg))) => {
                    self.resolver.mark_failed(host_index);
                    tries += 1;
                    if tries >= max_tries {
                        return Err(ClientError::Connection(format!(
                            "can't connect to host(s) within limit ({}): {}",
                            max_tries, msg
                        ))
                        .into());
                    }

                    if indexes_to_filter.len() + 1 >= host_count {
                        indexes_to_filter.clear();
                    }
                    indexes_to_filter.insert(host_index);
                    host_index = self.resolver.get_host_index(&indexes_to_filter);
                    tracing::warn!(%url, next_host = host_index, "Connection failed, trying another host: {}", msg);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("db_name", &self.db_name)
            .field("url_prefixes", &self.url_prefixes)
            .field("username", &self.username())
            .finish()
    }
}

/// Read the `exp` claim of a JWT without verifying its signature
fn decode_token_exp(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp").and_then(Value::as_i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_jwt, json_response, MockHttpClient};
    use arangokit_core::errno;
    use arangokit_core::resolver::{RoundRobinHostResolver, SingleHostResolver};
    use arangokit_core::serializer::JsonSerializer;

    fn connection(auth: Auth, http: Arc<MockHttpClient>) -> Connection {
        Connection::new(
            &["http://127.0.0.1:8529/".to_string()],
            "test",
            auth,
            Arc::new(SingleHostResolver::new(1, None).unwrap()),
            http,
            Arc::new(JsonSerializer),
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_resolver_host_count_mismatch() {
        let http = Arc::new(MockHttpClient::scripted(vec![]));
        let err = Connection::new(
            &["http://a:8529".to_string(), "http://b:8529".to_string()],
            "test",
            Auth::basic("root", ""),
            Arc::new(SingleHostResolver::new(1, None).unwrap()),
            http.clone(),
            Arc::new(JsonSerializer),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "resolver expects 1 host(s) but 2 were given");
        assert!(http.calls().is_empty());
    }

    #[test]
    fn test_decode_token_exp() {
        let token = fake_jwt(1_700_000_000);
        assert_eq!(decode_token_exp(&token), Some(1_700_000_000));
        assert_eq!(decode_token_exp("not-a-jwt"), None);
    }

    #[test]
    fn test_auth_method_parse() {
        assert_eq!("jwt".parse::<AuthMethod>().unwrap(), AuthMethod::Jwt);
        let err = Auth::from_method("bad_method", "u", "p").unwrap_err();
        assert!(err.to_string().contains("invalid auth_method"));
    }

    #[tokio::test]
    async fn test_basic_auth_and_url_prefix() {
        let http = Arc::new(MockHttpClient::scripted(vec![Ok(json_response(200, json!({"version": "3.11"})))]));
        let conn = connection(Auth::basic("root", "pw"), http.clone());

        let resp = conn.send_request(Request::get("/_api/version")).await.unwrap();
        assert!(resp.is_success);
        assert_eq!(resp.body["version"], "3.11");

        let calls = http.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url, "http://127.0.0.1:8529/_db/test/_api/version");
        assert_eq!(calls[0].auth.as_ref().unwrap().username, "root");
        assert!(!calls[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_superuser_token_header() {
        let http = Arc::new(MockHttpClient::scripted(vec![Ok(json_response(200, json!({})))]));
        let conn = connection(Auth::SuperuserToken("tok".to_string()), http.clone());

        conn.send_request(Request::get("/_api/version")).await.unwrap();
        let calls = http.calls();
        assert_eq!(calls[0].headers.get("authorization").unwrap(), "bearer tok");
        assert!(calls[0].auth.is_none());
        assert_eq!(conn.username(), None);
    }

    #[tokio::test]
    async fn test_jwt_expired_token_refreshes_once() {
        let fresh = fake_jwt(chrono::Utc::now().timestamp() + 3600);
        let http = Arc::new(MockHttpClient::scripted(vec![
            Ok(json_response(200, json!({"jwt": fresh.clone()}))),
            Ok(json_response(200, json!({"version": "3.11"}))),
        ]));
        let conn = connection(Auth::jwt("root", "pw"), http.clone());

        // Simulate a token that already expired
        if let Credential::Jwt { state, .. } = &conn.credential {
            let mut state = state.write();
            state.token = Some(fake_jwt(1000));
            state.exp = Some(1000);
        }

        let resp = conn.send_request(Request::get("/_api/version")).await.unwrap();
        assert!(resp.is_success);

        let calls = http.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].url.ends_with("/_open/auth"));
        assert_eq!(calls[1].headers.get("authorization").unwrap(), &format!("bearer {}", fresh));
    }

    #[tokio::test]
    async fn test_jwt_401_triggers_single_refresh_and_retry() {
        let exp = chrono::Utc::now().timestamp() + 3600;
        let http = Arc::new(MockHttpClient::scripted(vec![
            Ok(json_response(200, json!({"jwt": fake_jwt(exp)}))),
            Ok(json_response(401, json!({"error": true, "errorNum": errno::FORBIDDEN, "errorMessage": "not authorized"}))),
            Ok(json_response(200, json!({"jwt": fake_jwt(exp + 1)}))),
            Ok(json_response(200, json!({"version": "3.11"}))),
        ]));
        let conn = connection(Auth::jwt("root", "pw"), http.clone());
        conn.refresh_token().await.unwrap();

        let resp = conn.send_request(Request::get("/_api/version")).await.unwrap();
        assert!(resp.is_success);
        assert_eq!(http.calls().len(), 4);
        assert_eq!(conn.token(), Some(fake_jwt(exp + 1)));
    }

    #[tokio::test]
    async fn test_jwt_still_rejected_after_refresh_is_auth_error() {
        let exp = chrono::Utc::now().timestamp() + 3600;
        let unauthorized = json!({"error": true, "errorNum": errno::FORBIDDEN, "errorMessage": "not authorized"});
        let http = Arc::new(MockHttpClient::scripted(vec![
            Ok(json_response(200, json!({"jwt": fake_jwt(exp)}))),
            Ok(json_response(401, unauthorized.clone())),
            Ok(json_response(200, json!({"jwt": fake_jwt(exp)}))),
            Ok(json_response(401, unauthorized)),
        ]));
        let conn = connection(Auth::jwt("root", "pw"), http.clone());
        conn.refresh_token().await.unwrap();

        let err = conn.send_request(Request::get("/_api/version")).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::JwtAuth));
        assert_eq!(err.http_code(), Some(401));
        assert_eq!(http.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_jwt_bad_credentials() {
        let http = Arc::new(MockHttpClient::scripted(vec![Ok(json_response(
            401,
            json!({"error": true, "errorNum": errno::HTTP_UNAUTHORIZED, "errorMessage": "Wrong credentials"}),
        ))]));
        let conn = connection(Auth::jwt("root", "bad"), http);

        let err = conn.refresh_token().await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::JwtAuth));
        assert_eq!(err.error_code(), Some(errno::HTTP_UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_jwt_issued_expired_token() {
        let http = Arc::new(MockHttpClient::scripted(vec![Ok(json_response(200, json!({"jwt": fake_jwt(1000)})))]));
        let conn = connection(Auth::jwt("root", "pw"), http);

        let err = conn.refresh_token().await.unwrap_err();
        assert!(matches!(err.client(), Some(ClientError::JwtExpired(_))));
    }

    #[tokio::test]
    async fn test_failover_to_next_host() {
        let http = Arc::new(MockHttpClient::new(|call| {
            if call.url.starts_with("http://a") {
                Err(ClientError::Connection("connection refused".to_string()).into())
            } else {
                Ok(json_response(200, json!({"ok": true})))
            }
        }));
        let conn = Connection::new(
            &["http://a:8529".to_string(), "http://b:8529".to_string()],
            "test",
            Auth::basic("root", ""),
            Arc::new(RoundRobinHostResolver::new(2, None).unwrap()),
            http.clone(),
            Arc::new(JsonSerializer),
        )
        .unwrap();

        let resp = conn.send_request(Request::get("/_api/version")).await.unwrap();
        assert!(resp.is_success);

        let urls: Vec<String> = http.calls().into_iter().map(|c| c.url).collect();
        assert_eq!(urls, vec!["http://a:8529/_db/test/_api/version", "http://b:8529/_db/test/_api/version"]);
    }

    #[tokio::test]
    async fn test_single_host_connection_error_is_not_resent() {
        let http = Arc::new(MockHttpClient::new(|_| {
            Err(ClientError::Connection("connection refused".to_string()).into())
        }));
        let conn = connection(Auth::basic("root", ""), http.clone());

        let err = conn.send_request(Request::get("/_api/version")).await.unwrap_err();
        assert!(err.to_string().contains("can't connect to host(s) within limit (1)"));
        assert_eq!(http.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_ping() {
        let http = Arc::new(MockHttpClient::scripted(vec![
            Ok(json_response(200, json!({"result": []}))),
            Ok(json_response(401, json!({"error": true, "errorNum": 401, "errorMessage": "unauthorized"}))),
            Ok(json_response(404, json!({"error": true, "errorNum": errno::DATABASE_NOT_FOUND, "errorMessage": "database not found"}))),
        ]));
        let conn = connection(Auth::basic("root", ""), http);

        assert_eq!(conn.ping().await.unwrap(), 200);
        assert_eq!(conn.ping().await.unwrap_err().to_string(), "bad username and/or password");
        assert_eq!(conn.ping().await.unwrap_err().to_string(), "database not found");
    }

    #[tokio::test]
    async fn test_ping_bad_connection() {
        let http = Arc::new(MockHttpClient::new(|_| {
            Err(ClientError::Connection("connection refused".to_string()).into())
        }));
        let conn = connection(Auth::basic("root", ""), http);

        let err = conn.ping().await.unwrap_err();
        assert!(matches!(err.client(), Some(ClientError::ServerConnection(_))));
        assert!(err.to_string().contains("bad connection"));
    }
}
