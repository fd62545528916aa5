use std::sync::Arc;

use arangokit_core::config::ClientConfig;
use arangokit_core::error::Result;
use arangokit_core::http::{DefaultHttpClient, HttpClient};
use arangokit_core::resolver::{build_resolver, HostResolver};
use arangokit_core::serializer::{JsonSerializer, Serializer};

use crate::connection::{Auth, Connection};
use crate::database::StandardDatabase;

/// Entry point: holds the host list, resolver, transport and serializer
/// shared by every database handle it creates
#[derive(Clone)]
pub struct ArangoClient {
    hosts: Vec<String>,
    resolver: Arc<dyn HostResolver>,
    http: Arc<dyn HttpClient>,
    serializer: Arc<dyn Serializer>,
    exp_leeway: i64,
}

impl ArangoClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let hosts = config.normalized_hosts();
        let resolver = build_resolver(
            config.resolver_kind()?,
            hosts.len(),
            config.max_tries,
            config.health_cooldown(),
        )?;
        let http = DefaultHttpClient::with_options(config.request_timeout(), config.retry_policy())?;

        tracing::debug!(hosts = ?hosts, resolver = %config.host_resolver, "Client created");
        Ok(Self {
            hosts,
            resolver,
            http: Arc::new(http),
            serializer: Arc::new(JsonSerializer),
            exp_leeway: config.jwt_exp_leeway_secs,
        })
    }

    /// Replace the transport
    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = http;
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Connect to database `name`
    ///
    /// JWT credentials are exchanged for a token right away. With `verify`
    /// the server is pinged so bad hosts or credentials fail here.
    pub async fn db(&self, name: &str, auth: Auth, verify: bool) -> Result<StandardDatabase> {
        let conn = Connection::new(
            &self.hosts,
            name,
            auth,
            self.resolver.clone(),
            self.http.clone(),
            self.serializer.clone(),
        )?
        .with_exp_leeway(self.exp_leeway);

        conn.refresh_token().await?;
        if verify {
            conn.ping().await?;
        }

        tracing::info!(db = %name, "Database connection ready");
        Ok(StandardDatabase::new(Arc::new(conn)))
    }
}

impl std::fmt::Debug for ArangoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<ArangoClient {}>", self.hosts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_jwt, json_response, MockHttpClient};
    use serde_json::json;

    #[test]
    fn test_new_from_config() {
        let client = ArangoClient::new(ClientConfig::new("http://a:8529/,http://b:8529")).unwrap();
        assert_eq!(client.hosts(), ["http://a:8529", "http://b:8529"]);

        let err = ArangoClient::new(ClientConfig::new("http://a:8529").with_host_resolver("nope")).unwrap_err();
        assert!(err.to_string().contains("invalid host_resolver"));

        let err = ArangoClient::new(ClientConfig::new("http://a:8529,http://b:8529").with_max_tries(1)).unwrap_err();
        assert!(err.is_client());
    }

    #[tokio::test]
    async fn test_db_with_jwt_and_verify() {
        let exp = chrono::Utc::now().timestamp() + 3600;
        let http = Arc::new(MockHttpClient::scripted(vec![
            Ok(json_response(200, json!({"jwt": fake_jwt(exp)}))),
            Ok(json_response(200, json!({"result": []}))),
        ]));
        let client = ArangoClient::new(ClientConfig::default())
            .unwrap()
            .with_http_client(http.clone());

        let db = client.db("test", Auth::jwt("root", "pw"), true).await.unwrap();
        assert_eq!(db.name(), "test");
        assert_eq!(db.conn().token(), Some(fake_jwt(exp)));

        let calls = http.calls();
        assert_eq!(calls[0].url, "http://127.0.0.1:8529/_db/test/_open/auth");
        assert_eq!(
            calls[1].headers.get("authorization"),
            Some(&format!("bearer {}", fake_jwt(exp)))
        );
    }

    #[tokio::test]
    async fn test_db_verify_rejects_bad_credentials() {
        let http = Arc::new(MockHttpClient::scripted(vec![Ok(json_response(
            401,
            json!({"error": true, "errorNum": 401, "errorMessage": "not authorized"}),
        ))]));
        let client = ArangoClient::new(ClientConfig::default())
            .unwrap()
            .with_http_client(http);

        let err = client.db("test", Auth::basic("root", "bad"), true).await.unwrap_err();
        assert_eq!(err.to_string(), "bad username and/or password");
    }
}
