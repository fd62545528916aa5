//! Transport capability
//!
//! [`HttpClient`] is the only place the crate touches the network. The default
//! implementation runs on a pooled `reqwest` client and retries requests that
//! failed to connect; anything that produced an HTTP response is returned as-is.

use async_trait::async_trait;
use rand::Rng;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{ClientError, Result};
use crate::request::Method;
use crate::response::Response;

/// Credentials for HTTP basic authentication
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Sends one HTTP request and returns the raw response
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send_request(
        &self,
        method: Method,
        url: &str,
        headers: &BTreeMap<String, String>,
        params: &BTreeMap<String, String>,
        data: Option<String>,
        auth: Option<&BasicAuth>,
    ) -> Result<Response>;
}

/// Transport-level retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Maximum jitter as a fraction of the delay (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let delay = Duration::from_millis(base as u64).min(self.max_delay);

        if self.jitter_factor <= 0.0 {
            return delay;
        }

        let range = delay.as_millis() as f64 * self.jitter_factor;
        let jitter = rand::thread_rng().gen_range(-range..=range);
        Duration::from_millis((delay.as_millis() as f64 + jitter).max(0.0) as u64)
    }
}

/// Default transport backed by `reqwest`
#[derive(Debug, Clone)]
pub struct DefaultHttpClient {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl DefaultHttpClient {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new() -> Result<Self> {
        Self::with_options(Self::REQUEST_TIMEOUT, RetryPolicy::default())
    }

    pub fn with_options(timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Connection(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, retry })
    }

    fn build(
        &self,
        method: Method,
        url: &str,
        headers: &BTreeMap<String, String>,
        params: &BTreeMap<String, String>,
        data: Option<&String>,
        auth: Option<&BasicAuth>,
    ) -> reqwest::RequestBuilder {
        let method = match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
        };

        let mut builder = self.client.request(method, url);
        if !params.is_empty() {
            builder = builder.query(params);
        }
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(auth) = auth {
            builder = builder.basic_auth(&auth.username, Some(&auth.password));
        }
        if let Some(body) = data {
            builder = builder.body(body.clone());
        }
        builder
    }
}

#[async_trait]
impl HttpClient for DefaultHttpClient {
    async fn send_request(
        &self,
        method: Method,
        url: &str,
        headers: &BTreeMap<String, String>,
        params: &BTreeMap<String, String>,
        data: Option<String>,
        auth: Option<&BasicAuth>,
    ) -> Result<Response> {
        let mut attempt = 0;
        let response = loop {
            let builder = self.build(method, url, headers, params, data.as_ref(), auth);
            match builder.send().await {
                Ok(response) => break response,
                Err(e) if e.is_connect() && attempt < self.retry.retries => {
                    let delay = self.retry.calculate_delay(attempt);
                    tracing::debug!(%url, attempt, ?delay, "Connect failed, retrying: {}", e);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(ClientError::Connection(format!("request to {} failed: {}", url, e)).into());
                }
            }
        };

        let status = response.status();
        let final_url = response.url().to_string();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Connection(format!("failed to read response body: {}", e)))?;

        Ok(Response::new(
            method,
            final_url,
            headers,
            status.as_u16(),
            status.canonical_reason().unwrap_or_default(),
            body,
        ))
    }
}
