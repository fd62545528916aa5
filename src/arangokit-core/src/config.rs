use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

use crate::error::Result;
use crate::http::RetryPolicy;
use crate::resolver::ResolverKind;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Server URLs; a single comma-separated string is accepted as well
    #[serde(default = "default_hosts", deserialize_with = "deserialize_hosts")]
    pub hosts: Vec<String>,

    /// "single", "roundrobin", "random" or "health"
    #[serde(default = "default_host_resolver")]
    pub host_resolver: String,

    /// Attempts per request across hosts (defaults to the host count)
    #[serde(default)]
    pub max_tries: Option<usize>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    // Transport-level retries on connect failures
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,

    /// How long the health-aware resolver avoids a failed host
    #[serde(default = "default_health_cooldown_secs")]
    pub health_cooldown_secs: u64,

    /// Seconds subtracted from a JWT's expiry before it is considered stale
    #[serde(default)]
    pub jwt_exp_leeway_secs: i64,
}

fn default_hosts() -> Vec<String> {
    vec!["http://127.0.0.1:8529".to_string()]
}

fn default_host_resolver() -> String {
    "roundrobin".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_initial_delay_ms() -> u64 {
    100
}

fn default_health_cooldown_secs() -> u64 {
    30
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HostsField {
    Joined(String),
    List(Vec<String>),
}

fn deserialize_hosts<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match HostsField::deserialize(deserializer)? {
        HostsField::Joined(joined) => split_hosts(&joined),
        HostsField::List(list) => list,
    })
}

/// Split a comma-separated host list, dropping blanks
pub fn split_hosts(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

impl ClientConfig {
    pub fn new(hosts: &str) -> Self {
        Self {
            hosts: split_hosts(hosts),
            ..Self::default()
        }
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ClientConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn with_host_resolver(mut self, name: impl Into<String>) -> Self {
        self.host_resolver = name.into();
        self
    }

    pub fn with_max_tries(mut self, max_tries: usize) -> Self {
        self.max_tries = Some(max_tries);
        self
    }

    /// Host URLs without trailing slashes
    pub fn normalized_hosts(&self) -> Vec<String> {
        self.hosts
            .iter()
            .map(|h| h.trim_end_matches('/').to_string())
            .collect()
    }

    pub fn resolver_kind(&self) -> Result<ResolverKind> {
        Ok(self.host_resolver.parse::<ResolverKind>()?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn health_cooldown(&self) -> Duration {
        Duration::from_secs(self.health_cooldown_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_retries(self.retry_attempts)
            .with_initial_delay(Duration::from_millis(self.retry_initial_delay_ms))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hosts: default_hosts(),
            host_resolver: default_host_resolver(),
            max_tries: None,
            request_timeout_secs: default_request_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            health_cooldown_secs: default_health_cooldown_secs(),
            jwt_exp_leeway_secs: 0,
        }
    }
}
