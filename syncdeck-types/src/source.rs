//! Data source configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Call-time and configured parameters, merged by key.
///
/// A `BTreeMap` keeps parameters in a canonical order so that query strings
/// and cache keys are stable across calls.
pub type Params = BTreeMap<String, Value>;

/// Transport used to reach a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Plain HTTP request, params sent as query string.
    #[default]
    Rest,
    /// GraphQL POST of `{query, variables}`.
    Graphql,
    /// Single-shot WebSocket request: first message wins.
    Websocket,
    /// Configured body returned verbatim.
    Static,
    /// Produced locally by a named transform.
    Computed,
}

impl SourceKind {
    /// Whether fetching this kind of source performs network I/O.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Rest | Self::Graphql | Self::Websocket)
    }
}

/// Credentials attached to outgoing requests.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Auth {
    #[default]
    None,
    Bearer {
        token: String,
    },
    /// Raw key, sent in `Authorization` unless `header` names another header.
    ApiKey {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        header: Option<String>,
    },
    Basic {
        username: String,
        password: String,
    },
    /// Pre-obtained access token, sent as a bearer token. No refresh flow.
    OAuth2 {
        access_token: String,
    },
}

impl Auth {
    /// Token usable for a bearer-style handshake, if these credentials carry one.
    pub fn token(&self) -> Option<&str> {
        match self {
            Auth::Bearer { token } => Some(token),
            Auth::OAuth2 { access_token } => Some(access_token),
            _ => None,
        }
    }
}

/// Periodic re-fetch settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Interval between polls in milliseconds.
    #[serde(default)]
    pub interval_ms: u64,
}

impl PollingConfig {
    /// Poll every `interval`.
    pub fn every(interval: Duration) -> Self {
        Self {
            enabled: true,
            interval_ms: interval.as_millis() as u64,
        }
    }

    /// The polling period, or `None` when polling is off or the interval is zero.
    pub fn interval(&self) -> Option<Duration> {
        (self.enabled && self.interval_ms > 0).then(|| Duration::from_millis(self.interval_ms))
    }
}

/// Spacing strategy between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay before every retry.
    #[default]
    Linear,
    /// Delay doubles with each consecutive failure.
    Exponential,
}

/// Retry policy for failed fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first failure.
    pub attempts: u32,
    /// Base delay in milliseconds.
    pub delay_ms: u64,
    #[serde(default)]
    pub backoff: Backoff,
}

impl RetryConfig {
    pub fn linear(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay_ms: delay.as_millis() as u64,
            backoff: Backoff::Linear,
        }
    }

    pub fn exponential(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay_ms: delay.as_millis() as u64,
            backoff: Backoff::Exponential,
        }
    }

    /// Delay before the next retry given the number of consecutive failures
    /// so far (the failure just observed included).
    ///
    /// Returns `None` once `failures` exceeds `attempts`, meaning the failure
    /// must be surfaced to the caller.
    pub fn delay_for(&self, failures: u32) -> Option<Duration> {
        if failures == 0 || failures > self.attempts {
            return None;
        }
        let millis = match self.backoff {
            Backoff::Linear => self.delay_ms,
            Backoff::Exponential => {
                let factor = 1u64.checked_shl(failures - 1).unwrap_or(u64::MAX);
                self.delay_ms.saturating_mul(factor)
            }
        };
        Some(Duration::from_millis(millis))
    }
}

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Time-to-live in seconds.
    #[serde(default)]
    pub ttl_secs: u64,
    /// Keep one entry per distinct parameter set instead of one per source.
    #[serde(default)]
    pub vary_by_params: bool,
}

impl CacheConfig {
    /// Cache responses for `ttl`.
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            enabled: true,
            ttl_secs: ttl.as_secs(),
            vary_by_params: false,
        }
    }

    pub fn ttl_duration(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Identity and transport description of a single data source.
///
/// Configurations are immutable once registered; registering the same id
/// again replaces the previous configuration.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use syncdeck_types::{Auth, CacheConfig, RetryConfig, SourceConfig, SourceKind};
///
/// let config = SourceConfig::new("kpis", SourceKind::Rest)
///     .endpoint("https://api.example.com/kpis")
///     .auth(Auth::Bearer { token: "secret".into() })
///     .cache(CacheConfig::ttl(Duration::from_secs(60)))
///     .retry(RetryConfig::exponential(3, Duration::from_millis(100)));
///
/// assert_eq!(config.method, "GET");
/// assert!(config.cache.enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub params: Params,
    /// Request body (REST), query text (GraphQL), request frame (WebSocket)
    /// or the payload itself (static).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    /// Name of a transform registered with the source registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_method() -> String {
    "GET".to_string()
}

impl SourceConfig {
    /// Create a configuration with defaults for everything but id and kind.
    pub fn new(id: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            endpoint: String::new(),
            method: default_method(),
            headers: BTreeMap::new(),
            params: Params::new(),
            body: None,
            auth: Auth::None,
            polling: PollingConfig::default(),
            retry: None,
            transform: None,
            cache: CacheConfig::default(),
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    pub fn polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn transform(mut self, name: impl Into<String>) -> Self {
        self.transform = Some(name.into());
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}
