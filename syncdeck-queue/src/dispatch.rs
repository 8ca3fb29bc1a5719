//! Delivery of queued writes to the backend.

use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use syncdeck_types::QueueItem;

use crate::QueueError;

/// Sends one queued item to wherever its `type` says it belongs.
///
/// An `Err` counts as a failed attempt against the item's retries.
#[async_trait]
pub trait Dispatcher: Send + Sync + Debug {
    async fn dispatch(&self, item: &QueueItem) -> Result<(), QueueError>;
}

/// Dispatcher that POSTs the item payload as JSON.
///
/// Each item type maps to a path under the base URL.
///
/// # Example
///
/// ```rust
/// use syncdeck_queue::HttpDispatcher;
///
/// let dispatcher = HttpDispatcher::builder()
///     .base_url("https://api.example.com")
///     .endpoint("kpi_update", "/api/kpis")
///     .endpoint("goal_update", "/api/goals")
///     .token("secret")
///     .build();
///
/// assert_eq!(
///     dispatcher.url_for("kpi_update").as_deref(),
///     Some("https://api.example.com/api/kpis")
/// );
/// ```
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: Client,
    base_url: String,
    endpoints: HashMap<String, String>,
    token: Option<String>,
}

impl HttpDispatcher {
    pub fn builder() -> HttpDispatcherBuilder {
        HttpDispatcherBuilder::default()
    }

    /// Full URL for an item type, if the type is known.
    pub fn url_for(&self, kind: &str) -> Option<String> {
        let path = self.endpoints.get(kind)?;
        if path.starts_with("http://") || path.starts_with("https://") {
            return Some(path.clone());
        }
        Some(format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        ))
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, item: &QueueItem) -> Result<(), QueueError> {
        let url = self
            .url_for(&item.kind)
            .ok_or_else(|| QueueError::UnknownType(item.kind.clone()))?;

        let mut request = self.client.post(&url).json(&item.payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueueError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Builder for HttpDispatcher.
#[derive(Debug, Default)]
pub struct HttpDispatcherBuilder {
    base_url: Option<String>,
    endpoints: HashMap<String, String>,
    token: Option<String>,
    timeout: Option<Duration>,
}

impl HttpDispatcherBuilder {
    /// Set the base URL that relative endpoint paths are joined onto.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Route items of `kind` to `path`.
    pub fn endpoint(mut self, kind: impl Into<String>, path: impl Into<String>) -> Self {
        self.endpoints.insert(kind.into(), path.into());
        self
    }

    pub fn endpoints<I, K, P>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = (K, P)>,
        K: Into<String>,
        P: Into<String>,
    {
        self.endpoints
            .extend(endpoints.into_iter().map(|(k, p)| (k.into(), p.into())));
        self
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> HttpDispatcher {
        let timeout = self.timeout.unwrap_or(Duration::from_secs(10));
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        HttpDispatcher {
            client,
            base_url: self.base_url.unwrap_or_default(),
            endpoints: self.endpoints,
            token: self.token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use syncdeck_types::NewQueueItem;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn item(kind: &str) -> QueueItem {
        NewQueueItem::new(kind, json!({"kpi": "mrr", "value": 42})).into_item("id-1".into(), 0)
    }

    #[test]
    fn url_for_joins_base_and_path() {
        let dispatcher = HttpDispatcher::builder()
            .base_url("https://api.example.com/")
            .endpoint("kpi_update", "api/kpis")
            .endpoint("external", "https://hooks.example.com/x")
            .build();

        assert_eq!(
            dispatcher.url_for("kpi_update").as_deref(),
            Some("https://api.example.com/api/kpis")
        );
        assert_eq!(
            dispatcher.url_for("external").as_deref(),
            Some("https://hooks.example.com/x")
        );
        assert_eq!(dispatcher.url_for("unknown"), None);
    }

    #[tokio::test]
    async fn posts_payload_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/kpis"))
            .and(header("Authorization", "Bearer secret"))
            .and(body_json(json!({"kpi": "mrr", "value": 42})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = HttpDispatcher::builder()
            .base_url(server.uri())
            .endpoint("kpi_update", "/api/kpis")
            .token("secret")
            .build();

        dispatcher.dispatch(&item("kpi_update")).await.unwrap();
    }

    #[tokio::test]
    async fn error_status_fails_the_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let dispatcher = HttpDispatcher::builder()
            .base_url(server.uri())
            .endpoint("kpi_update", "/api/kpis")
            .build();

        let err = dispatcher.dispatch(&item("kpi_update")).await.unwrap_err();
        match err {
            QueueError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_type_fails_without_request() {
        let dispatcher = HttpDispatcher::builder()
            .base_url("http://127.0.0.1:1")
            .build();

        let err = dispatcher.dispatch(&item("mystery")).await.unwrap_err();
        assert!(matches!(err, QueueError::UnknownType(kind) if kind == "mystery"));
    }
}
