//! Network transports.
//!
//! Each remote [`SourceKind`](syncdeck_types::SourceKind) is served by a
//! [`Transport`]. The registry owns one of each and picks by kind; static and
//! computed sources never reach a transport.
//!
//! ## Adding a transport
//!
//! Implement [`Transport`] and hand it to the matching
//! [`SourceRegistryBuilder`](crate::SourceRegistryBuilder) setter. Tests use
//! this to replace the network with scripted responses.

mod graphql;
mod rest;
mod websocket;

pub use graphql::GraphqlTransport;
pub use rest::RestTransport;
pub use websocket::WebSocketTransport;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use syncdeck_types::{Params, SourceConfig};

use crate::auth::auth_header;
use crate::SourceError;

/// Default request timeout for HTTP transports.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Performs one request for a source.
///
/// `params` are the configured params already merged with the call-time
/// ones. Cancellation is by drop: the registry drops the future when a newer
/// request for the same source supersedes it.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn fetch(&self, config: &SourceConfig, params: &Params) -> Result<Value, SourceError>;
}

/// One transport per remote source kind.
#[derive(Debug, Clone)]
pub(crate) struct Transports {
    pub rest: Arc<dyn Transport>,
    pub graphql: Arc<dyn Transport>,
    pub websocket: Arc<dyn Transport>,
}

impl Default for Transports {
    fn default() -> Self {
        let client = http_client(DEFAULT_HTTP_TIMEOUT);
        Self {
            rest: Arc::new(RestTransport::with_client(client.clone())),
            graphql: Arc::new(GraphqlTransport::with_client(client)),
            websocket: Arc::new(WebSocketTransport::new()),
        }
    }
}

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Render a param value for a query string.
pub(crate) fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Configured headers followed by the auth header, which wins on conflict.
pub(crate) fn request_headers(config: &SourceConfig) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = config
        .headers
        .iter()
        .filter(|(name, _)| {
            auth_header(&config.auth).map_or(true, |(auth, _)| !auth.eq_ignore_ascii_case(name))
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    headers.extend(auth_header(&config.auth));
    headers
}

/// Turn an HTTP response into a payload, failing on non-2xx.
///
/// Bodies that are not JSON come back as a JSON string; empty bodies as null.
pub(crate) async fn read_payload(response: reqwest::Response) -> Result<Value, SourceError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(SourceError::Status {
            status: status.as_u16(),
            body: truncate(text, 512),
        });
    }

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

fn truncate(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push('…');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use syncdeck_types::{Auth, SourceKind};

    #[test]
    fn query_values_render_without_json_quotes() {
        assert_eq!(query_value(&json!("growth")), "growth");
        assert_eq!(query_value(&json!(3)), "3");
        assert_eq!(query_value(&json!(true)), "true");
        assert_eq!(query_value(&Value::Null), "");
    }

    #[test]
    fn auth_header_overrides_configured_authorization() {
        let config = SourceConfig::new("s", SourceKind::Rest)
            .header("authorization", "stale")
            .header("X-Team", "growth")
            .auth(Auth::Bearer { token: "t".into() });

        let headers = request_headers(&config);
        assert_eq!(
            headers,
            vec![
                ("X-Team".to_string(), "growth".to_string()),
                ("Authorization".to_string(), "Bearer t".to_string()),
            ]
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "é".repeat(10);
        let cut = truncate(text, 3);
        assert_eq!(cut, "é…");
    }
}
