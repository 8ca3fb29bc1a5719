//! REST transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use syncdeck_types::{Params, SourceConfig};

use super::{http_client, query_value, read_payload, request_headers, Transport};
use crate::SourceError;

/// Issues the configured HTTP request with params as the query string.
#[derive(Debug, Clone)]
pub struct RestTransport {
    client: Client,
}

impl RestTransport {
    /// Create a transport with its own client and the given request timeout.
    pub fn new(timeout: Duration) -> Self {
        Self::with_client(http_client(timeout))
    }

    /// Share an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for RestTransport {
    async fn fetch(&self, config: &SourceConfig, params: &Params) -> Result<Value, SourceError> {
        if config.endpoint.is_empty() {
            return Err(SourceError::InvalidConfig(format!(
                "source '{}' has no endpoint",
                config.id
            )));
        }

        let method = Method::from_bytes(config.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| SourceError::InvalidConfig(format!("bad method '{}'", config.method)))?;

        let query: Vec<(&str, String)> = params
            .iter()
            .map(|(name, value)| (name.as_str(), query_value(value)))
            .collect();

        let mut request = self
            .client
            .request(method.clone(), &config.endpoint)
            .query(&query);

        for (name, value) in request_headers(config) {
            request = request.header(name, value);
        }

        if method != Method::GET && method != Method::HEAD {
            if let Some(body) = &config.body {
                request = request.json(body);
            }
        }

        let response = request.send().await?;
        read_payload(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use syncdeck_types::{Auth, SourceKind};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> RestTransport {
        RestTransport::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn sends_params_headers_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/kpis"))
            .and(query_param("range", "30d"))
            .and(query_param("limit", "10"))
            .and(header("X-Team", "growth"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"mrr": 1200})))
            .expect(1)
            .mount(&server)
            .await;

        let config = SourceConfig::new("kpis", SourceKind::Rest)
            .endpoint(format!("{}/kpis", server.uri()))
            .param("range", "30d")
            .header("X-Team", "growth")
            .auth(Auth::Bearer {
                token: "secret".into(),
            });

        let mut params = config.params.clone();
        params.insert("limit".into(), json!(10));

        let data = transport().fetch(&config, &params).await.unwrap();
        assert_eq!(data, json!({"mrr": 1200}));
    }

    #[tokio::test]
    async fn posts_configured_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_json(json!({"term": "seed"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2])))
            .expect(1)
            .mount(&server)
            .await;

        let config = SourceConfig::new("search", SourceKind::Rest)
            .endpoint(format!("{}/search", server.uri()))
            .method("post")
            .body(json!({"term": "seed"}));

        let data = transport().fetch(&config, &Params::new()).await.unwrap();
        assert_eq!(data, json!([1, 2]));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let config = SourceConfig::new("s", SourceKind::Rest).endpoint(server.uri());
        let err = transport().fetch(&config, &Params::new()).await.unwrap_err();

        match err {
            SourceError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "down");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn plain_text_body_becomes_string() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let config = SourceConfig::new("s", SourceKind::Rest).endpoint(server.uri());
        let data = transport().fetch(&config, &Params::new()).await.unwrap();
        assert_eq!(data, json!("ok"));
    }

    #[tokio::test]
    async fn missing_endpoint_is_invalid_config() {
        let config = SourceConfig::new("s", SourceKind::Rest);
        let err = transport().fetch(&config, &Params::new()).await.unwrap_err();
        assert!(matches!(err, SourceError::InvalidConfig(_)));
    }
}
