//! GraphQL transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use syncdeck_types::{Params, SourceConfig};

use super::{http_client, read_payload, request_headers, Transport};
use crate::SourceError;

/// POSTs `{query, variables}` to the endpoint and returns the `data` member.
///
/// The query text is the source's `body`. A non-empty `errors` array fails
/// the request even when the HTTP status is 200.
#[derive(Debug, Clone)]
pub struct GraphqlTransport {
    client: Client,
}

impl GraphqlTransport {
    pub fn new(timeout: Duration) -> Self {
        Self::with_client(http_client(timeout))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    #[serde(default)]
    message: String,
}

#[async_trait]
impl Transport for GraphqlTransport {
    async fn fetch(&self, config: &SourceConfig, params: &Params) -> Result<Value, SourceError> {
        let query = match &config.body {
            Some(Value::String(query)) => query.clone(),
            Some(_) => {
                return Err(SourceError::InvalidConfig(format!(
                    "source '{}' body must be a GraphQL query string",
                    config.id
                )))
            }
            None => {
                return Err(SourceError::InvalidConfig(format!(
                    "source '{}' has no GraphQL query",
                    config.id
                )))
            }
        };

        let mut request = self
            .client
            .post(&config.endpoint)
            .json(&json!({ "query": query, "variables": params }));

        for (name, value) in request_headers(config) {
            request = request.header(name, value);
        }

        let payload = read_payload(request.send().await?).await?;
        let response: GraphqlResponse =
            serde_json::from_value(payload).map_err(|e| SourceError::Parse(e.to_string()))?;

        if !response.errors.is_empty() {
            let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
            return Err(SourceError::GraphQl(messages.join("; ")));
        }

        Ok(response.data.unwrap_or(Value::Null))
    }
}
