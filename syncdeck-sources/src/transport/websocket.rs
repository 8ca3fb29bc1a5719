//! Single-shot WebSocket transport.
//!
//! Opens a connection, optionally authenticates, sends the configured request
//! frame and resolves with the first data frame. The socket is always closed
//! afterwards; this is a request, not a subscription.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use syncdeck_types::{Params, SourceConfig};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::Transport;
use crate::{SourceError, MAX_WAIT};

/// Watchdog for the whole exchange, handshake included.
pub const DEFAULT_WS_TIMEOUT: Duration = Duration::from_secs(30);

const CLOSE_GRACE: Duration = Duration::from_secs(1);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    timeout: Duration,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_WS_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: timeout.min(MAX_WAIT),
        }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn fetch(&self, config: &SourceConfig, _params: &Params) -> Result<Value, SourceError> {
        let mut request = config.endpoint.as_str().into_client_request()?;
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SourceError::InvalidConfig(e.to_string()))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| SourceError::InvalidConfig(e.to_string()))?;
            request.headers_mut().insert(name, value);
        }

        let deadline = Instant::now() + self.timeout;
        let (mut socket, _) = timeout_at(deadline, connect_async(request))
            .await
            .map_err(|_| SourceError::Timeout)??;

        let result = timeout_at(deadline, exchange(&mut socket, config))
            .await
            .unwrap_or(Err(SourceError::Timeout));

        if timeout(CLOSE_GRACE, socket.close(None)).await.is_err() {
            debug!(source = %config.id, "WebSocket close did not complete");
        }

        result
    }
}

async fn exchange(socket: &mut Socket, config: &SourceConfig) -> Result<Value, SourceError> {
    if let Some(token) = config.auth.token() {
        let frame = json!({ "type": "auth", "token": token }).to_string();
        socket.send(Message::Text(frame)).await?;
    }

    if let Some(body) = &config.body {
        let frame = match body {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        socket.send(Message::Text(frame)).await?;
    }

    while let Some(message) = socket.next().await {
        match message? {
            Message::Text(text) => {
                return Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)));
            }
            Message::Binary(bytes) => {
                return serde_json::from_slice(&bytes).map_err(|e| SourceError::Parse(e.to_string()));
            }
            Message::Close(_) => break,
            _ => continue,
        }
    }

    Err(SourceError::WebSocket(
        "connection closed before first message".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use syncdeck_types::{Auth, SourceKind};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::accept_async;

    #[test]
    fn watchdog_is_clamped_to_clock_range() {
        assert_eq!(WebSocketTransport::with_timeout(Duration::MAX).timeout, MAX_WAIT);
        assert_eq!(
            WebSocketTransport::with_timeout(Duration::from_secs(5)).timeout,
            Duration::from_secs(5)
        );
    }

    async fn serve_once<F, Fut>(handler: F) -> String
    where
        F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            handler(ws).await;
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn sends_auth_and_request_then_resolves_on_first_message() {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        let url = serve_once(move |mut ws| async move {
            for _ in 0..2 {
                if let Some(Ok(Message::Text(text))) = ws.next().await {
                    seen_tx.send(text).unwrap();
                }
            }
            ws.send(Message::Text(r#"{"active_users": 42}"#.to_string()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"ignored": true}"#.to_string()))
                .await
                .ok();
            while ws.next().await.is_some() {}
        })
        .await;

        let config = SourceConfig::new("live", SourceKind::Websocket)
            .endpoint(url)
            .auth(Auth::Bearer { token: "tok".into() })
            .body(json!({"subscribe": "users"}));

        let data = WebSocketTransport::new()
            .fetch(&config, &Params::new())
            .await
            .unwrap();
        assert_eq!(data, json!({"active_users": 42}));

        let auth: Value = serde_json::from_str(&seen_rx.recv().await.unwrap()).unwrap();
        assert_eq!(auth, json!({"type": "auth", "token": "tok"}));
        let request: Value = serde_json::from_str(&seen_rx.recv().await.unwrap()).unwrap();
        assert_eq!(request, json!({"subscribe": "users"}));
    }

    #[tokio::test]
    async fn times_out_when_no_message_arrives() {
        let url = serve_once(|mut ws| async move { while ws.next().await.is_some() {} }).await;

        let config = SourceConfig::new("quiet", SourceKind::Websocket).endpoint(url);
        let err = WebSocketTransport::with_timeout(Duration::from_millis(200))
            .fetch(&config, &Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Timeout));
    }

    #[tokio::test]
    async fn close_before_data_is_an_error() {
        let url = serve_once(|mut ws| async move {
            ws.close(None).await.ok();
        })
        .await;

        let config = SourceConfig::new("closed", SourceKind::Websocket).endpoint(url);
        let err = WebSocketTransport::with_timeout(Duration::from_secs(5))
            .fetch(&config, &Params::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SourceError::WebSocket(_) | SourceError::Connection(_)
        ));
    }
}
