//! Outbound delivery of packed messages.
//!
//! A transport takes packed bytes and an endpoint and optionally yields a
//! packed response received on the same exchange.

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, StatusCode};
use staticagent_common::types::WIRE_CONTENT_TYPE;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while delivering a packed message.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint answered with a status other than 200 or 202.
    #[error("error while sending message: status {0}")]
    Status(u16),
    /// HTTP client failure.
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    /// Websocket failure.
    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    /// Endpoint scheme is not handled by this transport.
    #[error("unsupported endpoint: {0}")]
    UnsupportedEndpoint(String),
    /// Any other failure, e.g. from a custom transport.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// HTTP status code, if the failure came from a response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result of one delivery: the synchronous response body, if any.
pub type TransportResult = Result<Option<Vec<u8>>, TransportError>;

/// Sends packed messages to an endpoint.
pub trait Transport: Send + Sync {
    /// Deliver `packed` to `endpoint`.
    fn send<'a>(&'a self, packed: Vec<u8>, endpoint: &'a str) -> BoxFuture<'a, TransportResult>;
}

/// Transport backed by a closure.
pub struct FnTransport<F> {
    f: F,
}

/// Adapt an async closure into a [`Transport`].
pub fn transport_fn<F, Fut>(f: F) -> FnTransport<F>
where
    F: Fn(Vec<u8>, String) -> Fut + Send + Sync,
    Fut: Future<Output = TransportResult> + Send + 'static,
{
    FnTransport { f }
}

impl<F, Fut> Transport for FnTransport<F>
where
    F: Fn(Vec<u8>, String) -> Fut + Send + Sync,
    Fut: Future<Output = TransportResult> + Send + 'static,
{
    fn send<'a>(&'a self, packed: Vec<u8>, endpoint: &'a str) -> BoxFuture<'a, TransportResult> {
        (self.f)(packed, endpoint.to_string()).boxed()
    }
}

/// HTTP POST transport.
///
/// 202 means accepted without a body, 200 may carry a response envelope.
/// Any other status is an error.
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    /// Transport with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Http`] if the client cannot be built.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Transport whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Http`] if the client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            http: Client::builder()
                .redirect(reqwest::redirect::Policy::limited(5))
                .timeout(timeout)
                .build()?,
        })
    }

    async fn post(&self, packed: Vec<u8>, endpoint: &str) -> TransportResult {
        let resp = self
            .http
            .post(endpoint)
            .header(reqwest::header::CONTENT_TYPE, WIRE_CONTENT_TYPE)
            .body(packed)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        interpret_response(status, &body)
    }
}

fn interpret_response(status: StatusCode, body: &[u8]) -> TransportResult {
    match status {
        StatusCode::ACCEPTED => {
            debug!(status = %status, "message accepted");
            Ok(None)
        }
        StatusCode::OK if body.is_empty() => Ok(None),
        StatusCode::OK => {
            debug!(status = %status, len = body.len(), "response received");
            Ok(Some(body.to_vec()))
        }
        other => {
            warn!(status = %other, "endpoint rejected message");
            Err(TransportError::Status(other.as_u16()))
        }
    }
}

impl Transport for HttpTransport {
    fn send<'a>(&'a self, packed: Vec<u8>, endpoint: &'a str) -> BoxFuture<'a, TransportResult> {
        self.post(packed, endpoint).boxed()
    }
}

/// One-shot websocket transport.
///
/// Opens a socket per message, sends one binary frame and returns the
/// first binary frame received. A peer that closes first, or stays silent
/// for the reply timeout, has sent no reply.
#[derive(Debug, Clone)]
pub struct WsTransport {
    reply_timeout: Duration,
}

impl Default for WsTransport {
    fn default() -> Self {
        Self {
            reply_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl WsTransport {
    /// Transport waiting at most `reply_timeout` for a reply frame.
    #[must_use]
    pub fn new(reply_timeout: Duration) -> Self {
        Self { reply_timeout }
    }

    async fn exchange(&self, packed: Vec<u8>, endpoint: &str) -> TransportResult {
        let (ws, _) = tokio_tungstenite::connect_async(endpoint).await?;
        let (mut ws_tx, mut ws_rx) = ws.split();
        ws_tx.send(WsMessage::binary(packed)).await?;

        let wait_reply = async {
            while let Some(frame) = ws_rx.next().await {
                match frame? {
                    WsMessage::Binary(data) => return Ok(Some(data.to_vec())),
                    WsMessage::Ping(data) => ws_tx.send(WsMessage::Pong(data)).await?,
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
            Ok::<_, TransportError>(None)
        };
        let reply = match tokio::time::timeout(self.reply_timeout, wait_reply).await {
            Ok(reply) => reply,
            Err(_) => {
                debug!(endpoint, timeout = ?self.reply_timeout, "no reply frame");
                Ok(None)
            }
        };
        if let Err(e) = ws_tx.close().await {
            debug!(error = %e, "websocket close failed");
        }
        reply
    }
}

impl Transport for WsTransport {
    fn send<'a>(&'a self, packed: Vec<u8>, endpoint: &'a str) -> BoxFuture<'a, TransportResult> {
        self.exchange(packed, endpoint).boxed()
    }
}

/// Picks HTTP or websocket delivery from the endpoint scheme.
#[derive(Clone)]
pub struct SchemeTransport {
    http: HttpTransport,
    ws: WsTransport,
}

impl SchemeTransport {
    /// Combine the two transports.
    #[must_use]
    pub fn new(http: HttpTransport, ws: WsTransport) -> Self {
        Self { http, ws }
    }
}

impl Transport for SchemeTransport {
    fn send<'a>(&'a self, packed: Vec<u8>, endpoint: &'a str) -> BoxFuture<'a, TransportResult> {
        if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
            self.ws.send(packed, endpoint)
        } else if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            self.http.send(packed, endpoint)
        } else {
            let endpoint = endpoint.to_string();
            async move { Err(TransportError::UnsupportedEndpoint(endpoint)) }.boxed()
        }
    }
}
