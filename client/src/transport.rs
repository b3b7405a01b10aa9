//! The socket seam.
//!
//! The connection manager only needs to send text, receive text and close.
//! [`WsConnector`] provides that over tokio-tungstenite; tests plug in an
//! in-memory pair instead.

use crate::{Error, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::ORIGIN, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use url::Url;

/// How long a dial may take before it counts as failed.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// An open, message-oriented connection.
#[async_trait]
pub trait Transport: Send + 'static {
    async fn send(&mut self, text: String) -> Result<()>;

    /// Next text frame. `None` once the peer has closed the connection.
    async fn recv(&mut self) -> Option<Result<String>>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens transports. Called once per (re)connection attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    async fn connect(&self, endpoint: &Url, origin: Option<&str>) -> Result<Self::Transport>;
}

/// Dials WebSocket endpoints with tokio-tungstenite.
#[derive(Clone, Debug)]
pub struct WsConnector {
    timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(DEFAULT_DIAL_TIMEOUT)
    }
}

impl WsConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport<MaybeTlsStream<TcpStream>>;

    async fn connect(&self, endpoint: &Url, origin: Option<&str>) -> Result<Self::Transport> {
        let mut request = endpoint.as_str().into_client_request()?;
        if let Some(origin) = origin {
            request
                .headers_mut()
                .insert(ORIGIN, HeaderValue::from_str(origin)?);
        }
        let (ws, response) = tokio::time::timeout(self.timeout, connect_async(request))
            .await
            .map_err(|_| Error::DialTimeout)??;
        debug!(%endpoint, status = %response.status(), "websocket connected");
        Ok(WsTransport::new(ws))
    }
}

/// A WebSocket carrying JSON text frames.
pub struct WsTransport<S> {
    ws: WebSocketStream<S>,
}

impl<S> WsTransport<S> {
    pub fn new(ws: WebSocketStream<S>) -> Self {
        Self { ws }
    }
}

#[async_trait]
impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, text: String) -> Result<()> {
        trace!(len = text.len(), "sending text frame");
        self.ws.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        while let Some(message) = self.ws.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    trace!(len = text.len(), "received text frame");
                    return Some(Ok(text));
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "websocket closed by peer");
                    return None;
                }
                Ok(Message::Binary(data)) => debug!(len = data.len(), "ignoring binary frame"),
                Ok(_) => {} // Ping/pong are answered by tungstenite
                Err(err) => return Some(Err(err.into())),
            }
        }
        None
    }

    async fn close(&mut self) -> Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
