//! Connection manager for the skyrocket crash-game server.
//!
//! [`connect`] runs the socket in a background task: it authenticates,
//! selects the game, forwards every parsed frame and reconnects with a
//! bounded linear backoff. The caller talks to it through a
//! [`ConnectionHandle`] and reads [`ConnectionEvent`]s from an
//! [`EventStream`].

pub mod connection;
pub mod cookies;
pub mod events;
pub mod transport;

pub use connection::{
    connect, ConnectionConfig, ConnectionEvent, ConnectionHandle, DEFAULT_AUTH_KEY,
    DEFAULT_ENDPOINT, DEFAULT_GAME_TAG, DEFAULT_MAX_RECONNECTS, DEFAULT_RECONNECT_DELAY,
};
pub use cookies::CookieJar;
pub use events::EventStream;
pub use transport::{Connector, Transport, WsConnector, WsTransport};

use thiserror::Error;

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("dial timeout")]
    DialTimeout,
    #[error("invalid URL scheme: {0} (expected ws or wss)")]
    InvalidScheme(String),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
