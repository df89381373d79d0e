//! Error types for the connection manager and its transport.

use tokio_tungstenite::tungstenite;

/// Errors returned across the [`ConnectionManager`](crate::ConnectionManager)
/// boundary. Expected runtime failures (auth, rooms, network) are reported
/// through state and events instead.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("connection manager closed")]
    Closed,
}

/// Errors produced by a [`Transport`](crate::Transport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connect timed out")]
    Timeout,

    #[error("not connected")]
    NotConnected,

    #[error("outbound buffer full")]
    Backpressure,

    #[error("invalid credential: {0}")]
    InvalidCredential(String),
}

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
