//! Error types for lockstream-client.

use thiserror::Error;

/// Main error type for all lockstream operations.
#[derive(Debug, Error)]
pub enum LockstreamError {
    /// I/O error on the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (message bodies, config).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error during session login.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Protocol violation (malformed frame, bad content-length, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Login rejected or unusable response from the backend.
    #[error("Login failed: {0}")]
    Login(String),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Outbound queue is at capacity.
    #[error("Writer queue full")]
    QueueFull,

    /// `connect` called on a session that is not disconnected.
    #[error("Session already active")]
    AlreadyConnected,

    /// Operation requires a connected session.
    #[error("Not connected")]
    NotConnected,

    /// Readiness series was never declared.
    #[error("Unknown readiness series: {0}")]
    UnknownSeries(String),

    /// Flag is not part of the named readiness series.
    #[error("Unknown flag '{flag}' in readiness series '{series}'")]
    UnknownFlag { series: String, flag: String },

    /// Readiness state was dropped before the series became ready.
    #[error("Readiness series '{0}' dropped before ready")]
    ReadinessDropped(String),

    /// Invalid configuration value.
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using LockstreamError.
pub type Result<T> = std::result::Result<T, LockstreamError>;
