//! Transport error types.

use thiserror::Error;

/// Error type for transport operations.
///
/// Nothing here is fatal to the host process: [`TransportError::Unavailable`]
/// triggers a permanent fallback to polling, the recoverable variants degrade
/// to the last known good snapshot.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport cannot be constructed in this runtime. The supervisor
    /// falls back permanently to polling for the session.
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    /// Connection closed by peer or network drop. Triggers a scheduled
    /// reconnect.
    #[error("Transport closed: {0}")]
    Closed(String),

    /// An unparsable frame. The frame is discarded; no state changes.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// A polling request failed. The stale snapshot is retained.
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core validation error.
    #[error("Core error: {0}")]
    Core(#[from] quotawatch_core::CoreError),
}

impl TransportError {
    /// Returns true if the error degrades gracefully rather than forcing a
    /// strategy change.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Unavailable(_))
    }
}
