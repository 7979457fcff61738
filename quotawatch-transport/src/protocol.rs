//! Wire protocol frames.
//!
//! The usage service speaks JSON in both directions:
//!
//! - WebSocket control frames from the client: `usage-subscribe` /
//!   `usage-unsubscribe`.
//! - WebSocket data frames from the server: `usage-data` (initial payload),
//!   `usage-data-update` (subsequent deliveries), `usage-error`.
//! - Polling responses from `GET /api/usage/realtime`.
//! - The fire-and-forget body for `POST /api/usage/custom-limits`.

use chrono::{DateTime, Utc};
use quotawatch_core::UsageSnapshot;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

// ============================================================================
// Client Frames
// ============================================================================

/// Control frames sent by the client over the streaming channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientFrame {
    /// Start pushing usage snapshots.
    UsageSubscribe,
    /// Stop pushing; sent before closing the socket.
    UsageUnsubscribe,
}

// ============================================================================
// Server Frames
// ============================================================================

/// Frames pushed by the server over the streaming channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerFrame {
    /// Initial full snapshot after subscribing.
    UsageData {
        /// The snapshot payload.
        data: UsageSnapshot,
        /// Server-side delivery time.
        timestamp: DateTime<Utc>,
    },
    /// Subsequent full snapshot.
    UsageDataUpdate {
        /// The snapshot payload.
        data: UsageSnapshot,
        /// Server-side delivery time.
        timestamp: DateTime<Utc>,
    },
    /// Upstream error report.
    UsageError {
        /// Human-readable error message.
        error: String,
    },
}

impl ServerFrame {
    /// Extracts the snapshot from a data-bearing frame.
    pub fn into_snapshot(self) -> Option<UsageSnapshot> {
        match self {
            Self::UsageData { data, .. } | Self::UsageDataUpdate { data, .. } => Some(data),
            Self::UsageError { .. } => None,
        }
    }
}

/// Parses one server frame from the raw text of a WebSocket message.
///
/// # Errors
///
/// Returns `TransportError::MalformedFrame` on any parse failure; callers
/// log and discard, they never crash or mutate state.
pub fn parse_server_frame(text: &str) -> Result<ServerFrame, TransportError> {
    serde_json::from_str(text).map_err(|e| TransportError::MalformedFrame(e.to_string()))
}

// ============================================================================
// Polling Response
// ============================================================================

/// Response envelope of `GET /api/usage/realtime`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResponse {
    /// Whether the backend produced a snapshot.
    pub success: bool,
    /// The snapshot, present on success.
    #[serde(default)]
    pub data: Option<UsageSnapshot>,
    /// Error message, present on failure.
    #[serde(default)]
    pub error: Option<String>,
}

// ============================================================================
// Custom Limits Body
// ============================================================================

/// Body of `POST /api/usage/custom-limits`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CustomLimitsBody {
    /// Token ceiling.
    pub tokens: u64,
    /// Cost ceiling in USD.
    pub cost: f64,
    /// Message ceiling.
    pub messages: u64,
}

// ============================================================================
// Tests
// ============================================================================
