//! The transport channel abstraction.
//!
//! Streaming and polling are two variants of one capability, so they share
//! one interface and are selected once at startup by the supervisor rather
//! than branched on at call sites. Events flow through an [`EventSink`]
//! handed to the channel at construction; sealing the sink is what makes
//! the close contract airtight: after `close()`, no handler runs, even if
//! the underlying I/O task races teardown.

use async_trait::async_trait;
use quotawatch_core::UsageSnapshot;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::TransportError;

// ============================================================================
// Events
// ============================================================================

/// Connectivity of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Delivering data.
    Connected,
    /// Lost the peer; the supervisor decides what happens next.
    Disconnected,
}

/// Everything a channel can report.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A complete snapshot arrived. Applied in delivery order, never
    /// reordered or coalesced.
    Snapshot(UsageSnapshot),
    /// Connectivity changed.
    Status(ChannelStatus),
    /// The backend reported an error over the stream.
    UpstreamError(String),
    /// Polling has failed this many consecutive times; the last snapshot
    /// is stale and should be flagged to the user.
    Stale {
        /// Length of the current failure streak.
        consecutive_failures: u32,
    },
}

// ============================================================================
// Event Sink
// ============================================================================

/// Sealable sender side of a channel's event stream.
///
/// `emit` drops events once the sink is sealed, which is the mechanism
/// behind the post-close guarantee.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ChannelEvent>,
    sealed: Arc<AtomicBool>,
}

impl EventSink {
    /// Creates a sink and its receiving half.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                sealed: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Delivers an event unless the sink is sealed or the receiver is gone.
    /// Returns whether the event was accepted.
    pub fn emit(&self, event: ChannelEvent) -> bool {
        if self.sealed.load(Ordering::SeqCst) {
            return false;
        }
        self.tx.send(event).is_ok()
    }

    /// Permanently stops delivery. Idempotent.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
    }

    /// Returns true once sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Transport Channel
// ============================================================================

/// Which strategy a channel implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Push over a persistent WebSocket.
    Streaming,
    /// Pull over periodic HTTP fetches.
    Polling,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Streaming => write!(f, "streaming"),
            Self::Polling => write!(f, "polling"),
        }
    }
}

/// One delivery strategy for usage snapshots.
///
/// Contract: after `close()` returns, no further events reach the sink.
/// Implementations seal their sink first, then tear down I/O.
#[async_trait]
pub trait TransportChannel: Send {
    /// The strategy this channel implements.
    fn kind(&self) -> ChannelKind;

    /// Starts delivery. For streaming this performs the handshake and sends
    /// the subscribe frame; for polling it fetches immediately and starts
    /// the interval.
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Stops delivery and seals the sink.
    async fn close(&mut self);

    /// Hint to deliver a fresh snapshot soon. Polling fetches immediately;
    /// streaming ignores it (the server pushes on its own schedule).
    fn request_refresh(&self) {}
}

// ============================================================================
// Channel Factory
// ============================================================================

/// Builds channels for the supervisor.
///
/// The indirection exists so the supervisor's state machine is testable
/// with scripted channels instead of live sockets.
pub trait ChannelFactory: Send + Sync {
    /// Builds the streaming channel.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Unavailable` when streaming cannot be
    /// constructed in this runtime; the supervisor then falls back
    /// permanently to polling.
    fn build_streaming(&self, sink: EventSink) -> Result<Box<dyn TransportChannel>, TransportError>;

    /// Builds the polling channel. Polling is the fallback and must always
    /// be constructible.
    fn build_polling(&self, sink: EventSink) -> Box<dyn TransportChannel>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use quotawatch_core::{BurnRate, CurrentUsage, SessionWindow};

    fn snapshot() -> UsageSnapshot {
        UsageSnapshot {
            current_usage: CurrentUsage {
                total_tokens: 1,
                total_cost: 0.0,
                total_messages: 1,
            },
            model_distribution: std::collections::HashMap::new(),
            session_window: SessionWindow {
                start: chrono::Utc::now(),
                end: None,
            },
            burn_rate: BurnRate {
                tokens_per_minute: 0.0,
            },
            active_sessions: 0,
            warnings: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_sink_delivers_until_sealed() {
        let (sink, mut rx) = EventSink::channel();

        assert!(sink.emit(ChannelEvent::Snapshot(snapshot())));
        assert!(rx.recv().await.is_some());

        sink.seal();
        assert!(sink.is_sealed());
        assert!(!sink.emit(ChannelEvent::Snapshot(snapshot())));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sealed_clone_blocks_all_handles() {
        let (sink, mut rx) = EventSink::channel();
        let clone = sink.clone();

        sink.seal();
        assert!(!clone.emit(ChannelEvent::Status(ChannelStatus::Connected)));
        assert!(rx.try_recv().is_err());
    }
}
