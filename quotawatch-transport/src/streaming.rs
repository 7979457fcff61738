//! The streaming channel.
//!
//! A persistent WebSocket to the usage service. On open it performs the
//! handshake and sends the subscribe control frame; the read loop then
//! forwards every data frame to the sink. Unparsable frames are logged and
//! discarded without touching state. On close the channel sends the
//! unsubscribe frame before terminating the socket, if it is still open.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use crate::channel::{ChannelEvent, ChannelKind, ChannelStatus, EventSink, TransportChannel};
use crate::error::TransportError;
use crate::protocol::{parse_server_frame, ClientFrame, ServerFrame};

type WsWrite = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsRead = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Shutdown signal for the read loop.
struct Shutdown;

// ============================================================================
// Streaming Channel
// ============================================================================

/// Push delivery over a persistent WebSocket.
pub struct StreamingChannel {
    endpoint: Url,
    sink: EventSink,
    control: Option<mpsc::UnboundedSender<Shutdown>>,
    task: Option<JoinHandle<()>>,
}

impl StreamingChannel {
    /// Creates an unopened channel.
    pub fn new(endpoint: Url, sink: EventSink) -> Self {
        Self {
            endpoint,
            sink,
            control: None,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl TransportChannel for StreamingChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Streaming
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        debug!(endpoint = %self.endpoint, "Opening streaming channel");

        let (ws, _response) = connect_async(self.endpoint.as_str())
            .await
            .map_err(classify_connect_error)?;
        let (mut write, read) = ws.split();

        let subscribe = serde_json::to_string(&ClientFrame::UsageSubscribe)?;
        write
            .send(Message::text(subscribe))
            .await
            .map_err(|e| TransportError::Closed(e.to_string()))?;

        self.sink.emit(ChannelEvent::Status(ChannelStatus::Connected));

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        self.control = Some(control_tx);
        self.task = Some(tokio::spawn(read_loop(
            write,
            read,
            control_rx,
            self.sink.clone(),
        )));

        Ok(())
    }

    async fn close(&mut self) {
        // Seal first: events racing teardown are dropped, not delivered.
        self.sink.seal();
        if let Some(control) = self.control.take() {
            let _ = control.send(Shutdown);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        debug!("Streaming channel closed");
    }
}

/// Maps a connect failure onto the error taxonomy: configuration-level
/// failures mean streaming cannot exist in this runtime (permanent polling
/// fallback); everything else is a recoverable drop.
fn classify_connect_error(err: WsError) -> TransportError {
    match err {
        WsError::Url(e) => TransportError::Unavailable(e.to_string()),
        other => TransportError::Closed(other.to_string()),
    }
}

// ============================================================================
// Read Loop
// ============================================================================

async fn read_loop(
    mut write: WsWrite,
    mut read: WsRead,
    mut control: mpsc::UnboundedReceiver<Shutdown>,
    sink: EventSink,
) {
    loop {
        tokio::select! {
            // Shutdown requested (or the channel handle was dropped):
            // unsubscribe while the socket is still open, then terminate.
            _ = control.recv() => {
                if let Ok(text) = serde_json::to_string(&ClientFrame::UsageUnsubscribe) {
                    let _ = write.send(Message::text(text)).await;
                }
                let _ = write.close().await;
                break;
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => handle_frame(text.as_str(), &sink),
                Some(Ok(Message::Ping(payload))) => {
                    let _ = write.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!("Streaming peer closed the socket");
                    sink.emit(ChannelEvent::Status(ChannelStatus::Disconnected));
                    break;
                }
                Some(Ok(_)) => {} // Binary/Pong frames carry nothing for us
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket read failed");
                    sink.emit(ChannelEvent::Status(ChannelStatus::Disconnected));
                    break;
                }
            }
        }
    }
}

/// Routes one text frame. Malformed frames are logged and discarded; no
/// crash, no state mutation.
fn handle_frame(text: &str, sink: &EventSink) {
    match parse_server_frame(text) {
        Ok(ServerFrame::UsageData { data, .. } | ServerFrame::UsageDataUpdate { data, .. }) => {
            if let Err(e) = data.validate() {
                warn!(error = %e, "Discarding snapshot that failed validation");
                return;
            }
            sink.emit(ChannelEvent::Snapshot(data));
        }
        Ok(ServerFrame::UsageError { error }) => {
            warn!(error = %error, "Upstream usage error");
            sink.emit(ChannelEvent::UpstreamError(error));
        }
        Err(e) => {
            warn!(error = %e, "Discarding unparsable frame");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data_frame(tokens: u64) -> String {
        json!({
            "type": "usage-data-update",
            "data": {
                "currentUsage": { "totalTokens": tokens, "totalCost": 0.1, "totalMessages": 1 },
                "sessionWindow": { "start": "2025-06-01T10:00:00Z" },
                "burnRate": { "tokensPerMinute": 1.0 }
            },
            "timestamp": "2025-06-01T10:00:01Z"
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_data_frame_emits_snapshot() {
        let (sink, mut rx) = EventSink::channel();
        handle_frame(&data_frame(42), &sink);

        match rx.try_recv().unwrap() {
            ChannelEvent::Snapshot(s) => assert_eq!(s.current_usage.total_tokens, 42),
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_discarded() {
        let (sink, mut rx) = EventSink::channel();
        handle_frame("garbage", &sink);
        handle_frame(r#"{"type":"usage-data"}"#, &sink);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalid_snapshot_discarded() {
        let (sink, mut rx) = EventSink::channel();
        let frame = json!({
            "type": "usage-data",
            "data": {
                "currentUsage": { "totalTokens": 1, "totalCost": -5.0, "totalMessages": 1 },
                "sessionWindow": { "start": "2025-06-01T10:00:00Z" },
                "burnRate": { "tokensPerMinute": 1.0 }
            },
            "timestamp": "2025-06-01T10:00:01Z"
        })
        .to_string();

        handle_frame(&frame, &sink);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_error_frame_forwarded() {
        let (sink, mut rx) = EventSink::channel();
        handle_frame(r#"{"type":"usage-error","error":"backend down"}"#, &sink);

        match rx.try_recv().unwrap() {
            ChannelEvent::UpstreamError(msg) => assert_eq!(msg, "backend down"),
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sealed_sink_drops_frames() {
        let (sink, mut rx) = EventSink::channel();
        sink.seal();
        handle_frame(&data_frame(7), &sink);
        assert!(rx.try_recv().is_err());
    }
}
