//! The polling channel.
//!
//! HTTP fallback: fetch immediately on open, then refetch on a fixed
//! interval. Fetch failures never clear the last known snapshot; the UI
//! keeps showing stale data instead of flashing an error. A streak of
//! consecutive failures past the threshold emits a staleness event so the
//! facade can flag the data visibly.

use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use url::Url;

use crate::channel::{ChannelEvent, ChannelKind, ChannelStatus, EventSink, TransportChannel};
use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::protocol::PollResponse;
use quotawatch_core::UsageSnapshot;

// ============================================================================
// One-Shot Fetch
// ============================================================================

/// Fetches one snapshot from the realtime endpoint.
///
/// # Errors
///
/// Returns `TransportError::Http` on request failure, `FetchFailed` when
/// the backend reports `success: false` or omits the payload, and a core
/// validation error when the payload is malformed.
pub async fn fetch_realtime(client: &Client, url: &Url) -> Result<UsageSnapshot, TransportError> {
    let response = client.get(url.as_str()).send().await?.error_for_status()?;
    let envelope: PollResponse = response.json().await?;

    if !envelope.success {
        return Err(TransportError::FetchFailed(
            envelope
                .error
                .unwrap_or_else(|| "backend reported failure without detail".to_string()),
        ));
    }

    let snapshot = envelope.data.ok_or_else(|| {
        TransportError::FetchFailed("success response missing snapshot payload".to_string())
    })?;
    snapshot.validate()?;
    Ok(snapshot)
}

// ============================================================================
// Stale Tracker
// ============================================================================

/// Counts consecutive fetch failures against the staleness threshold.
#[derive(Debug)]
struct StaleTracker {
    failures: u32,
    threshold: u32,
}

impl StaleTracker {
    fn new(threshold: u32) -> Self {
        Self {
            failures: 0,
            threshold,
        }
    }

    /// Records a failure. Returns the streak length once it reaches the
    /// threshold, so every failure past it keeps the staleness flag fresh.
    fn record_failure(&mut self) -> Option<u32> {
        self.failures = self.failures.saturating_add(1);
        (self.failures >= self.threshold).then_some(self.failures)
    }

    fn record_success(&mut self) {
        self.failures = 0;
    }
}

// ============================================================================
// Polling Channel
// ============================================================================

/// Pull delivery over periodic HTTP fetches.
pub struct PollingChannel {
    client: Client,
    endpoint: Url,
    config: TransportConfig,
    sink: EventSink,
    refresh: Option<mpsc::UnboundedSender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PollingChannel {
    /// Creates an unopened channel.
    pub fn new(client: Client, config: TransportConfig, sink: EventSink) -> Self {
        Self {
            client,
            endpoint: config.endpoints.realtime_url.clone(),
            config,
            sink,
            refresh: None,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl TransportChannel for PollingChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Polling
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        debug!(endpoint = %self.endpoint, interval = ?self.config.poll_interval, "Opening polling channel");

        self.sink.emit(ChannelEvent::Status(ChannelStatus::Connected));

        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        self.refresh = Some(refresh_tx);
        self.task = Some(tokio::spawn(poll_loop(
            self.client.clone(),
            self.endpoint.clone(),
            self.config.clone(),
            refresh_rx,
            self.sink.clone(),
        )));

        Ok(())
    }

    async fn close(&mut self) {
        // Seal first, then cancel the interval task.
        self.sink.seal();
        self.refresh = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        debug!("Polling channel closed");
    }

    fn request_refresh(&self) {
        if let Some(refresh) = &self.refresh {
            let _ = refresh.send(());
        }
    }
}

async fn poll_loop(
    client: Client,
    endpoint: Url,
    config: TransportConfig,
    mut refresh: mpsc::UnboundedReceiver<()>,
    sink: EventSink,
) {
    // The first tick fires immediately: open() implies an instant fetch.
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stale = StaleTracker::new(config.stale_threshold);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            hint = refresh.recv() => {
                if hint.is_none() {
                    break;
                }
                // Manual refresh: fetch now, push the next scheduled tick out.
                ticker.reset();
            }
        }

        match fetch_realtime(&client, &endpoint).await {
            Ok(snapshot) => {
                stale.record_success();
                if !sink.emit(ChannelEvent::Snapshot(snapshot)) {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "Poll failed; keeping last known snapshot");
                if let Some(consecutive_failures) = stale.record_failure() {
                    sink.emit(ChannelEvent::Stale {
                        consecutive_failures,
                    });
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_tracker_threshold() {
        let mut tracker = StaleTracker::new(3);
        assert_eq!(tracker.record_failure(), None);
        assert_eq!(tracker.record_failure(), None);
        assert_eq!(tracker.record_failure(), Some(3));
        // Past the threshold every failure reports the streak.
        assert_eq!(tracker.record_failure(), Some(4));
    }

    #[test]
    fn test_stale_tracker_reset_on_success() {
        let mut tracker = StaleTracker::new(3);
        tracker.record_failure();
        tracker.record_failure();
        tracker.record_success();
        assert_eq!(tracker.record_failure(), None);
    }

    #[test]
    fn test_failure_envelope_maps_to_fetch_failed() {
        // The fetch path surfaces the backend's own error string.
        let envelope: PollResponse =
            serde_json::from_str(r#"{"success":false,"error":"db unavailable"}"#).unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.error.as_deref(), Some("db unavailable"));
    }
}
