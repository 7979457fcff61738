//! The usage snapshot store.
//!
//! Holds the latest snapshot and fans every update out to subscribers.
//! Fan-out is synchronous and unconditional: `apply_snapshot` invokes
//! every subscriber once per call, with no coalescing, so applying the
//! same snapshot twice fires each subscriber twice. The store does
//! storage and fan-out only; interpretation lives in the prediction
//! layer and policy in the facade.

use chrono::{DateTime, Utc};
use quotawatch_core::UsageSnapshot;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::debug;

/// How many recent errors the store retains.
const ERROR_RING_CAP: usize = 16;

/// Identifies one subscription for later removal.
pub type SubscriptionId = u64;

type SnapshotCallback = Arc<dyn Fn(&UsageSnapshot) + Send + Sync>;

/// One recorded delivery or upstream error.
#[derive(Debug, Clone)]
pub struct RecordedError {
    /// When the error was recorded.
    pub at: DateTime<Utc>,
    /// Human-readable description.
    pub message: String,
}

struct StoreState {
    latest: Option<UsageSnapshot>,
    errors: VecDeque<RecordedError>,
    version: u64,
}

// ============================================================================
// Usage Snapshot Store
// ============================================================================

/// Latest-snapshot store with synchronous subscriber fan-out.
pub struct UsageSnapshotStore {
    state: Mutex<StoreState>,
    // Separate lock so callbacks can read the store re-entrantly.
    subscribers: Mutex<Vec<(SubscriptionId, SnapshotCallback)>>,
    next_id: Mutex<SubscriptionId>,
    notify: watch::Sender<u64>,
}

impl Default for UsageSnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageSnapshotStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            state: Mutex::new(StoreState {
                latest: None,
                errors: VecDeque::new(),
                version: 0,
            }),
            subscribers: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
            notify,
        }
    }

    // ========================================================================
    // Snapshot Access
    // ========================================================================

    /// Replaces the snapshot wholesale and fires every subscriber once.
    ///
    /// # Panics
    ///
    /// Panics if a subscriber callback panicked while holding the lock.
    pub fn apply_snapshot(&self, snapshot: UsageSnapshot) {
        let version = {
            let mut state = self.state.lock().expect("store lock poisoned");
            state.latest = Some(snapshot.clone());
            state.version += 1;
            state.version
        };
        let _ = self.notify.send(version);

        // Clone the list out so callbacks can touch the store.
        let subscribers: Vec<SnapshotCallback> = {
            let guard = self.subscribers.lock().expect("subscriber lock poisoned");
            guard.iter().map(|(_, cb)| cb.clone()).collect()
        };
        debug!(version, subscribers = subscribers.len(), "Applying snapshot");
        for callback in subscribers {
            callback(&snapshot);
        }
    }

    /// Returns the most recent snapshot, or `None` before the first apply.
    ///
    /// # Panics
    ///
    /// Panics if a subscriber callback panicked while holding the lock.
    pub fn latest(&self) -> Option<UsageSnapshot> {
        self.state.lock().expect("store lock poisoned").latest.clone()
    }

    /// Monotonic count of applied snapshots.
    ///
    /// # Panics
    ///
    /// Panics if a subscriber callback panicked while holding the lock.
    pub fn version(&self) -> u64 {
        self.state.lock().expect("store lock poisoned").version
    }

    /// A watch receiver that ticks on every apply, for async observers.
    pub fn watch_version(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Registers a callback fired on every applied snapshot.
    ///
    /// # Panics
    ///
    /// Panics if a subscriber callback panicked while holding the lock.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&UsageSnapshot) + Send + Sync + 'static,
    {
        let id = {
            let mut next = self.next_id.lock().expect("id lock poisoned");
            *next += 1;
            *next
        };
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .push((id, Arc::new(callback)));
        id
    }

    /// Removes a subscription. Returns whether it existed.
    ///
    /// # Panics
    ///
    /// Panics if a subscriber callback panicked while holding the lock.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut guard = self.subscribers.lock().expect("subscriber lock poisoned");
        let before = guard.len();
        guard.retain(|(sub_id, _)| *sub_id != id);
        guard.len() != before
    }

    // ========================================================================
    // Error Ring
    // ========================================================================

    /// Records a delivery or upstream error, evicting the oldest past cap.
    ///
    /// # Panics
    ///
    /// Panics if a subscriber callback panicked while holding the lock.
    pub fn record_error(&self, message: impl Into<String>) {
        let mut state = self.state.lock().expect("store lock poisoned");
        if state.errors.len() == ERROR_RING_CAP {
            state.errors.pop_front();
        }
        state.errors.push_back(RecordedError {
            at: Utc::now(),
            message: message.into(),
        });
    }

    /// Recent errors, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if a subscriber callback panicked while holding the lock.
    pub fn recent_errors(&self) -> Vec<RecordedError> {
        self.state
            .lock()
            .expect("store lock poisoned")
            .errors
            .iter()
            .cloned()
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use quotawatch_core::{BurnRate, CurrentUsage, SessionWindow};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snapshot(tokens: u64) -> UsageSnapshot {
        UsageSnapshot {
            current_usage: CurrentUsage {
                total_tokens: tokens,
                total_cost: 0.0,
                total_messages: 1,
            },
            model_distribution: std::collections::HashMap::new(),
            session_window: SessionWindow {
                start: Utc::now(),
                end: None,
            },
            burn_rate: BurnRate {
                tokens_per_minute: 1.0,
            },
            active_sessions: 1,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_latest_starts_empty() {
        let store = UsageSnapshotStore::new();
        assert!(store.latest().is_none());
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_apply_replaces_wholesale() {
        let store = UsageSnapshotStore::new();
        store.apply_snapshot(snapshot(10));
        store.apply_snapshot(snapshot(20));

        assert_eq!(store.latest().unwrap().current_usage.total_tokens, 20);
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn test_double_apply_fires_subscribers_twice() {
        let store = UsageSnapshotStore::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let same = snapshot(10);
        store.apply_snapshot(same.clone());
        store.apply_snapshot(same);

        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let store = UsageSnapshotStore::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        let id = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.apply_snapshot(snapshot(1));
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.apply_snapshot(snapshot(2));

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscriber_can_read_store() {
        let store = Arc::new(UsageSnapshotStore::new());
        let seen = Arc::new(Mutex::new(None));

        let reader = store.clone();
        let sink = seen.clone();
        store.subscribe(move |s| {
            // Re-entrant read during fan-out must not deadlock.
            let latest = reader.latest().unwrap();
            assert_eq!(latest.current_usage.total_tokens, s.current_usage.total_tokens);
            *sink.lock().unwrap() = Some(latest.current_usage.total_tokens);
        });

        store.apply_snapshot(snapshot(42));
        assert_eq!(*seen.lock().unwrap(), Some(42));
    }

    #[test]
    fn test_error_ring_caps_at_sixteen() {
        let store = UsageSnapshotStore::new();
        for i in 0..20 {
            store.record_error(format!("error {i}"));
        }

        let errors = store.recent_errors();
        assert_eq!(errors.len(), 16);
        assert_eq!(errors[0].message, "error 4");
        assert_eq!(errors[15].message, "error 19");
    }

    #[tokio::test]
    async fn test_watch_version_ticks() {
        let store = UsageSnapshotStore::new();
        let mut watch = store.watch_version();
        assert_eq!(*watch.borrow(), 0);

        store.apply_snapshot(snapshot(1));
        watch.changed().await.unwrap();
        assert_eq!(*watch.borrow(), 1);
    }
}
