//! The usage facade.
//!
//! One explicitly constructed object wiring the transport supervisor, the
//! snapshot store, the plan registry, and the prediction engine. Events
//! from the supervisor are pumped into the store in delivery order; plan
//! changes flow out through the config bus, including the fire-and-forget
//! push of custom limits to the backend.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use quotawatch_core::{
    predict_with, DerivedMetrics, PredictionConfig, QuotaPlan, UsageSnapshot, UsageWarning,
    WarningLevel,
};
use quotawatch_store::{
    default_plans_path, ConfigChangeBus, ConfigEvent, QuotaPlanRegistry, RecordedError, StoreError,
    SubscriptionId, UsageSnapshotStore,
};
use quotawatch_transport::{
    spawn_publish_custom_limits, ChannelEvent, ChannelFactory, ChannelStatus, ConnectionSupervisor,
    CustomLimitsBody, LiveChannelFactory, SupervisorHandle, SupervisorState, TransportConfig,
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

// ============================================================================
// Client Config
// ============================================================================

/// Everything the facade needs to start.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Transport endpoints and tunables.
    pub transport: TransportConfig,
    /// Where plan state is persisted.
    pub plans_path: PathBuf,
    /// Prediction tunables.
    pub prediction: PredictionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            plans_path: default_plans_path(),
            prediction: PredictionConfig::default(),
        }
    }
}

// ============================================================================
// Usage Facade
// ============================================================================

/// The single entry point for usage telemetry.
///
/// Constructed explicitly and passed where needed; there is no global
/// instance. Dropping the facade without calling [`UsageFacade::shutdown`]
/// leaks the background tasks until the runtime stops.
pub struct UsageFacade {
    store: Arc<UsageSnapshotStore>,
    registry: Arc<QuotaPlanRegistry>,
    supervisor: Mutex<Option<SupervisorHandle>>,
    state: watch::Receiver<SupervisorState>,
    stale: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    pump: Mutex<Option<JoinHandle<()>>>,
    limits_task: Mutex<Option<JoinHandle<()>>>,
    prediction: PredictionConfig,
}

impl UsageFacade {
    /// Starts the facade against the live backend.
    pub async fn start(config: ClientConfig) -> Self {
        let client = reqwest::Client::new();
        let factory = Arc::new(LiveChannelFactory::new(
            client.clone(),
            config.transport.clone(),
        ));
        Self::start_with_factory(config, factory).await
    }

    /// Starts the facade with an injected channel factory. This is the
    /// seam tests use to script transport behavior.
    pub async fn start_with_factory(config: ClientConfig, factory: Arc<dyn ChannelFactory>) -> Self {
        let bus = ConfigChangeBus::new();
        let registry = Arc::new(QuotaPlanRegistry::load(config.plans_path, bus.clone()).await);
        let store = Arc::new(UsageSnapshotStore::new());
        let stale = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let supervisor = ConnectionSupervisor::spawn(config.transport.clone(), factory, events_tx);
        let state = supervisor.state_watch();

        let pump = tokio::spawn(pump_events(
            events_rx,
            store.clone(),
            stale.clone(),
            closed.clone(),
        ));
        let limits_task = tokio::spawn(forward_custom_limits(
            bus.subscribe(),
            reqwest::Client::new(),
            config.transport.endpoints.custom_limits_url.clone(),
        ));

        info!("Usage facade started");
        Self {
            store,
            registry,
            supervisor: Mutex::new(Some(supervisor)),
            state,
            stale,
            closed,
            pump: Mutex::new(Some(pump)),
            limits_task: Mutex::new(Some(limits_task)),
            prediction: config.prediction,
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// The latest snapshot, or `None` before the first delivery.
    pub fn snapshot(&self) -> Option<UsageSnapshot> {
        self.store.latest()
    }

    /// Derived metrics for the latest snapshot under the active plan, or
    /// `None` before the first delivery.
    pub async fn metrics(&self) -> Option<DerivedMetrics> {
        let snapshot = self.store.latest()?;
        let plan = self.registry.active_plan().await;
        Some(predict_with(&snapshot, &plan, Utc::now(), &self.prediction))
    }

    /// True while live updates are failing and the snapshot may be stale.
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    /// Current connection lifecycle state.
    pub fn link_state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// A watch receiver for connection state transitions.
    pub fn link_state_watch(&self) -> watch::Receiver<SupervisorState> {
        self.state.clone()
    }

    /// A watch receiver that ticks on every applied snapshot, for async
    /// consumers that prefer awaiting over callbacks.
    pub fn snapshot_watch(&self) -> watch::Receiver<u64> {
        self.store.watch_version()
    }

    /// Backend warnings from the latest snapshot, plus a synthesized
    /// staleness warning while updates are failing.
    pub fn warnings(&self) -> Vec<UsageWarning> {
        let mut warnings = self
            .store
            .latest()
            .map(|s| s.warnings)
            .unwrap_or_default();
        if self.is_stale() {
            warnings.push(UsageWarning {
                level: WarningLevel::Warning,
                message: "usage data may be out of date; live updates are failing".to_string(),
            });
        }
        warnings
    }

    /// Recently recorded delivery and upstream errors, oldest first.
    pub fn recent_errors(&self) -> Vec<RecordedError> {
        self.store.recent_errors()
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Registers a callback fired on every applied snapshot.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&UsageSnapshot) + Send + Sync + 'static,
    {
        self.store.subscribe(callback)
    }

    /// Removes a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    // ========================================================================
    // Plans
    // ========================================================================

    /// All selectable plans.
    pub async fn plans(&self) -> Vec<QuotaPlan> {
        self.registry.plans().await
    }

    /// The currently active plan.
    pub async fn active_plan(&self) -> QuotaPlan {
        self.registry.active_plan().await
    }

    /// Switches the active plan.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::PlanNotFound` (wrapped) for an unknown id, or a
    /// persistence error; neither mutates the registry.
    pub async fn set_plan(&self, id: &str) -> Result<QuotaPlan, StoreError> {
        self.registry.set_active_plan(id).await
    }

    /// Updates the custom plan's token limit.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidPlanConfig` (wrapped) for a zero limit,
    /// or a persistence error; neither mutates the registry.
    pub async fn set_custom_token_limit(&self, token_limit: u64) -> Result<QuotaPlan, StoreError> {
        self.registry.set_custom_token_limit(token_limit).await
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Asks the transport for a fresh snapshot soon.
    ///
    /// # Panics
    ///
    /// Panics if the supervisor lock is poisoned.
    pub fn refresh(&self) {
        if let Some(supervisor) = self.supervisor.lock().expect("supervisor lock poisoned").as_ref()
        {
            supervisor.refresh();
        }
    }

    /// Tears everything down: the supervisor closes its channel, the event
    /// pump stops, and no subscriber fires afterward. Idempotent.
    ///
    /// # Panics
    ///
    /// Panics if the supervisor lock is poisoned.
    pub async fn shutdown(&self) {
        // Gate first so an event racing teardown is dropped, not applied.
        self.closed.store(true, Ordering::SeqCst);

        let supervisor = self
            .supervisor
            .lock()
            .expect("supervisor lock poisoned")
            .take();
        if let Some(supervisor) = supervisor {
            supervisor.close().await;
        }
        if let Some(pump) = self.pump.lock().expect("pump lock poisoned").take() {
            pump.abort();
        }
        if let Some(task) = self.limits_task.lock().expect("limits lock poisoned").take() {
            task.abort();
        }
        info!("Usage facade shut down");
    }
}

// ============================================================================
// Background Tasks
// ============================================================================

/// Applies supervisor events to the store, in delivery order.
async fn pump_events(
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    store: Arc<UsageSnapshotStore>,
    stale: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
) {
    while let Some(event) = events.recv().await {
        if closed.load(Ordering::SeqCst) {
            break;
        }
        match event {
            ChannelEvent::Snapshot(snapshot) => {
                // A successful delivery clears the staleness flag.
                stale.store(false, Ordering::SeqCst);
                store.apply_snapshot(snapshot);
            }
            ChannelEvent::Status(status) => {
                debug!(?status, "Transport status changed");
            }
            ChannelEvent::UpstreamError(message) => {
                store.record_error(message);
            }
            ChannelEvent::Stale {
                consecutive_failures,
            } => {
                stale.store(true, Ordering::SeqCst);
                store.record_error(format!(
                    "usage data stale after {consecutive_failures} consecutive failed polls"
                ));
            }
        }
    }
}

/// Pushes re-derived custom limits to the backend, fire-and-forget.
async fn forward_custom_limits(
    mut events: broadcast::Receiver<ConfigEvent>,
    client: reqwest::Client,
    url: Url,
) {
    loop {
        match events.recv().await {
            Ok(ConfigEvent::CustomLimitChanged { plan }) => {
                spawn_publish_custom_limits(
                    client.clone(),
                    url.clone(),
                    CustomLimitsBody {
                        tokens: plan.token_limit,
                        cost: plan.cost_limit,
                        messages: plan.message_limit,
                    },
                );
            }
            Ok(ConfigEvent::ActivePlanChanged { .. }) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use quotawatch_core::{BurnRate, CurrentUsage, Exhaustion, SessionWindow};
    use quotawatch_transport::{ChannelKind, EventSink, TransportChannel, TransportError};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct TestChannel {
        sink: EventSink,
    }

    #[async_trait::async_trait]
    impl TransportChannel for TestChannel {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Streaming
        }

        async fn open(&mut self) -> Result<(), TransportError> {
            self.sink.emit(ChannelEvent::Status(ChannelStatus::Connected));
            Ok(())
        }

        async fn close(&mut self) {
            self.sink.seal();
        }
    }

    #[derive(Default)]
    struct TestFactory {
        sinks: Mutex<Vec<EventSink>>,
    }

    impl TestFactory {
        fn last_sink(&self) -> EventSink {
            self.sinks.lock().unwrap().last().unwrap().clone()
        }
    }

    impl ChannelFactory for TestFactory {
        fn build_streaming(
            &self,
            sink: EventSink,
        ) -> Result<Box<dyn TransportChannel>, TransportError> {
            self.sinks.lock().unwrap().push(sink.clone());
            Ok(Box::new(TestChannel { sink }))
        }

        fn build_polling(&self, sink: EventSink) -> Box<dyn TransportChannel> {
            self.sinks.lock().unwrap().push(sink.clone());
            Box::new(TestChannel { sink })
        }
    }

    fn snapshot(tokens: u64, rate: f64) -> UsageSnapshot {
        UsageSnapshot {
            current_usage: CurrentUsage {
                total_tokens: tokens,
                total_cost: 1.0,
                total_messages: 10,
            },
            model_distribution: std::collections::HashMap::new(),
            session_window: SessionWindow {
                start: Utc::now(),
                end: None,
            },
            burn_rate: BurnRate {
                tokens_per_minute: rate,
            },
            active_sessions: 1,
            warnings: Vec::new(),
        }
    }

    async fn start_facade(dir: &tempfile::TempDir) -> (UsageFacade, Arc<TestFactory>) {
        let factory = Arc::new(TestFactory::default());
        let config = ClientConfig {
            transport: TransportConfig::default(),
            plans_path: dir.path().join("plans.json"),
            prediction: PredictionConfig::default(),
        };
        let facade = UsageFacade::start_with_factory(config, factory.clone()).await;

        let mut state = facade.link_state_watch();
        tokio::time::timeout(Duration::from_secs(5), async {
            while *state.borrow() != SupervisorState::Connected {
                state.changed().await.unwrap();
            }
        })
        .await
        .expect("facade never connected");
        (facade, factory)
    }

    async fn wait_for_version(facade: &UsageFacade, version: u64) {
        let mut watch = facade.store.watch_version();
        tokio::time::timeout(Duration::from_secs(5), async {
            while *watch.borrow() < version {
                watch.changed().await.unwrap();
            }
        })
        .await
        .expect("snapshot never applied");
    }

    #[tokio::test]
    async fn test_snapshot_and_metrics_under_custom_plan() {
        let dir = tempfile::tempdir().unwrap();
        let (facade, factory) = start_facade(&dir).await;

        facade.set_custom_token_limit(50_000).await.unwrap();
        facade.set_plan("custom").await.unwrap();

        factory
            .last_sink()
            .emit(ChannelEvent::Snapshot(snapshot(45_000, 50.0)));
        wait_for_version(&facade, 1).await;

        let metrics = facade.metrics().await.unwrap();
        assert!((metrics.tokens_percent - 90.0).abs() < 1e-9);

        // 5000 remaining tokens at 50/min puts exhaustion ~100 min out.
        let at = match metrics.projected_exhaustion {
            Exhaustion::At(at) => at,
            Exhaustion::Unavailable => panic!("exhaustion should be projected"),
        };
        let minutes = (at - Utc::now()).num_minutes();
        assert!((99..=100).contains(&minutes), "got {minutes} minutes");

        facade.shutdown().await;
    }

    #[tokio::test]
    async fn test_stale_keeps_last_snapshot_and_warns() {
        let dir = tempfile::tempdir().unwrap();
        let (facade, factory) = start_facade(&dir).await;
        let sink = factory.last_sink();

        sink.emit(ChannelEvent::Snapshot(snapshot(1_000, 1.0)));
        wait_for_version(&facade, 1).await;
        assert!(!facade.is_stale());

        sink.emit(ChannelEvent::Stale {
            consecutive_failures: 3,
        });
        tokio::time::timeout(Duration::from_secs(5), async {
            while !facade.is_stale() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("staleness never flagged");

        // The old snapshot survives, visibly flagged.
        assert_eq!(facade.snapshot().unwrap().current_usage.total_tokens, 1_000);
        assert!(facade
            .warnings()
            .iter()
            .any(|w| w.level == WarningLevel::Warning && w.message.contains("out of date")));
        assert!(!facade.recent_errors().is_empty());

        // The next delivery clears the flag.
        sink.emit(ChannelEvent::Snapshot(snapshot(1_100, 1.0)));
        wait_for_version(&facade, 2).await;
        assert!(!facade.is_stale());

        facade.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_subscriber_fires_after_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (facade, factory) = start_facade(&dir).await;
        let sink = factory.last_sink();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        facade.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        sink.emit(ChannelEvent::Snapshot(snapshot(1, 1.0)));
        wait_for_version(&facade, 1).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        facade.shutdown().await;
        assert!(!sink.emit(ChannelEvent::Snapshot(snapshot(2, 1.0))));
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_custom_limit_rejected_through_facade() {
        let dir = tempfile::tempdir().unwrap();
        let (facade, _factory) = start_facade(&dir).await;

        facade.set_custom_token_limit(80_000).await.unwrap();
        assert!(facade.set_custom_token_limit(0).await.is_err());
        assert_eq!(
            facade.registry.custom_token_limit().await,
            80_000,
            "rejected update must not mutate"
        );

        facade.shutdown().await;
    }
}
