//! The connection supervisor.
//!
//! Owns exactly one active [`TransportChannel`] and drives its lifecycle:
//! connect, disconnect, reconnect after a fixed delay, and the one-time
//! streaming-vs-polling decision. No other component may open sockets or
//! timers for usage delivery.
//!
//! State machine: `Idle → Connecting → Connected → Disconnected →
//! Reconnecting → Connecting → …`. Reconnect scheduling is idempotent: a
//! second disconnect signal while a timer is pending adds nothing. On
//! teardown the pending timer is cleared and the channel is closed; no
//! callback fires afterward.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::channel::{
    ChannelEvent, ChannelFactory, ChannelStatus, EventSink, TransportChannel,
};
use crate::config::TransportConfig;
use crate::error::TransportError;

// ============================================================================
// Supervisor State
// ============================================================================

/// Lifecycle state, observable through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Not running (before spawn or after teardown).
    Idle,
    /// Building and opening a channel.
    Connecting,
    /// A channel is delivering.
    Connected,
    /// The channel dropped; a reconnect decision is imminent.
    Disconnected,
    /// A reconnect timer is pending.
    Reconnecting,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Handle
// ============================================================================

enum Command {
    Refresh,
    Close,
}

/// Control handle for a spawned supervisor.
pub struct SupervisorHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SupervisorState>,
    task: Option<JoinHandle<()>>,
}

impl SupervisorHandle {
    /// Current lifecycle state.
    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// A watch receiver for state transitions.
    pub fn state_watch(&self) -> watch::Receiver<SupervisorState> {
        self.state.clone()
    }

    /// Asks the active channel for a fresh snapshot soon.
    pub fn refresh(&self) {
        let _ = self.commands.send(Command::Refresh);
    }

    /// Tears the supervisor down: clears any pending reconnect, closes the
    /// active channel, and waits for the task to finish. After this returns
    /// no snapshot or status callback fires, even if the underlying
    /// transport delivers an event during the race.
    pub async fn close(mut self) {
        let _ = self.commands.send(Command::Close);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// Spawns and supervises the single active transport channel.
pub struct ConnectionSupervisor;

impl ConnectionSupervisor {
    /// Starts the supervisor task. Forwarded [`ChannelEvent`]s arrive on
    /// `events` in delivery order; dropping the receiver tears the
    /// supervisor down on its next event.
    pub fn spawn(
        config: TransportConfig,
        factory: Arc<dyn ChannelFactory>,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> SupervisorHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SupervisorState::Idle);

        let actor = Supervisor {
            use_streaming: config.streaming_enabled,
            config,
            factory,
            events,
            state: state_tx,
            active: None,
            reconnect_at: None,
        };
        let task = tokio::spawn(actor.run(command_rx));

        SupervisorHandle {
            commands: command_tx,
            state: state_rx,
            task: Some(task),
        }
    }
}

struct ActiveChannel {
    channel: Box<dyn TransportChannel>,
    sink: EventSink,
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
}

enum Input {
    Command(Option<Command>),
    Event(Option<ChannelEvent>),
    ReconnectDue,
}

struct Supervisor {
    config: TransportConfig,
    factory: Arc<dyn ChannelFactory>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    state: watch::Sender<SupervisorState>,
    use_streaming: bool,
    active: Option<ActiveChannel>,
    reconnect_at: Option<Instant>,
}

impl Supervisor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.connect().await;

        loop {
            let input = tokio::select! {
                cmd = commands.recv() => Input::Command(cmd),
                ev = Self::next_event(&mut self.active) => Input::Event(ev),
                () = Self::reconnect_timer(self.reconnect_at) => Input::ReconnectDue,
            };

            match input {
                Input::Command(Some(Command::Refresh)) => {
                    if let Some(active) = &self.active {
                        active.channel.request_refresh();
                    }
                }
                // Close requested, or the handle was dropped.
                Input::Command(Some(Command::Close) | None) => {
                    self.teardown().await;
                    break;
                }
                Input::Event(Some(event)) => {
                    if !self.handle_event(event) {
                        self.teardown().await;
                        break;
                    }
                }
                // The channel dropped its sink without a status frame;
                // treat it as a network drop.
                Input::Event(None) => {
                    self.set_state(SupervisorState::Disconnected);
                    self.schedule_reconnect();
                }
                Input::ReconnectDue => {
                    self.reconnect_at = None;
                    self.connect().await;
                }
            }
        }
    }

    /// Forwards one channel event. Returns false when the consumer is gone.
    fn handle_event(&mut self, event: ChannelEvent) -> bool {
        match &event {
            ChannelEvent::Snapshot(_) | ChannelEvent::Status(ChannelStatus::Connected) => {
                self.set_state(SupervisorState::Connected);
            }
            ChannelEvent::Status(ChannelStatus::Disconnected) => {
                self.set_state(SupervisorState::Disconnected);
            }
            ChannelEvent::UpstreamError(_) | ChannelEvent::Stale { .. } => {}
        }

        let disconnected = matches!(event, ChannelEvent::Status(ChannelStatus::Disconnected));
        let delivered = self.events.send(event).is_ok();
        if disconnected {
            self.schedule_reconnect();
        }
        delivered
    }

    /// Schedules exactly one reconnect; re-entrant signals while a timer is
    /// pending are suppressed.
    fn schedule_reconnect(&mut self) {
        if self.reconnect_at.is_some() {
            return;
        }
        self.set_state(SupervisorState::Reconnecting);
        self.reconnect_at = Some(Instant::now() + self.config.reconnect_delay);
        debug!(delay = ?self.config.reconnect_delay, "Reconnect scheduled");
    }

    /// Builds and opens a channel, preferring streaming until it proves
    /// unconstructible, after which polling is used for the rest of the
    /// session.
    async fn connect(&mut self) {
        if let Some(mut previous) = self.active.take() {
            previous.sink.seal();
            previous.channel.close().await;
        }
        self.set_state(SupervisorState::Connecting);

        loop {
            let (sink, rx) = EventSink::channel();

            let mut channel = if self.use_streaming {
                match self.factory.build_streaming(sink.clone()) {
                    Ok(channel) => channel,
                    Err(e) => {
                        warn!(error = %e, "Streaming unavailable; falling back to polling for this session");
                        self.use_streaming = false;
                        continue;
                    }
                }
            } else {
                self.factory.build_polling(sink.clone())
            };

            match channel.open().await {
                Ok(()) => {
                    info!(kind = %channel.kind(), "Channel opened");
                    self.active = Some(ActiveChannel { channel, sink, rx });
                    return;
                }
                Err(TransportError::Unavailable(msg)) if self.use_streaming => {
                    warn!(error = %msg, "Streaming cannot be constructed; falling back to polling for this session");
                    self.use_streaming = false;
                }
                Err(e) => {
                    warn!(error = %e, "Channel open failed");
                    self.set_state(SupervisorState::Disconnected);
                    self.schedule_reconnect();
                    return;
                }
            }
        }
    }

    async fn teardown(&mut self) {
        self.reconnect_at = None;
        if let Some(mut active) = self.active.take() {
            active.sink.seal();
            active.channel.close().await;
        }
        self.set_state(SupervisorState::Idle);
        debug!("Supervisor torn down");
    }

    fn set_state(&self, next: SupervisorState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    async fn next_event(active: &mut Option<ActiveChannel>) -> Option<ChannelEvent> {
        match active {
            Some(active) => active.rx.recv().await,
            None => std::future::pending().await,
        }
    }

    async fn reconnect_timer(at: Option<Instant>) {
        match at {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
