//! The config change bus.
//!
//! Explicit publish/subscribe for configuration changes, so every
//! interested component hears about plan switches the moment they
//! happen instead of polling persisted state.

use quotawatch_core::QuotaPlan;
use tokio::sync::broadcast;
use tracing::debug;

const BUS_CAPACITY: usize = 32;

/// A configuration change worth reacting to.
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    /// The active quota plan switched.
    ActivePlanChanged {
        /// Identifier of the newly active plan.
        plan_id: String,
    },
    /// The custom plan's limits were re-derived.
    CustomLimitChanged {
        /// The custom plan with its fresh limits.
        plan: QuotaPlan,
    },
}

/// Broadcast bus for [`ConfigEvent`]s.
#[derive(Debug, Clone)]
pub struct ConfigChangeBus {
    tx: broadcast::Sender<ConfigEvent>,
}

impl Default for ConfigChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigChangeBus {
    /// Creates a bus with a small bounded backlog.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Subscribes to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn publish(&self, event: ConfigEvent) {
        debug!(?event, "Publishing config event");
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = ConfigChangeBus::new();
        let mut rx = bus.subscribe();

        bus.publish(ConfigEvent::ActivePlanChanged {
            plan_id: "max5".to_string(),
        });

        match rx.recv().await.unwrap() {
            ConfigEvent::ActivePlanChanged { plan_id } => assert_eq!(plan_id, "max5"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = ConfigChangeBus::new();
        bus.publish(ConfigEvent::ActivePlanChanged {
            plan_id: "pro".to_string(),
        });
    }
}
