//! The production channel factory.

use reqwest::Client;

use crate::channel::{ChannelFactory, EventSink, TransportChannel};
use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::polling::PollingChannel;
use crate::streaming::StreamingChannel;

/// Builds live channels against the configured usage service.
#[derive(Debug, Clone)]
pub struct LiveChannelFactory {
    client: Client,
    config: TransportConfig,
}

impl LiveChannelFactory {
    /// Creates a factory sharing one HTTP client across channels.
    pub fn new(client: Client, config: TransportConfig) -> Self {
        Self { client, config }
    }
}

impl ChannelFactory for LiveChannelFactory {
    fn build_streaming(&self, sink: EventSink) -> Result<Box<dyn TransportChannel>, TransportError> {
        Ok(Box::new(StreamingChannel::new(
            self.config.endpoints.stream_url.clone(),
            sink,
        )))
    }

    fn build_polling(&self, sink: EventSink) -> Box<dyn TransportChannel> {
        Box::new(PollingChannel::new(
            self.client.clone(),
            self.config.clone(),
            sink,
        ))
    }
}
