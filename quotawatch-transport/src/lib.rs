// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `QuotaWatch` Transport
//!
//! The duplex data path between the usage service and the client: two
//! channel strategies behind one interface, plus the supervisor that picks
//! exactly one and keeps it alive.
//!
//! - [`StreamingChannel`] - push delivery over a persistent WebSocket
//! - [`PollingChannel`] - pull delivery over periodic HTTP fetches
//! - [`ConnectionSupervisor`] - lifecycle, reconnect, and the
//!   streaming-vs-polling decision
//!
//! Both channels emit [`ChannelEvent`]s through an [`EventSink`], which is
//! sealed on close so that no event can be delivered after teardown.

pub mod channel;
pub mod config;
pub mod error;
pub mod factory;
pub mod limits;
pub mod polling;
pub mod protocol;
pub mod streaming;
pub mod supervisor;

pub use channel::{ChannelEvent, ChannelFactory, ChannelKind, ChannelStatus, EventSink, TransportChannel};
pub use config::{ServiceEndpoints, TransportConfig};
pub use error::TransportError;
pub use factory::LiveChannelFactory;
pub use limits::{publish_custom_limits, spawn_publish_custom_limits};
pub use polling::{fetch_realtime, PollingChannel};
pub use protocol::{ClientFrame, CustomLimitsBody, PollResponse, ServerFrame};
pub use streaming::StreamingChannel;
pub use supervisor::{ConnectionSupervisor, SupervisorHandle, SupervisorState};
