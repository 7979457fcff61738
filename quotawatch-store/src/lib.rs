// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `QuotaWatch` Store
//!
//! State management for the `QuotaWatch` client.
//!
//! This crate provides:
//!
//! - **`UsageSnapshotStore`**: latest snapshot plus synchronous fan-out to
//!   subscribers and a bounded ring of recent errors
//! - **`QuotaPlanRegistry`**: the plan catalog, the persisted selection, and
//!   custom limit derivation
//! - **`ConfigChangeBus`**: broadcast notifications for plan changes
//! - **Persistence**: atomic JSON file I/O under the platform config dir

pub mod config_bus;
pub mod error;
pub mod persistence;
pub mod plans;
pub mod snapshot_store;

pub use config_bus::{ConfigChangeBus, ConfigEvent};
pub use error::StoreError;
pub use persistence::{
    default_config_dir, default_plans_path, load_json, load_json_or_default, save_json,
};
pub use plans::{PlanConfig, QuotaPlanRegistry};
pub use snapshot_store::{RecordedError, SubscriptionId, UsageSnapshotStore};
