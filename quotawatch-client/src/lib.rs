// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `QuotaWatch` Client
//!
//! The high-level facade over the `QuotaWatch` stack: one object that owns
//! the connection supervisor, the snapshot store, and the plan registry,
//! and exposes snapshots, derived metrics, plan management, and lifecycle
//! control.
//!
//! ```ignore
//! use quotawatch_client::{ClientConfig, UsageFacade};
//!
//! let facade = UsageFacade::start(ClientConfig::default()).await;
//! facade.subscribe(|snapshot| {
//!     println!("{} tokens used", snapshot.current_usage.total_tokens);
//! });
//! // ...
//! facade.shutdown().await;
//! ```

pub mod facade;

pub use facade::{ClientConfig, UsageFacade};
