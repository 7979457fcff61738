// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `QuotaWatch` Core
//!
//! Core types, models, and the prediction engine for the `QuotaWatch`
//! usage-telemetry client.
//!
//! This crate provides the foundational abstractions used across all other
//! `QuotaWatch` crates:
//!
//! - Domain models (usage snapshots, quota plans, derived metrics)
//! - Error types
//! - The pure prediction functions that turn a snapshot plus an active plan
//!   into display-ready metrics
//!
//! ## Key Types
//!
//! ### Usage Types
//! - [`UsageSnapshot`] - One complete delivery of current usage state
//! - [`CurrentUsage`] - Token/cost/message totals
//! - [`ModelUsage`] - Per-model breakdown entry
//! - [`SessionWindow`] - Rolling quota window bounds
//! - [`BurnRate`] - Consumption rate used for exhaustion projection
//! - [`UsageWarning`] - Backend-supplied warning entries
//!
//! ### Plan Types
//! - [`QuotaPlan`] - A named ceiling on tokens/cost/messages
//! - [`CustomLimitFactors`] - Derivation factors for the user-editable plan
//!
//! ### Prediction
//! - [`DerivedMetrics`] - Computed per read, never persisted
//! - [`Exhaustion`] - Projected exhaustion time, or unavailable

pub mod error;
pub mod models;
pub mod predict;

// Re-export error types
pub use error::CoreError;

// Re-export all model types
pub use models::{
    // Plan types
    builtin_catalog,
    CustomLimitFactors,
    QuotaPlan,
    CUSTOM_PLAN_ID,
    DEFAULT_CUSTOM_TOKEN_LIMIT,
    // Usage types
    BurnRate,
    CurrentUsage,
    ModelUsage,
    SessionWindow,
    UsageSnapshot,
    UsageWarning,
    WarningLevel,
};

// Re-export prediction types and functions
pub use predict::{
    percent_used, percent_used_f64, predict, predict_with, DerivedMetrics, Exhaustion,
    PredictionConfig,
};
