//! Core error types for `QuotaWatch`.

use thiserror::Error;

/// Core error type for `QuotaWatch` operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid data in a usage snapshot.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Rejected plan configuration (e.g. a non-positive custom limit).
    #[error("Invalid plan configuration: {0}")]
    InvalidPlanConfig(String),

    /// Referenced plan id does not exist.
    #[error("Plan not found: {0}")]
    PlanNotFound(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
