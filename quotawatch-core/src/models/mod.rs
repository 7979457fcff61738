//! Domain models for `QuotaWatch`.
//!
//! All wire-facing types serialize as camelCase JSON to match the usage
//! service's frames.

mod plan;
mod usage;

pub use plan::{
    builtin_catalog, CustomLimitFactors, QuotaPlan, CUSTOM_PLAN_ID, DEFAULT_CUSTOM_TOKEN_LIMIT,
};
pub use usage::{
    BurnRate, CurrentUsage, ModelUsage, SessionWindow, UsageSnapshot, UsageWarning, WarningLevel,
};

#[cfg(test)]
mod serde_tests;
