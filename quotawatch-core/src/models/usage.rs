//! Usage-related types.
//!
//! This module contains the types that make up one telemetry delivery:
//! - [`UsageSnapshot`] - Main container, replaced wholesale per delivery
//! - [`CurrentUsage`] - Token/cost/message totals
//! - [`ModelUsage`] - Per-model breakdown entry
//! - [`SessionWindow`] - Rolling quota window bounds
//! - [`BurnRate`] - Consumption rate
//! - [`UsageWarning`] - Backend-supplied warnings

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::CoreError;

/// Allowed deviation of the per-model percentage sum from 100.
///
/// The backend rounds per-model percentages independently, so the sum can
/// drift slightly from 100 even for well-formed snapshots.
pub const DISTRIBUTION_TOLERANCE: f64 = 1.0;

// ============================================================================
// Usage Snapshot
// ============================================================================

/// One complete, self-consistent delivery of current usage state.
///
/// A snapshot is immutable once received and replaces the previous one
/// wholesale; there are no partial merges across fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    /// Aggregate token/cost/message totals for the current window.
    pub current_usage: CurrentUsage,
    /// Per-model breakdown keyed by model name.
    #[serde(default)]
    pub model_distribution: HashMap<String, ModelUsage>,
    /// Bounds of the rolling quota window.
    pub session_window: SessionWindow,
    /// Current consumption rate.
    pub burn_rate: BurnRate,
    /// Number of concurrently active sessions.
    #[serde(default)]
    pub active_sessions: u32,
    /// Ordered warnings supplied by the backend; may be empty.
    #[serde(default)]
    pub warnings: Vec<UsageWarning>,
}

impl UsageSnapshot {
    /// Sum of the per-model percentages.
    pub fn distribution_percent_sum(&self) -> f64 {
        self.model_distribution.values().map(|m| m.percentage).sum()
    }

    /// Returns true if any warning is at danger level.
    pub fn has_danger_warning(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| w.level == WarningLevel::Danger)
    }

    /// Validates the snapshot data.
    ///
    /// This should be called after parsing transport frames to catch
    /// malformed or malicious data before it reaches the store.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidData` if any numeric field is negative or
    /// non-finite, the session window is inverted, or the per-model
    /// percentage sum deviates from 100 beyond [`DISTRIBUTION_TOLERANCE`].
    pub fn validate(&self) -> Result<(), CoreError> {
        self.current_usage.validate()?;
        self.burn_rate.validate()?;
        self.session_window.validate()?;

        for (model, usage) in &self.model_distribution {
            usage
                .validate()
                .map_err(|e| CoreError::InvalidData(format!("model {model}: {e}")))?;
        }

        // Percentages are relative to total_tokens; an empty distribution or
        // an idle window has nothing to add up.
        if !self.model_distribution.is_empty() && self.current_usage.total_tokens > 0 {
            let sum = self.distribution_percent_sum();
            if (sum - 100.0).abs() > DISTRIBUTION_TOLERANCE {
                return Err(CoreError::InvalidData(format!(
                    "model distribution sums to {sum:.2}, expected ~100"
                )));
            }
        }

        Ok(())
    }

    /// Validates and clamps values to valid ranges.
    ///
    /// Unlike `validate()`, this fixes invalid values instead of returning
    /// an error. Use when being lenient with a buggy backend is preferable
    /// to dropping the delivery.
    pub fn sanitize(&mut self) {
        self.current_usage.sanitize();
        self.burn_rate.sanitize();
        for usage in self.model_distribution.values_mut() {
            usage.sanitize();
        }
    }
}

// ============================================================================
// Current Usage
// ============================================================================

/// Aggregate consumption totals for the current window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUsage {
    /// Total tokens consumed.
    pub total_tokens: u64,
    /// Total cost in USD.
    pub total_cost: f64,
    /// Total messages sent.
    pub total_messages: u64,
}

impl CurrentUsage {
    /// Validates the totals.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidData` if the cost is negative or
    /// non-finite.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.total_cost.is_finite() || self.total_cost < 0.0 {
            return Err(CoreError::InvalidData(format!(
                "total_cost {} is not a non-negative finite number",
                self.total_cost
            )));
        }
        Ok(())
    }

    /// Clamps the cost to a non-negative finite value.
    pub fn sanitize(&mut self) {
        if !self.total_cost.is_finite() || self.total_cost < 0.0 {
            self.total_cost = 0.0;
        }
    }
}

// ============================================================================
// Model Distribution
// ============================================================================

/// Per-model breakdown entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUsage {
    /// Tokens consumed by this model.
    pub tokens: u64,
    /// Cost in USD attributed to this model.
    pub cost: f64,
    /// Messages sent with this model.
    pub messages: u64,
    /// Share of `total_tokens`, in percent.
    pub percentage: f64,
}

impl ModelUsage {
    /// Validates the entry.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidData` if the cost or percentage is
    /// negative or non-finite.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.cost.is_finite() || self.cost < 0.0 {
            return Err(CoreError::InvalidData(format!(
                "cost {} is not a non-negative finite number",
                self.cost
            )));
        }
        if !self.percentage.is_finite() || self.percentage < 0.0 {
            return Err(CoreError::InvalidData(format!(
                "percentage {} is not a non-negative finite number",
                self.percentage
            )));
        }
        Ok(())
    }

    /// Clamps cost and percentage to valid ranges.
    pub fn sanitize(&mut self) {
        if !self.cost.is_finite() || self.cost < 0.0 {
            self.cost = 0.0;
        }
        if !self.percentage.is_finite() {
            self.percentage = 0.0;
        }
        self.percentage = self.percentage.clamp(0.0, 100.0);
    }
}

// ============================================================================
// Session Window
// ============================================================================

/// The rolling time interval against which a quota plan is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionWindow {
    /// Window start.
    pub start: DateTime<Utc>,
    /// Window end. Absent when the backend omits it; consumers fall back
    /// to a configurable default window (see the prediction engine).
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

impl SessionWindow {
    /// Window duration, when the end is known.
    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end - self.start)
    }

    /// Validates the window bounds.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidData` if `end <= start`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(end) = self.end {
            if end <= self.start {
                return Err(CoreError::InvalidData(format!(
                    "session window end {end} is not after start {}",
                    self.start
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Burn Rate
// ============================================================================

/// Tokens consumed per minute, used to project quota exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnRate {
    /// Tokens per minute. Zero means idle.
    pub tokens_per_minute: f64,
}

impl BurnRate {
    /// Validates the rate.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidData` if the rate is negative or
    /// non-finite.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.tokens_per_minute.is_finite() || self.tokens_per_minute < 0.0 {
            return Err(CoreError::InvalidData(format!(
                "tokens_per_minute {} is not a non-negative finite number",
                self.tokens_per_minute
            )));
        }
        Ok(())
    }

    /// Clamps the rate to a non-negative finite value.
    pub fn sanitize(&mut self) {
        if !self.tokens_per_minute.is_finite() || self.tokens_per_minute < 0.0 {
            self.tokens_per_minute = 0.0;
        }
    }
}

// ============================================================================
// Warnings
// ============================================================================

/// Severity of a backend-supplied warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    /// Approaching a limit.
    Warning,
    /// At or over a limit.
    Danger,
}

/// One warning entry from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageWarning {
    /// Warning severity.
    #[serde(rename = "type")]
    pub level: WarningLevel,
    /// Human-readable message.
    pub message: String,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(tokens: u64, rate: f64) -> UsageSnapshot {
        UsageSnapshot {
            current_usage: CurrentUsage {
                total_tokens: tokens,
                total_cost: 1.5,
                total_messages: 10,
            },
            model_distribution: HashMap::new(),
            session_window: SessionWindow {
                start: Utc::now(),
                end: Some(Utc::now() + Duration::hours(5)),
            },
            burn_rate: BurnRate {
                tokens_per_minute: rate,
            },
            active_sessions: 1,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_valid_snapshot() {
        assert!(snapshot(1000, 50.0).validate().is_ok());
    }

    #[test]
    fn test_negative_cost_rejected() {
        let mut s = snapshot(1000, 50.0);
        s.current_usage.total_cost = -1.0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_nan_rate_rejected_and_sanitized() {
        let mut s = snapshot(1000, f64::NAN);
        assert!(s.validate().is_err());
        s.sanitize();
        assert_eq!(s.burn_rate.tokens_per_minute, 0.0);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_inverted_window_rejected() {
        let mut s = snapshot(1000, 50.0);
        s.session_window.end = Some(s.session_window.start - Duration::minutes(1));
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_open_ended_window_allowed() {
        let mut s = snapshot(1000, 50.0);
        s.session_window.end = None;
        assert!(s.validate().is_ok());
        assert!(s.session_window.duration().is_none());
    }

    #[test]
    fn test_distribution_sum_tolerance() {
        let mut s = snapshot(1000, 50.0);
        s.model_distribution.insert(
            "sonnet".to_string(),
            ModelUsage {
                tokens: 700,
                cost: 1.0,
                messages: 7,
                percentage: 70.2,
            },
        );
        s.model_distribution.insert(
            "opus".to_string(),
            ModelUsage {
                tokens: 300,
                cost: 0.5,
                messages: 3,
                percentage: 29.9,
            },
        );
        // 100.1 is within tolerance
        assert!(s.validate().is_ok());

        s.model_distribution.get_mut("opus").unwrap().percentage = 10.0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_distribution_sum_ignored_when_idle() {
        let mut s = snapshot(0, 0.0);
        s.model_distribution.insert(
            "sonnet".to_string(),
            ModelUsage {
                tokens: 0,
                cost: 0.0,
                messages: 0,
                percentage: 0.0,
            },
        );
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_danger_warning() {
        let mut s = snapshot(1000, 50.0);
        assert!(!s.has_danger_warning());
        s.warnings.push(UsageWarning {
            level: WarningLevel::Danger,
            message: "over limit".to_string(),
        });
        assert!(s.has_danger_warning());
    }
}
