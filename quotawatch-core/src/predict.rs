//! The prediction engine.
//!
//! Pure functions over a [`UsageSnapshot`] plus the active [`QuotaPlan`],
//! producing [`DerivedMetrics`]: percentage-to-limit per dimension, the
//! projected exhaustion time, and the window reset time. Metrics are
//! recomputed on every read and never persisted. `now` is always passed in
//! so the math is deterministic under test.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{QuotaPlan, UsageSnapshot};

/// Default window length assumed when the backend omits `session_window.end`.
///
/// This fallback exists for robustness only; it can silently diverge from
/// the server's actual notion of reset, which is why it is configurable via
/// [`PredictionConfig`] instead of a buried constant.
pub const DEFAULT_FALLBACK_WINDOW_MINUTES: i64 = 300;

// ============================================================================
// Derived Metrics
// ============================================================================

/// Projected quota exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "at")]
pub enum Exhaustion {
    /// Exhaustion projected at this instant (equal to `now` when already
    /// over quota).
    At(DateTime<Utc>),
    /// No projection possible: the burn rate is zero or negative.
    Unavailable,
}

impl Exhaustion {
    /// Returns the projected instant, if available.
    pub fn at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::At(ts) => Some(*ts),
            Self::Unavailable => None,
        }
    }
}

/// Metrics derived from a snapshot and the active plan.
///
/// Computed per read, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetrics {
    /// Percent of the token ceiling used, clamped to [0, 100].
    pub tokens_percent: f64,
    /// Percent of the cost ceiling used, clamped to [0, 100].
    pub cost_percent: f64,
    /// Percent of the message ceiling used, clamped to [0, 100].
    pub messages_percent: f64,
    /// Projected exhaustion time at the current burn rate.
    pub projected_exhaustion: Exhaustion,
    /// When the session window resets.
    pub window_reset: DateTime<Utc>,
}

// ============================================================================
// Prediction Config
// ============================================================================

/// Tunables for the prediction engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Assumed window length when the backend omits the window end, in
    /// minutes.
    pub fallback_window_minutes: i64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            fallback_window_minutes: DEFAULT_FALLBACK_WINDOW_MINUTES,
        }
    }
}

// ============================================================================
// Prediction Functions
// ============================================================================

/// Percent of `limit` used by `current`, clamped to [0, 100].
///
/// Over-quota usage stays representable upstream; display is capped here.
#[allow(clippy::cast_precision_loss)]
pub fn percent_used(current: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    (100.0 * current as f64 / limit as f64).clamp(0.0, 100.0)
}

/// Percent variant for fractional dimensions (cost).
pub fn percent_used_f64(current: f64, limit: f64) -> f64 {
    if limit <= 0.0 || !current.is_finite() {
        return 0.0;
    }
    (100.0 * current / limit).clamp(0.0, 100.0)
}

/// Computes derived metrics with default tunables.
pub fn predict(snapshot: &UsageSnapshot, plan: &QuotaPlan, now: DateTime<Utc>) -> DerivedMetrics {
    predict_with(snapshot, plan, now, &PredictionConfig::default())
}

/// Computes derived metrics.
///
/// - Percentages per dimension are clamped even when raw usage exceeds the
///   ceiling.
/// - Exhaustion is [`Exhaustion::Unavailable`] iff the burn rate is zero or
///   negative; otherwise `now + remaining_tokens / rate` minutes, floored at
///   `now` when the quota is already spent.
/// - The window reset is `session_window.end` when present, else
///   `now + fallback_window_minutes`.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn predict_with(
    snapshot: &UsageSnapshot,
    plan: &QuotaPlan,
    now: DateTime<Utc>,
    config: &PredictionConfig,
) -> DerivedMetrics {
    let usage = &snapshot.current_usage;

    let projected_exhaustion = {
        let rate = snapshot.burn_rate.tokens_per_minute;
        if rate > 0.0 {
            let remaining = plan.token_limit.saturating_sub(usage.total_tokens);
            if remaining == 0 {
                Exhaustion::At(now)
            } else {
                let minutes = remaining as f64 / rate;
                // f64-to-i64 casts saturate, so absurdly low rates cannot
                // overflow the timestamp math.
                Exhaustion::At(now + Duration::milliseconds((minutes * 60_000.0) as i64))
            }
        } else {
            Exhaustion::Unavailable
        }
    };

    let window_reset = snapshot
        .session_window
        .end
        .unwrap_or_else(|| now + Duration::minutes(config.fallback_window_minutes));

    DerivedMetrics {
        tokens_percent: percent_used(usage.total_tokens, plan.token_limit),
        cost_percent: percent_used_f64(usage.total_cost, plan.cost_limit),
        messages_percent: percent_used(usage.total_messages, plan.message_limit),
        projected_exhaustion,
        window_reset,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BurnRate, CurrentUsage, CustomLimitFactors, SessionWindow};
    use std::collections::HashMap;

    fn plan(token_limit: u64) -> QuotaPlan {
        QuotaPlan::custom(token_limit, &CustomLimitFactors::default()).unwrap()
    }

    fn snapshot(tokens: u64, rate: f64, end: Option<DateTime<Utc>>) -> UsageSnapshot {
        UsageSnapshot {
            current_usage: CurrentUsage {
                total_tokens: tokens,
                total_cost: 0.0,
                total_messages: 0,
            },
            model_distribution: HashMap::new(),
            session_window: SessionWindow {
                start: Utc::now() - Duration::hours(1),
                end,
            },
            burn_rate: BurnRate {
                tokens_per_minute: rate,
            },
            active_sessions: 1,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_percent_clamped_over_quota() {
        assert_eq!(percent_used(150_000, 50_000), 100.0);
        assert_eq!(percent_used(0, 50_000), 0.0);
        assert_eq!(percent_used_f64(200.0, 50.0), 100.0);
    }

    #[test]
    fn test_concrete_scenario() {
        // 45k of 50k at 50 tokens/min: 90% used, exhausted in 100 minutes.
        let now = Utc::now();
        let metrics = predict(&snapshot(45_000, 50.0, None), &plan(50_000), now);

        assert!((metrics.tokens_percent - 90.0).abs() < 1e-9);
        let at = metrics.projected_exhaustion.at().unwrap();
        assert_eq!(at, now + Duration::minutes(100));
    }

    #[test]
    fn test_unavailable_iff_rate_nonpositive() {
        let now = Utc::now();
        let p = plan(50_000);

        let idle = predict(&snapshot(1_000, 0.0, None), &p, now);
        assert_eq!(idle.projected_exhaustion, Exhaustion::Unavailable);

        let negative = predict(&snapshot(1_000, -5.0, None), &p, now);
        assert_eq!(negative.projected_exhaustion, Exhaustion::Unavailable);

        let active = predict(&snapshot(1_000, 0.1, None), &p, now);
        assert!(active.projected_exhaustion.at().is_some());
    }

    #[test]
    fn test_already_exhausted_is_now() {
        let now = Utc::now();
        let metrics = predict(&snapshot(60_000, 50.0, None), &plan(50_000), now);
        assert_eq!(metrics.projected_exhaustion, Exhaustion::At(now));
    }

    #[test]
    fn test_monotone_in_consumption() {
        // More consumed at the same positive rate means exhaustion no later.
        let now = Utc::now();
        let p = plan(50_000);
        let earlier = predict(&snapshot(10_000, 50.0, None), &p, now);
        let later = predict(&snapshot(30_000, 50.0, None), &p, now);
        assert!(later.projected_exhaustion.at().unwrap() <= earlier.projected_exhaustion.at().unwrap());
    }

    #[test]
    fn test_window_reset_prefers_server_end() {
        let now = Utc::now();
        let end = now + Duration::hours(2);
        let metrics = predict(&snapshot(0, 0.0, Some(end)), &plan(50_000), now);
        assert_eq!(metrics.window_reset, end);
    }

    #[test]
    fn test_window_reset_fallback_configurable() {
        let now = Utc::now();
        let config = PredictionConfig {
            fallback_window_minutes: 60,
        };
        let metrics = predict_with(&snapshot(0, 0.0, None), &plan(50_000), now, &config);
        assert_eq!(metrics.window_reset, now + Duration::minutes(60));

        let default = predict(&snapshot(0, 0.0, None), &plan(50_000), now);
        assert_eq!(default.window_reset, now + Duration::minutes(300));
    }
}
