//! Quota plan types.
//!
//! A [`QuotaPlan`] is a named ceiling on tokens, cost, and messages. The
//! built-in catalog is fixed; the `custom` plan's token limit is user
//! editable and its other limits derive from [`CustomLimitFactors`].

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Id of the user-editable plan.
pub const CUSTOM_PLAN_ID: &str = "custom";

/// Default token limit for the custom plan before the user edits it.
pub const DEFAULT_CUSTOM_TOKEN_LIMIT: u64 = 50_000;

// ============================================================================
// Quota Plan
// ============================================================================

/// A subscription plan's ceilings, used to compute percentage-used and
/// exhaustion projections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaPlan {
    /// Unique plan id (e.g. `"pro"`, `"custom"`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Token ceiling per session window.
    pub token_limit: u64,
    /// Cost ceiling in USD per session window.
    pub cost_limit: f64,
    /// Message ceiling per session window.
    pub message_limit: u64,
}

impl QuotaPlan {
    fn new(id: &str, name: &str, token_limit: u64, cost_limit: f64, message_limit: u64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            token_limit,
            cost_limit,
            message_limit,
        }
    }

    /// Returns true if this is the user-editable plan.
    pub fn is_custom(&self) -> bool {
        self.id == CUSTOM_PLAN_ID
    }

    /// Builds the custom plan for a given token limit, deriving cost and
    /// message ceilings from the factors.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidPlanConfig` if `token_limit` is zero.
    pub fn custom(token_limit: u64, factors: &CustomLimitFactors) -> Result<Self, CoreError> {
        if token_limit == 0 {
            return Err(CoreError::InvalidPlanConfig(
                "custom token limit must be a positive integer".to_string(),
            ));
        }

        #[allow(clippy::cast_precision_loss)]
        let cost_limit = token_limit as f64 * factors.cost_per_token;
        Ok(Self::new(
            CUSTOM_PLAN_ID,
            "Custom",
            token_limit,
            cost_limit,
            factors.message_limit_for(token_limit),
        ))
    }
}

/// The fixed built-in catalog.
///
/// Limits mirror the subscription tiers of the backing service; only the
/// custom plan is user editable.
pub fn builtin_catalog() -> Vec<QuotaPlan> {
    vec![
        QuotaPlan::new("pro", "Pro", 44_000, 18.0, 250),
        QuotaPlan::new("max5", "Max 5x", 220_000, 35.0, 1_000),
        QuotaPlan::new("max20", "Max 20x", 880_000, 140.0, 2_000),
    ]
}

// ============================================================================
// Custom Limit Factors
// ============================================================================

/// Derivation factors for the custom plan's cost and message ceilings.
///
/// These are reasonable defaults rather than a business rule, so they are
/// configurable instead of hard-coded constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomLimitFactors {
    /// USD per token.
    pub cost_per_token: f64,
    /// Message ceiling used below the scale threshold.
    pub base_message_limit: u64,
    /// Token limit above which the message ceiling scales with tokens.
    pub message_scale_threshold: u64,
    /// Tokens per message once scaling kicks in.
    pub tokens_per_message: u64,
}

impl Default for CustomLimitFactors {
    fn default() -> Self {
        Self {
            cost_per_token: 0.001,
            base_message_limit: 500,
            message_scale_threshold: 500_000,
            tokens_per_message: 1_000,
        }
    }
}

impl CustomLimitFactors {
    /// Message ceiling for a given token limit.
    pub fn message_limit_for(&self, token_limit: u64) -> u64 {
        if token_limit > self.message_scale_threshold {
            (token_limit / self.tokens_per_message).max(self.base_message_limit)
        } else {
            self.base_message_limit
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let catalog = builtin_catalog();
        assert_eq!(catalog.len(), 3);
        assert!(catalog.iter().all(|p| !p.is_custom()));
        assert!(catalog.iter().any(|p| p.id == "pro"));
    }

    #[test]
    fn test_custom_plan_defaults() {
        let plan = QuotaPlan::custom(50_000, &CustomLimitFactors::default()).unwrap();
        assert!(plan.is_custom());
        assert_eq!(plan.token_limit, 50_000);
        assert!((plan.cost_limit - 50.0).abs() < f64::EPSILON);
        assert_eq!(plan.message_limit, 500);
    }

    #[test]
    fn test_custom_plan_message_scaling() {
        let factors = CustomLimitFactors::default();
        // Below threshold: fixed base
        assert_eq!(factors.message_limit_for(500_000), 500);
        // Above threshold: scales with tokens
        assert_eq!(factors.message_limit_for(2_000_000), 2_000);
    }

    #[test]
    fn test_custom_plan_zero_rejected() {
        let result = QuotaPlan::custom(0, &CustomLimitFactors::default());
        assert!(matches!(result, Err(CoreError::InvalidPlanConfig(_))));
    }
}
