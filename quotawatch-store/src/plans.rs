//! The quota plan registry.
//!
//! Holds the fixed catalog plus the user-editable custom plan, persists
//! the selection, and publishes changes on the config bus. Validation
//! happens before any mutation: a rejected change leaves both the
//! in-memory state and the persisted file untouched.

use quotawatch_core::{
    builtin_catalog, CoreError, CustomLimitFactors, QuotaPlan, CUSTOM_PLAN_ID,
    DEFAULT_CUSTOM_TOKEN_LIMIT,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config_bus::{ConfigChangeBus, ConfigEvent};
use crate::error::StoreError;
use crate::persistence::{default_plans_path, load_json_or_default, save_json};

// ============================================================================
// Persisted Config
// ============================================================================

/// Plan state written to `plans.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanConfig {
    /// Id of the selected plan.
    pub active_plan: String,
    /// Token limit of the custom plan.
    pub custom_token_limit: u64,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            active_plan: "pro".to_string(),
            custom_token_limit: DEFAULT_CUSTOM_TOKEN_LIMIT,
        }
    }
}

// ============================================================================
// Quota Plan Registry
// ============================================================================

/// Catalog of quota plans plus the persisted selection.
pub struct QuotaPlanRegistry {
    config: RwLock<PlanConfig>,
    factors: CustomLimitFactors,
    path: PathBuf,
    bus: ConfigChangeBus,
}

impl QuotaPlanRegistry {
    /// Loads the registry from the default config path.
    pub async fn load_default(bus: ConfigChangeBus) -> Self {
        Self::load(default_plans_path(), bus).await
    }

    /// Loads the registry from a specific path, falling back to defaults
    /// when the file is missing or unreadable.
    pub async fn load(path: PathBuf, bus: ConfigChangeBus) -> Self {
        let mut config: PlanConfig = load_json_or_default(&path).await;

        // A corrupt file must not leave the registry unusable.
        if config.custom_token_limit == 0 {
            warn!("Persisted custom token limit is zero, restoring default");
            config.custom_token_limit = DEFAULT_CUSTOM_TOKEN_LIMIT;
        }
        if Self::resolve(&config.active_plan, config.custom_token_limit).is_none() {
            warn!(plan = %config.active_plan, "Persisted plan id is unknown, restoring default");
            config.active_plan = PlanConfig::default().active_plan;
        }

        debug!(plan = %config.active_plan, custom_limit = config.custom_token_limit, "Plan registry loaded");
        Self {
            config: RwLock::new(config),
            factors: CustomLimitFactors::default(),
            path,
            bus,
        }
    }

    fn resolve(id: &str, custom_token_limit: u64) -> Option<QuotaPlan> {
        if id == CUSTOM_PLAN_ID {
            return QuotaPlan::custom(custom_token_limit, &CustomLimitFactors::default()).ok();
        }
        builtin_catalog().into_iter().find(|p| p.id == id)
    }

    // ========================================================================
    // Catalog Access
    // ========================================================================

    /// All selectable plans: the fixed catalog plus the current custom plan.
    pub async fn plans(&self) -> Vec<QuotaPlan> {
        let config = self.config.read().await;
        let mut catalog = builtin_catalog();
        if let Ok(custom) = QuotaPlan::custom(config.custom_token_limit, &self.factors) {
            catalog.push(custom);
        }
        catalog
    }

    /// Looks a plan up by id.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::PlanNotFound` for an unknown id.
    pub async fn plan(&self, id: &str) -> Result<QuotaPlan, CoreError> {
        let config = self.config.read().await;
        Self::resolve(id, config.custom_token_limit)
            .ok_or_else(|| CoreError::PlanNotFound(id.to_string()))
    }

    /// The currently active plan.
    pub async fn active_plan(&self) -> QuotaPlan {
        let config = self.config.read().await;
        // The constructor and every setter keep the active id resolvable.
        Self::resolve(&config.active_plan, config.custom_token_limit)
            .unwrap_or_else(|| builtin_catalog().remove(0))
    }

    /// Id of the currently active plan.
    pub async fn active_plan_id(&self) -> String {
        self.config.read().await.active_plan.clone()
    }

    /// Current custom plan token limit.
    pub async fn custom_token_limit(&self) -> u64 {
        self.config.read().await.custom_token_limit
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Switches the active plan: validates the id, persists, publishes.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::PlanNotFound` for an unknown id, or the
    /// persistence error; neither mutates the registry.
    pub async fn set_active_plan(&self, id: &str) -> Result<QuotaPlan, StoreError> {
        let mut config = self.config.write().await;
        let plan = Self::resolve(id, config.custom_token_limit)
            .ok_or_else(|| CoreError::PlanNotFound(id.to_string()))?;

        // Persist first so a disk failure leaves memory consistent.
        let mut next = config.clone();
        next.active_plan = plan.id.clone();
        save_json(&self.path, &next).await?;
        *config = next;
        drop(config);

        info!(plan = %plan.id, "Active plan changed");
        self.bus.publish(ConfigEvent::ActivePlanChanged {
            plan_id: plan.id.clone(),
        });
        Ok(plan)
    }

    /// Updates the custom plan's token limit: rejects zero, derives cost
    /// and message ceilings, persists, and publishes the re-derived plan.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidPlanConfig` for a zero limit, or the
    /// persistence error; neither mutates the registry or the file.
    pub async fn set_custom_token_limit(&self, token_limit: u64) -> Result<QuotaPlan, StoreError> {
        let plan = QuotaPlan::custom(token_limit, &self.factors).map_err(StoreError::Core)?;

        let mut config = self.config.write().await;
        let mut next = config.clone();
        next.custom_token_limit = token_limit;
        save_json(&self.path, &next).await?;
        *config = next;
        drop(config);

        info!(token_limit, "Custom plan limits re-derived");
        self.bus
            .publish(ConfigEvent::CustomLimitChanged { plan: plan.clone() });
        Ok(plan)
    }
}

// ============================================================================
// Tests
// ============================================================================
