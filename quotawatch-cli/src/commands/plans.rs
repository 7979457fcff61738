//! Plans command - list and manage quota plans.

use anyhow::Result;
use clap::{Args, Subcommand};
use quotawatch_store::{ConfigChangeBus, QuotaPlanRegistry};
use quotawatch_transport::{publish_custom_limits, CustomLimitsBody};
use tracing::warn;

use crate::Cli;

/// Arguments for the plans command.
#[derive(Args)]
pub struct PlansArgs {
    /// What to do with the plans.
    #[command(subcommand)]
    pub action: PlansAction,
}

/// Plan management actions.
#[derive(Subcommand)]
pub enum PlansAction {
    /// List all selectable plans.
    List,
    /// Switch the active plan.
    Use {
        /// Plan id (pro, max5, max20, custom).
        id: String,
    },
    /// Set the custom plan's token limit.
    SetCustom {
        /// Token ceiling; must be positive.
        tokens: u64,
    },
}

/// Runs the plans command.
pub async fn run(args: &PlansArgs, cli: &Cli) -> Result<()> {
    let registry = QuotaPlanRegistry::load_default(ConfigChangeBus::new()).await;

    match &args.action {
        PlansAction::List => {
            let active = registry.active_plan_id().await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                    "active": active,
                    "plans": registry.plans().await,
                }))?);
                return Ok(());
            }
            for plan in registry.plans().await {
                let marker = if plan.id == active { "*" } else { " " };
                println!(
                    "{marker} {:<8} {:<8} {:>8} tokens  ${:>7.2}  {:>5} messages",
                    plan.id, plan.name, plan.token_limit, plan.cost_limit, plan.message_limit
                );
            }
        }
        PlansAction::Use { id } => {
            let plan = registry.set_active_plan(id).await?;
            if !cli.quiet {
                println!("Active plan: {} ({} tokens)", plan.name, plan.token_limit);
            }
        }
        PlansAction::SetCustom { tokens } => {
            let plan = registry.set_custom_token_limit(*tokens).await?;
            if !cli.quiet {
                println!(
                    "Custom plan: {} tokens / ${:.2} / {} messages",
                    plan.token_limit, plan.cost_limit, plan.message_limit
                );
            }

            // Best effort: the local change is already committed.
            let config = cli.transport_config()?;
            let body = CustomLimitsBody {
                tokens: plan.token_limit,
                cost: plan.cost_limit,
                messages: plan.message_limit,
            };
            if let Err(e) = publish_custom_limits(
                &reqwest::Client::new(),
                &config.endpoints.custom_limits_url,
                &body,
            )
            .await
            {
                warn!(error = %e, "Could not notify the backend of the new limits");
            }
        }
    }

    Ok(())
}
