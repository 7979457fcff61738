//! Summary command - one-shot poll plus prediction.

use anyhow::{Context, Result};
use chrono::Utc;
use quotawatch_core::predict;
use quotawatch_store::{ConfigChangeBus, QuotaPlanRegistry};
use quotawatch_transport::fetch_realtime;
use tracing::info;

use crate::output::{render_summary, render_summary_json};
use crate::Cli;

/// Runs the summary command.
pub async fn run(cli: &Cli) -> Result<()> {
    let config = cli.transport_config()?;
    info!(endpoint = %config.endpoints.realtime_url, "Fetching usage snapshot");

    let client = reqwest::Client::new();
    let snapshot = fetch_realtime(&client, &config.endpoints.realtime_url)
        .await
        .context("could not fetch a usage snapshot; is the usage service running?")?;

    let registry = QuotaPlanRegistry::load_default(ConfigChangeBus::new()).await;
    let plan = registry.active_plan().await;
    let metrics = predict(&snapshot, &plan, Utc::now());

    if cli.json {
        println!("{}", render_summary_json(&snapshot, &plan, &metrics)?);
    } else {
        print!("{}", render_summary(&snapshot, &plan, &metrics));
    }
    Ok(())
}
