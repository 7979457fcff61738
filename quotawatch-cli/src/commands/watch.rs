//! Watch command - live updates until Ctrl-C.

use anyhow::Result;
use quotawatch_client::{ClientConfig, UsageFacade};
use tracing::info;

use crate::output::render_update_line;
use crate::Cli;

/// Runs the watch command.
pub async fn run(cli: &Cli) -> Result<()> {
    let config = ClientConfig {
        transport: cli.transport_config()?,
        ..ClientConfig::default()
    };

    info!(endpoint = %config.transport.endpoints.stream_url, "Starting watch mode");
    let facade = UsageFacade::start(config).await;

    let mut updates = facade.snapshot_watch();
    let mut link = facade.link_state_watch();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                if let (Some(snapshot), Some(metrics)) = (facade.snapshot(), facade.metrics().await) {
                    println!("{}", render_update_line(&snapshot, &metrics, facade.is_stale()));
                }
            }
            changed = link.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *link.borrow();
                if !cli.quiet {
                    eprintln!("link: {state}");
                }
            }
        }
    }

    facade.shutdown().await;
    info!("Watch mode stopped");
    Ok(())
}
