// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! QuotaWatch CLI - live quota telemetry from the command line.
//!
//! # Examples
//!
//! ```bash
//! # One-shot usage summary with prediction
//! quotawatch
//!
//! # JSON output
//! quotawatch summary --json
//!
//! # Live updates until Ctrl-C
//! quotawatch watch
//!
//! # Plan management
//! quotawatch plans list
//! quotawatch plans use max5
//! quotawatch plans set-custom 100000
//!
//! # Point at a non-default backend
//! quotawatch --base-url http://127.0.0.1:4100 summary
//! ```

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use quotawatch_transport::{ServiceEndpoints, TransportConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

use commands::{plans, summary, watch};

// ============================================================================
// CLI Definition
// ============================================================================

/// QuotaWatch CLI - live quota telemetry.
#[derive(Parser)]
#[command(name = "quotawatch")]
#[command(about = "Live usage-telemetry client for AI coding assistant quotas")]
#[command(version)]
pub struct Cli {
    /// Subcommand to run. If none, runs 'summary' by default.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Base URL of the usage service.
    #[arg(long, global = true)]
    pub base_url: Option<Url>,

    /// JSON output for scripting.
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Quiet mode (minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// One-shot usage summary with prediction (default).
    #[command(visible_alias = "s")]
    Summary,

    /// Print live updates until Ctrl-C.
    #[command(visible_alias = "w")]
    Watch,

    /// Manage quota plans.
    #[command(visible_alias = "p")]
    Plans(plans::PlansArgs),
}

impl Cli {
    /// Transport configuration derived from the global flags.
    ///
    /// # Errors
    ///
    /// Fails when the base URL cannot host the service endpoints.
    pub fn transport_config(&self) -> Result<TransportConfig> {
        let mut config = TransportConfig::default();
        if let Some(base) = &self.base_url {
            config.endpoints = ServiceEndpoints::from_base(base)?;
        }
        Ok(config)
    }
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return; // No logging in quiet mode
    }

    let filter = if verbose {
        EnvFilter::new("quotawatch=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quotawatch=info"))
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Some(Commands::Watch) => watch::run(&cli).await,
        Some(Commands::Plans(args)) => plans::run(args, &cli).await,
        Some(Commands::Summary) | None => summary::run(&cli).await,
    };

    if let Err(e) = result {
        if !cli.quiet {
            eprintln!("Error: {e}");
        }
        std::process::exit(1);
    }

    Ok(())
}
