//! `freehome-mcp` server binary.
//!
//! Connects to the controller, then serves MCP on `/mcp` until Ctrl-C.
//! Logging honours `RUST_LOG` and defaults to `info`.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use freehome_mcp::{Config, Result, Service};

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(config: Config) -> Result<()> {
    let service: Service = config.into_builder()?.build()?;

    // No listener until the controller has confirmed the subscription.
    service.start().await?;

    service.serve().await
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let config = Config::parse();
    info!(?config, "Starting free@home MCP server");

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
