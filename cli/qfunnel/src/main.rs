//! qfunnel - buffer batch jobs locally and release them as queues free up.
//!
//! Logging goes to stderr and is controlled by `QFUNNEL_LOG`.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod error;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("QFUNNEL_LOG")
                .unwrap_or_else(|_| EnvFilter::new(cli.default_log_level())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
