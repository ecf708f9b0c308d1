//! Check and watch commands.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio::sync::watch;
use tracing::info;

use crate::output::{print_info, print_json, print_success, OutputFormat};

use super::CommandContext;

/// Dispatch buffered jobs while their queues have room.
#[derive(Debug, Args)]
pub struct CheckCommand {}

impl CheckCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let dispatched = ctx.funnel.check().await?;

        match ctx.format {
            OutputFormat::Json => print_json(&dispatched),
            OutputFormat::Table if dispatched.is_empty() => print_info("Nothing to dispatch"),
            OutputFormat::Table => {
                for job in &dispatched {
                    print_success(&format!(
                        "Submitted {} (x{}) to {}",
                        job.name, job.local_id, job.queue
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Run check on a fixed interval until interrupted.
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Seconds between checks [default: QFUNNEL_WATCH_INTERVAL or 300].
    #[arg(long)]
    seconds: Option<f64>,
}

impl WatchCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let interval = match self.seconds {
            Some(secs) => Duration::try_from_secs_f64(secs)
                .context("--seconds must be a non-negative number")?,
            None => ctx.funnel.config().watch_interval,
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, stopping after the current cycle");
                let _ = shutdown_tx.send(true);
            }
        });

        ctx.funnel.watch(interval, shutdown_rx).await;
        Ok(())
    }
}
