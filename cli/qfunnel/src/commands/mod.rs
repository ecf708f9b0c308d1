//! CLI commands.

mod bump;
mod check;
mod delete;
mod limit;
mod list;
mod submit;

use anyhow::Result;
use clap::{Parser, Subcommand};
use qfunnel_core::{Funnel, FunnelConfig};
use qfunnel_sge::SgeBackend;

use crate::output::OutputFormat;

/// qfunnel - Buffer batch jobs locally and release them as queues free up.
#[derive(Debug, Parser)]
#[command(name = "qfunnel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table", value_parser = ["table", "json"])]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show, set, or delete per-queue limits.
    Limit(limit::LimitCommand),

    /// Submit a command to the first candidate queue with room.
    Submit(submit::SubmitCommand),

    /// List your jobs, or all jobs in one queue.
    List(list::ListCommand),

    /// Dispatch buffered jobs while queues have room.
    Check(check::CheckCommand),

    /// Run check periodically until interrupted.
    Watch(check::WatchCommand),

    /// Delete jobs by id (`x<n>` for buffered jobs).
    Delete(delete::DeleteCommand),

    /// Move matching buffered jobs to the front.
    Bump(bump::BumpCommand),
}

impl Cli {
    /// Default log filter when `QFUNNEL_LOG` is unset.
    pub fn default_log_level(&self) -> &'static str {
        match self.command {
            Commands::Watch(_) => "info",
            _ => "warn",
        }
    }

    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let format = match self.format.as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Table,
        };

        let config = FunnelConfig::from_env()?;
        let backend = SgeBackend::from_env()?;
        let ctx = CommandContext {
            funnel: Funnel::new(backend, config),
            format,
        };

        match self.command {
            Commands::Limit(cmd) => cmd.run(ctx),
            Commands::Submit(cmd) => cmd.run(ctx).await,
            Commands::List(cmd) => cmd.run(ctx).await,
            Commands::Check(cmd) => cmd.run(ctx).await,
            Commands::Watch(cmd) => cmd.run(ctx).await,
            Commands::Delete(cmd) => cmd.run(ctx).await,
            Commands::Bump(cmd) => cmd.run(ctx),
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub funnel: Funnel<SgeBackend>,
    pub format: OutputFormat,
}
