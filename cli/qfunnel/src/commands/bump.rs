//! Bump command.

use anyhow::Result;
use clap::Args;
use qfunnel_core::JobFilter;
use serde_json::json;

use crate::output::{print_json, print_success, OutputFormat};

use super::CommandContext;

/// Move buffered jobs whose name matches to the front of the line.
#[derive(Debug, Args)]
pub struct BumpCommand {
    /// Regular expression matched against job names.
    #[arg(long)]
    name: String,
}

impl BumpCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let filter = JobFilter::by_name(&self.name)?;
        let bumped = ctx.funnel.bump(&filter)?;

        match ctx.format {
            OutputFormat::Json => print_json(&json!({ "bumped": bumped })),
            OutputFormat::Table => print_success(&format!("Moved {} job(s) to the front", bumped)),
        }

        Ok(())
    }
}
