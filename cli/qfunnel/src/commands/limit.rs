//! Limit command.

use anyhow::Result;
use clap::Args;
use serde_json::json;

use crate::error::CliError;
use crate::output::{print_json, print_success, print_table, LimitRow, OutputFormat};

use super::CommandContext;

/// Show, set, or delete per-queue limits.
///
/// With no arguments, lists every configured limit. With a queue, shows its
/// limit. With a queue and a value, sets it.
#[derive(Debug, Args)]
pub struct LimitCommand {
    /// Queue name.
    queue: Option<String>,

    /// Maximum number of slots to occupy in the queue.
    #[arg(allow_negative_numbers = true)]
    value: Option<i64>,

    /// Remove the queue's limit.
    #[arg(long)]
    delete: bool,
}

impl LimitCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let funnel = &ctx.funnel;

        if self.delete {
            let Some(queue) = self.queue else {
                return Err(CliError::Usage("missing queue name".to_string()).into());
            };
            if self.value.is_some() {
                return Err(CliError::Usage(
                    "cannot use --delete and set a limit at the same time".to_string(),
                )
                .into());
            }
            let existed = funnel.delete_limit(&queue)?;
            match ctx.format {
                OutputFormat::Json => print_json(&json!({ "queue": queue, "deleted": existed })),
                OutputFormat::Table if existed => {
                    print_success(&format!("Removed limit for {}", queue))
                }
                OutputFormat::Table => println!("no limit"),
            }
            return Ok(());
        }

        match (self.queue, self.value) {
            (Some(queue), Some(value)) => {
                funnel.set_limit(&queue, value)?;
                match ctx.format {
                    OutputFormat::Json => print_json(&json!({ "queue": queue, "limit": value })),
                    OutputFormat::Table => {
                        print_success(&format!("Limit for {} set to {}", queue, value))
                    }
                }
            }
            (Some(queue), None) => {
                let limit = funnel.get_limit(&queue)?;
                match (ctx.format, limit) {
                    (OutputFormat::Json, _) => print_json(&json!({ "queue": queue, "limit": limit })),
                    (OutputFormat::Table, Some(limit)) => println!("{}", limit),
                    (OutputFormat::Table, None) => println!("no limit"),
                }
            }
            (None, _) => {
                let limits = funnel.all_limits()?;
                match ctx.format {
                    OutputFormat::Json => print_json(&limits),
                    OutputFormat::Table => {
                        let rows: Vec<LimitRow> = limits.iter().map(LimitRow::from).collect();
                        print_table(&rows, "No limits set.");
                    }
                }
            }
        }

        Ok(())
    }
}
