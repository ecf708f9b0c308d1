//! Delete command.

use anyhow::Result;
use clap::Args;

use crate::output::{print_info, print_json, print_success, OutputFormat};

use super::CommandContext;

/// Delete jobs. Ids of the form `x<n>` name buffered jobs; anything else is
/// passed to the scheduler.
#[derive(Debug, Args)]
pub struct DeleteCommand {
    /// Job ids.
    #[arg(required = true)]
    ids: Vec<String>,
}

impl DeleteCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let summary = ctx.funnel.delete(self.ids.as_slice()).await?;

        match ctx.format {
            OutputFormat::Json => print_json(&summary),
            OutputFormat::Table => {
                for id in &summary.removed {
                    print_success(&format!("Removed buffered job x{}", id));
                }
                for id in &summary.missing {
                    print_info(&format!("No buffered job x{}", id));
                }
                if !summary.forwarded.is_empty() {
                    print_success(&format!(
                        "Deleted {} from the scheduler",
                        summary.forwarded.join(" ")
                    ));
                }
            }
        }

        Ok(())
    }
}
