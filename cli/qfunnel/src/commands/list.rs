//! List command.

use anyhow::Result;
use clap::Args;
use qfunnel_core::JobFilter;

use crate::output::{print_json, print_table, CapacityRow, OutputFormat, OwnJobRow, QueueJobRow};

use super::CommandContext;

/// List your jobs, or every user's jobs in one queue.
///
/// Buffered jobs appear after the scheduler's, with ids of the form `x<n>`.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Only list jobs in this queue, across all users.
    queue: Option<String>,

    /// Only list jobs whose name matches this regular expression.
    #[arg(long)]
    name: Option<String>,
}

impl ListCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let filter = JobFilter::from_pattern(self.name.as_deref())?;

        match self.queue {
            Some(queue) => {
                let info = ctx.funnel.list_queue(&queue, &filter).await?;
                match ctx.format {
                    OutputFormat::Json => print_json(&info),
                    OutputFormat::Table => {
                        let rows: Vec<QueueJobRow> = info.jobs.iter().map(QueueJobRow::from).collect();
                        print_table(&rows, "No jobs found.");
                        println!();
                        print_table(&[CapacityRow::from(&info.capacity)], "");
                    }
                }
            }
            None => {
                let info = ctx.funnel.list_own(&filter).await?;
                match ctx.format {
                    OutputFormat::Json => print_json(&info),
                    OutputFormat::Table => {
                        let rows: Vec<OwnJobRow> = info.jobs.iter().map(OwnJobRow::from).collect();
                        print_table(&rows, "No jobs found.");
                        if !info.capacities.is_empty() {
                            println!();
                            let rows: Vec<CapacityRow> =
                                info.capacities.iter().map(CapacityRow::from).collect();
                            print_table(&rows, "");
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
