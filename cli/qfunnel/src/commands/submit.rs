//! Submit command.

use anyhow::Result;
use clap::Args;
use qfunnel_core::SubmitRequest;
use serde_json::json;

use crate::output::{print_info, print_json, print_success, OutputFormat};

use super::CommandContext;

/// Submit a command to the first candidate queue with room, or buffer it.
#[derive(Debug, Args)]
pub struct SubmitCommand {
    /// Candidate queue. Repeat to add fallbacks, tried in order.
    #[arg(long = "queue", short = 'q', required = true)]
    queues: Vec<String>,

    /// Job name.
    #[arg(long, short = 'N')]
    name: String,

    /// Buffer the job without trying to dispatch it.
    #[arg(long)]
    deferred: bool,

    /// Command to run, passed to the scheduler untouched.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

impl SubmitCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let outcome = ctx
            .funnel
            .submit(SubmitRequest {
                queues: self.queues,
                name: self.name.clone(),
                command: self.command,
                deferred: self.deferred,
            })
            .await?;

        match ctx.format {
            OutputFormat::Json => print_json(&json!({
                "local_id": outcome.local_id,
                "dispatched": outcome.dispatched,
            })),
            OutputFormat::Table => {
                for dispatched in &outcome.dispatched {
                    let message = format!(
                        "Submitted {} (x{}) to {}",
                        dispatched.name, dispatched.local_id, dispatched.queue
                    );
                    if dispatched.local_id == outcome.local_id {
                        print_success(&message);
                    } else {
                        print_info(&message);
                    }
                }
                if !outcome.was_dispatched() {
                    print_info(&format!(
                        "Buffered {} as x{}",
                        self.name, outcome.local_id
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use crate::commands::Cli;

    #[test]
    fn test_command_is_forwarded_verbatim() {
        let cli = Cli::try_parse_from([
            "qfunnel", "submit", "--queue", "a", "--queue", "b", "--name", "train", "--",
            "python", "-u", "train.py", "--lr", "0.1",
        ])
        .unwrap();
        let debug = format!("{:?}", cli);
        assert!(debug.contains(r#"queues: ["a", "b"]"#), "{debug}");
        assert!(
            debug.contains(r#"command: ["python", "-u", "train.py", "--lr", "0.1"]"#),
            "{debug}"
        );
    }

    #[test]
    fn test_requires_a_queue() {
        assert!(Cli::try_parse_from(["qfunnel", "submit", "--name", "x", "--", "true"]).is_err());
    }
}
