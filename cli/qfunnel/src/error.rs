//! Error handling and display for the CLI.

use colored::Colorize;
use qfunnel_core::FunnelError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(CliError::Usage(_)) = err.downcast_ref::<CliError>() {
        eprintln!("\n{}", "Hint: Run `qfunnel help` for usage.".yellow());
        return;
    }

    let Some(funnel_err) = err.downcast_ref::<FunnelError>() else {
        return;
    };
    if funnel_err.is_lock_timeout() {
        eprintln!(
            "\n{}",
            "Hint: Another qfunnel process is holding the ledger. Retry, or raise QFUNNEL_LOCK_TIMEOUT."
                .yellow()
        );
    } else if funnel_err.is_backend() {
        eprintln!(
            "\n{}",
            "Hint: Check that the Grid Engine tools are on PATH and SGE_ROOT is set.".yellow()
        );
    }
}
