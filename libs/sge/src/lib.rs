//! Grid Engine backend for qfunnel.
//!
//! Talks to the scheduler through its command-line tools:
//! - `qsub` to submit
//! - `qdel` to cancel
//! - `qstat -r` to list, parsed by [`qstat`]
//!
//! Commands run with a cleared environment that carries only the variables
//! Grid Engine needs, and with long queue and job names enabled so that
//! listings are not truncated.

pub mod qstat;

use std::path::Path;
use std::process::Output;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use qfunnel_core::{Backend, Job};
use tokio::process::Command;
use tracing::{debug, info};

/// Variables passed through from the caller's environment.
const PASSTHROUGH_VARS: &[&str] = &[
    "PATH",
    "SGE_ROOT",
    "SGE_CELL",
    "SGE_QMASTER_PORT",
    "SGE_LOAD_AVG",
    "SGE_EXECD_PORT",
    "SGE_CLUSTER_NAME",
];

/// Backend driving `qsub`, `qdel`, and `qstat`.
#[derive(Debug, Clone)]
pub struct SgeBackend {
    user: String,
}

impl SgeBackend {
    /// Create a backend acting as the user named by `$USER`.
    pub fn from_env() -> Result<Self> {
        let user = std::env::var("USER").context("USER is not set")?;
        Ok(Self::new(user))
    }

    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }

    fn command(program: &str) -> Command {
        let mut cmd = Command::new(program);
        cmd.env_clear();
        for name in PASSTHROUGH_VARS {
            if let Some(value) = std::env::var_os(name) {
                cmd.env(name, value);
            }
        }
        cmd.env("SGE_LONG_QNAMES", "-1")
            .env("SGE_LONG_JOB_NAMES", "-1");
        cmd
    }

    async fn run(mut cmd: Command, what: &str) -> Result<Output> {
        let output = cmd
            .output()
            .await
            .with_context(|| format!("failed to run {what}"))?;
        if !output.status.success() {
            bail!(
                "{what} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output)
    }

    async fn qstat(&self, args: &[&str]) -> Result<Vec<Job>> {
        let mut cmd = Self::command("qstat");
        cmd.args(args).arg("-r");
        debug!(?args, "Running qstat");
        let output = Self::run(cmd, "qstat").await?;
        qstat::parse_jobs(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl Backend for SgeBackend {
    fn cwd(&self) -> Result<String> {
        let cwd = std::env::current_dir().context("cannot determine working directory")?;
        Ok(cwd.to_string_lossy().into_owned())
    }

    fn own_user(&self) -> Result<String> {
        Ok(self.user.clone())
    }

    async fn submit_job(
        &self,
        queue: &str,
        name: &str,
        command: &[String],
        cwd: &str,
    ) -> Result<()> {
        let mut cmd = Self::command("qsub");
        cmd.args(["-q", queue, "-N", name, "-w", "w"])
            .args(command)
            .current_dir(Path::new(cwd));
        let output = Self::run(cmd, "qsub").await?;
        info!(
            queue,
            name,
            response = %String::from_utf8_lossy(&output.stdout).trim(),
            "Submitted to Grid Engine"
        );
        Ok(())
    }

    async fn delete_jobs(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut cmd = Self::command("qdel");
        cmd.args(ids);
        Self::run(cmd, "qdel").await?;
        Ok(())
    }

    async fn own_jobs(&self) -> Result<Vec<Job>> {
        self.qstat(&["-u", &self.user]).await
    }

    async fn own_pending_jobs(&self) -> Result<Vec<Job>> {
        self.qstat(&["-u", &self.user, "-s", "p"]).await
    }

    async fn own_running_jobs_in_queue(&self, queue: &str) -> Result<Vec<Job>> {
        self.qstat(&["-u", &self.user, "-q", queue, "-s", "r"]).await
    }

    async fn running_jobs_in_queue(&self, queue: &str) -> Result<Vec<Job>> {
        self.qstat(&["-u", "*", "-q", queue, "-s", "r"]).await
    }
}
