//! Scheduler backend interface.
//!
//! The funnel never talks to the batch scheduler directly; everything goes
//! through [`Backend`]. Listing methods return fresh snapshots on every call,
//! and the scheduler may change between two calls. Callers that combine a
//! pending and a running snapshot must query pending first (see
//! [`crate::capacity::merge_race_safe`]).

use anyhow::Result;
use async_trait::async_trait;

use crate::job::Job;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Directory new jobs should run in.
    fn cwd(&self) -> Result<String>;

    /// Scheduler user name of the caller.
    fn own_user(&self) -> Result<String>;

    /// Hand a job to the scheduler. Fails if the scheduler rejects it.
    async fn submit_job(&self, queue: &str, name: &str, command: &[String], cwd: &str)
        -> Result<()>;

    /// Cancel running or pending jobs by backend id.
    async fn delete_jobs(&self, ids: &[String]) -> Result<()>;

    /// Running and pending jobs of the caller, in all queues.
    async fn own_jobs(&self) -> Result<Vec<Job>>;

    /// Pending jobs of the caller, in all queues.
    async fn own_pending_jobs(&self) -> Result<Vec<Job>>;

    /// Running jobs of the caller in `queue`.
    async fn own_running_jobs_in_queue(&self, queue: &str) -> Result<Vec<Job>>;

    /// Running jobs of every user in `queue`.
    async fn running_jobs_in_queue(&self, queue: &str) -> Result<Vec<Job>>;
}
