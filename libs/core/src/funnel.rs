//! The funnel: every user-facing operation over one backend and one ledger.
//!
//! Each operation opens its own ledger handle and drops it when done, so a
//! long-lived `Funnel` (the watch loop) never pins a connection between
//! cycles.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::admission;
use crate::backend::Backend;
use crate::config::FunnelConfig;
use crate::directory;
use crate::error::FunnelError;
use crate::filter::JobFilter;
use crate::job::{Dispatched, Limit, ListOwnInfo, ListQueueInfo, NewJob};
use crate::maintenance::{self, DeleteSummary};
use crate::store::Store;

/// A request to run a command through the funnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    /// Candidate queues in fallback order.
    pub queues: Vec<String>,
    pub name: String,
    /// Command arguments, forwarded to the backend untouched.
    pub command: Vec<String>,
    /// Only buffer the job; leave dispatch to the next check.
    pub deferred: bool,
}

/// Result of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// Ledger id the job was buffered under.
    pub local_id: i64,
    /// Jobs dispatched by the follow-up check, possibly including this one.
    pub dispatched: Vec<Dispatched>,
}

impl SubmitOutcome {
    /// Whether the submitted job itself reached the backend.
    pub fn was_dispatched(&self) -> bool {
        self.dispatched.iter().any(|d| d.local_id == self.local_id)
    }
}

pub struct Funnel<B> {
    backend: B,
    config: FunnelConfig,
}

impl<B: Backend> Funnel<B> {
    pub fn new(backend: B, config: FunnelConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &FunnelConfig {
        &self.config
    }

    fn open_store(&self) -> Result<Store, FunnelError> {
        Ok(Store::open(&self.config.db_path, self.config.lock_timeout)?)
    }

    pub fn get_limit(&self, queue: &str) -> Result<Option<u32>, FunnelError> {
        Ok(self.open_store()?.get_limit(queue)?)
    }

    pub fn all_limits(&self) -> Result<Vec<Limit>, FunnelError> {
        Ok(self.open_store()?.all_limits()?)
    }

    pub fn set_limit(&self, queue: &str, value: i64) -> Result<(), FunnelError> {
        self.open_store()?.set_limit(queue, value)?;
        info!(queue, value, "Limit set");
        Ok(())
    }

    pub fn delete_limit(&self, queue: &str) -> Result<bool, FunnelError> {
        let existed = self.open_store()?.delete_limit(queue)?;
        info!(queue, existed, "Limit removed");
        Ok(existed)
    }

    /// Buffer a job, then run a check unless the request is deferred.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitOutcome, FunnelError> {
        if request.name.is_empty() {
            return Err(FunnelError::Invalid("job name cannot be empty".to_string()));
        }
        if request.queues.is_empty() {
            return Err(FunnelError::Invalid(
                "at least one queue is required".to_string(),
            ));
        }

        let job = NewJob {
            name: request.name,
            command: request.command,
            cwd: self.backend.cwd()?,
            queues: request.queues,
        };

        let mut store = self.open_store()?;
        let local_id = store.enqueue(&job)?;
        info!(local_id, name = %job.name, deferred = request.deferred, "Job accepted");

        let dispatched = if request.deferred {
            Vec::new()
        } else {
            admission::check(&mut store, &self.backend).await?
        };

        Ok(SubmitOutcome {
            local_id,
            dispatched,
        })
    }

    /// Dispatch buffered jobs while any queue has room.
    pub async fn check(&self) -> Result<Vec<Dispatched>, FunnelError> {
        let mut store = self.open_store()?;
        admission::check(&mut store, &self.backend).await
    }

    /// Run [`Funnel::check`] every `interval` until `shutdown` turns true.
    ///
    /// A failed cycle is logged and the loop carries on. Shutdown is only
    /// observed between cycles.
    pub async fn watch(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs_f64(), "Starting watch loop");

        loop {
            info!("Checking buffered jobs");
            match self.check().await {
                Ok(dispatched) => info!(dispatched = dispatched.len(), "Check complete"),
                Err(e) => error!(error = %e, "Check failed"),
            }

            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    // Sender gone: run on the timer alone.
                    if changed.is_err() {
                        tokio::time::sleep(interval).await;
                    } else if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Watch loop stopped");
    }

    /// The caller's jobs, backend and buffered, with per-limit usage.
    pub async fn list_own(&self, filter: &JobFilter) -> Result<ListOwnInfo, FunnelError> {
        let store = self.open_store()?;
        directory::list_own(&store, &self.backend, filter).await
    }

    /// All jobs in `queue`, backend and buffered, with the caller's usage.
    pub async fn list_queue(
        &self,
        queue: &str,
        filter: &JobFilter,
    ) -> Result<ListQueueInfo, FunnelError> {
        let store = self.open_store()?;
        directory::list_queue(&store, &self.backend, queue, filter).await
    }

    /// Delete jobs by id: `x<n>` ids from the ledger, the rest in the backend.
    pub async fn delete<S: AsRef<str>>(&self, ids: &[S]) -> Result<DeleteSummary, FunnelError> {
        let mut store = self.open_store()?;
        maintenance::delete(&mut store, &self.backend, ids).await
    }

    /// Move matching buffered jobs ahead of the rest.
    pub fn bump(&self, filter: &JobFilter) -> Result<usize, FunnelError> {
        let mut store = self.open_store()?;
        maintenance::bump(&mut store, filter)
    }
}
