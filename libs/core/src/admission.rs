//! Moving buffered jobs to the backend as capacity allows.
//!
//! Each attempt runs inside one exclusive ledger transaction and makes at
//! most one decision: capacity figures come from a backend snapshot that is
//! stale as soon as anything is submitted, so the next decision must re-read
//! it. [`check`] repeats attempts until one makes no progress.
//!
//! Priority is submission order (lowest local id first), then the job's own
//! fallback order. For every queue, only the highest-priority buffered job
//! naming it is considered, so a later job can never overtake an earlier one
//! on a queue both of them want.

use tracing::{debug, info};

use crate::backend::Backend;
use crate::capacity;
use crate::error::FunnelError;
use crate::job::{BufferedJob, Dispatched};
use crate::store::Store;

/// A (queue, job) pair eligible for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub queue: &'a str,
    /// Position of `queue` in the job's fallback list.
    pub ordinal: usize,
    pub job: &'a BufferedJob,
}

/// Candidate pairs in the order they should be tried.
///
/// `jobs` must be sorted by local id, as the ledger returns them.
pub fn candidates(jobs: &[BufferedJob]) -> Vec<Candidate<'_>> {
    let mut claimed: Vec<&str> = Vec::new();
    let mut out = Vec::new();
    for job in jobs {
        for (ordinal, queue) in job.queues.iter().enumerate() {
            if claimed.contains(&queue.as_str()) {
                continue;
            }
            claimed.push(queue);
            out.push(Candidate {
                queue,
                ordinal,
                job,
            });
        }
    }
    out
}

/// Try to dispatch one buffered job.
///
/// Returns `None` when no candidate queue has room. On success the job has
/// been removed from the ledger and accepted by the backend; if the backend
/// rejects it, the ledger is left untouched.
pub async fn try_dequeue_one<B>(
    store: &mut Store,
    backend: &B,
) -> Result<Option<Dispatched>, FunnelError>
where
    B: Backend + ?Sized,
{
    let tx = store.exclusive()?;
    let jobs = tx.list_buffered()?;

    for candidate in candidates(&jobs) {
        let Candidate { queue, ordinal, job } = candidate;
        let admit = match tx.get_limit(queue)? {
            None => true,
            Some(limit) => capacity::has_open_slot(backend, queue, limit).await?,
        };
        if !admit {
            debug!(queue, local_id = job.local_id, "No room for candidate");
            continue;
        }

        tx.dequeue(job.local_id)?;
        backend
            .submit_job(queue, &job.name, &job.command, &job.cwd)
            .await?;
        tx.commit()?;

        info!(
            local_id = job.local_id,
            name = %job.name,
            queue,
            fallback = ordinal,
            "Dispatched buffered job"
        );
        return Ok(Some(Dispatched {
            local_id: job.local_id,
            queue: queue.to_string(),
            name: job.name.clone(),
        }));
    }

    Ok(None)
}

/// Dispatch buffered jobs until no queue has room.
///
/// Every success removes one ledger row, so this terminates after at most as
/// many rounds as there are buffered jobs.
pub async fn check<B>(store: &mut Store, backend: &B) -> Result<Vec<Dispatched>, FunnelError>
where
    B: Backend + ?Sized,
{
    let mut dispatched = Vec::new();
    while let Some(job) = try_dequeue_one(store, backend).await? {
        dispatched.push(job);
    }
    Ok(dispatched)
}
