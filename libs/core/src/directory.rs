//! Read-side views merging backend jobs with the local ledger.
//!
//! Listings take no ledger lock and may race with a concurrent check; they
//! are for display only.

use crate::backend::Backend;
use crate::capacity::{merge_race_safe, taken_slots};
use crate::error::FunnelError;
use crate::filter::JobFilter;
use crate::job::{Capacity, Job, JobState, ListOwnInfo, ListQueueInfo};
use crate::store::Store;

/// The caller's backend jobs followed by every buffered job, plus the usage
/// of each limited queue.
///
/// Capacity is derived from the same backend snapshot as the job list; jobs
/// are split by their reported state and merged like a live capacity check.
pub async fn list_own<B>(
    store: &Store,
    backend: &B,
    filter: &JobFilter,
) -> Result<ListOwnInfo, FunnelError>
where
    B: Backend + ?Sized,
{
    let user = backend.own_user()?;
    let backend_jobs = backend.own_jobs().await?;

    let capacities = store
        .all_limits()?
        .into_iter()
        .map(|limit| {
            let in_queue = |state: JobState| -> Vec<Job> {
                backend_jobs
                    .iter()
                    .filter(|job| job.queue == limit.queue && job.state == state)
                    .cloned()
                    .collect()
            };
            let jobs = merge_race_safe(in_queue(JobState::Pending), in_queue(JobState::Running));
            Capacity {
                taken: taken_slots(&jobs),
                queue: limit.queue,
                limit: Some(limit.value),
            }
        })
        .collect();

    let mut jobs = backend_jobs;
    jobs.extend(store.list_buffered()?.iter().map(|job| job.to_job(&user)));

    Ok(ListOwnInfo {
        jobs: filter.apply(jobs),
        capacities,
    })
}

/// Every user's backend jobs in `queue` followed by the buffered jobs that
/// name it, plus the caller's usage of that queue.
pub async fn list_queue<B>(
    store: &Store,
    backend: &B,
    queue: &str,
    filter: &JobFilter,
) -> Result<ListQueueInfo, FunnelError>
where
    B: Backend + ?Sized,
{
    let user = backend.own_user()?;

    // Pending before running; see `capacity::merge_race_safe`.
    let pending: Vec<Job> = backend
        .own_pending_jobs()
        .await?
        .into_iter()
        .filter(|job| job.queue == queue)
        .collect();
    let running = backend.running_jobs_in_queue(queue).await?;
    let mut jobs = merge_race_safe(pending, running);

    let own: Vec<Job> = jobs
        .iter()
        .filter(|job| job.user == user && !job.is_buffered())
        .cloned()
        .collect();
    let capacity = Capacity {
        queue: queue.to_string(),
        taken: taken_slots(&own),
        limit: store.get_limit(queue)?,
    };

    jobs.extend(
        store
            .list_buffered_in_queue(queue)?
            .iter()
            .map(|job| job.to_job(&user)),
    );

    Ok(ListQueueInfo {
        jobs: filter.apply(jobs),
        capacity,
    })
}
