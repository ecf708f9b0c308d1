//! Slot accounting against live backend state.
//!
//! The backend cannot list pending and running jobs atomically, and a job may
//! move from pending to running between two queries (never the reverse). So
//! pending jobs are always fetched first, running jobs second, and the two
//! snapshots are merged with [`merge_race_safe`]: a job seen in both is
//! counted once, as running.

use std::collections::HashSet;

use tracing::debug;

use crate::backend::Backend;
use crate::error::FunnelError;
use crate::job::Job;

/// Merge a pending snapshot taken before a running snapshot.
///
/// Returns every running job followed by the pending jobs whose id is not in
/// the running set. Pending order is preserved and repeated pending ids are
/// kept once.
pub fn merge_race_safe(pending: Vec<Job>, running: Vec<Job>) -> Vec<Job> {
    let mut seen: HashSet<String> = running.iter().map(|job| job.id.clone()).collect();
    let mut merged = running;
    for job in pending {
        if seen.insert(job.id.clone()) {
            merged.push(job);
        }
    }
    merged
}

/// Total slots taken by `jobs`.
pub fn taken_slots(jobs: &[Job]) -> u32 {
    jobs.iter()
        .map(|job| job.slots)
        .fold(0, u32::saturating_add)
}

/// The caller's backend jobs occupying `queue`, race-safely merged.
pub async fn own_jobs_in_queue<B>(backend: &B, queue: &str) -> Result<Vec<Job>, FunnelError>
where
    B: Backend + ?Sized,
{
    let pending: Vec<Job> = backend
        .own_pending_jobs()
        .await?
        .into_iter()
        .filter(|job| job.queue == queue)
        .collect();
    let running = backend.own_running_jobs_in_queue(queue).await?;
    Ok(merge_race_safe(pending, running))
}

/// Whether the caller may start one more job in `queue` under `limit`.
pub async fn has_open_slot<B>(backend: &B, queue: &str, limit: u32) -> Result<bool, FunnelError>
where
    B: Backend + ?Sized,
{
    if limit == 0 {
        return Ok(false);
    }

    let mut taken: u32 = 0;
    for job in own_jobs_in_queue(backend, queue).await? {
        taken = taken.saturating_add(job.slots);
        if taken >= limit {
            debug!(queue, limit, taken, "Queue full");
            return Ok(false);
        }
    }

    debug!(queue, limit, taken, "Queue has room");
    Ok(true)
}
