//! Ledger upkeep: deleting jobs and reordering buffered priorities.

use serde::Serialize;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::error::FunnelError;
use crate::filter::JobFilter;
use crate::job::LOCAL_ID_PREFIX;
use crate::store::Store;

/// Job ids split by where the job lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedIds {
    /// Ids passed through to the backend verbatim.
    pub backend: Vec<String>,
    /// Ledger ids parsed from `x<digits>`.
    pub local: Vec<i64>,
}

/// What a delete did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteSummary {
    pub removed: Vec<i64>,
    pub missing: Vec<i64>,
    pub forwarded: Vec<String>,
}

/// Split ids into ledger ids (`x` followed by digits) and backend ids.
///
/// A ledger id too large to exist is rejected rather than forwarded.
pub fn parse_job_ids<S: AsRef<str>>(ids: &[S]) -> Result<ParsedIds, FunnelError> {
    let mut parsed = ParsedIds::default();
    for id in ids {
        let id = id.as_ref();
        let digits = id
            .strip_prefix(LOCAL_ID_PREFIX)
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()));
        match digits {
            Some(digits) => {
                let local_id = digits
                    .parse::<i64>()
                    .map_err(|_| FunnelError::Invalid(format!("job id {id} is out of range")))?;
                parsed.local.push(local_id);
            }
            None => parsed.backend.push(id.to_string()),
        }
    }
    Ok(parsed)
}

/// Delete buffered jobs from the ledger and cancel backend jobs.
///
/// Ledger deletions happen in one exclusive transaction before anything is
/// forwarded to the backend.
pub async fn delete<B, S>(
    store: &mut Store,
    backend: &B,
    ids: &[S],
) -> Result<DeleteSummary, FunnelError>
where
    B: Backend + ?Sized,
    S: AsRef<str>,
{
    let parsed = parse_job_ids(ids)?;
    let mut summary = DeleteSummary::default();

    if !parsed.local.is_empty() {
        let tx = store.exclusive()?;
        for local_id in parsed.local {
            if tx.dequeue(local_id)? {
                summary.removed.push(local_id);
            } else {
                summary.missing.push(local_id);
            }
        }
        tx.commit()?;
        if !summary.missing.is_empty() {
            warn!(missing = ?summary.missing, "Some buffered jobs were not found");
        }
    }

    if !parsed.backend.is_empty() {
        backend.delete_jobs(&parsed.backend).await?;
        summary.forwarded = parsed.backend;
    }

    info!(
        removed = summary.removed.len(),
        forwarded = summary.forwarded.len(),
        "Jobs deleted"
    );
    Ok(summary)
}

/// How far unmatched jobs must move so every matched job outranks them.
///
/// Both slices hold local ids. Returns `None` when the matched jobs already
/// come first (or either side is empty).
pub fn bump_offset(matched: &[i64], unmatched: &[i64]) -> Option<i64> {
    let max_matched = *matched.iter().max()?;
    let min_unmatched = *unmatched.iter().min()?;
    if max_matched < min_unmatched {
        return None;
    }
    Some(max_matched + 1 - min_unmatched)
}

/// Give every buffered job matching `filter` priority over the rest,
/// keeping relative order within both groups. Returns the number of jobs
/// renumbered.
pub fn bump(store: &mut Store, filter: &JobFilter) -> Result<usize, FunnelError> {
    let tx = store.exclusive()?;
    let jobs = tx.list_buffered()?;

    let (matched, unmatched): (Vec<i64>, Vec<i64>) = {
        let (m, u): (Vec<_>, Vec<_>) = jobs
            .iter()
            .partition(|job| filter.matches_name(&job.name));
        (
            m.iter().map(|job| job.local_id).collect(),
            u.iter().map(|job| job.local_id).collect(),
        )
    };

    let Some(offset) = bump_offset(&matched, &unmatched) else {
        return Ok(0);
    };

    // Highest ids first so no renumbered job lands on an occupied id.
    for &local_id in unmatched.iter().rev() {
        tx.renumber(local_id, local_id + offset)?;
    }
    tx.commit()?;

    info!(
        bumped = matched.len(),
        moved = unmatched.len(),
        offset,
        "Buffered jobs reordered"
    );
    Ok(unmatched.len())
}
