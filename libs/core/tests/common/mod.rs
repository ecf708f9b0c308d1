//! Shared fixtures for funnel integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use qfunnel_core::{Funnel, FunnelConfig, MockBackend, SubmitOutcome, SubmitRequest};
use tempfile::TempDir;

/// A funnel over a mock backend and a fresh on-disk ledger.
///
/// Keep the returned directory alive for as long as the funnel is used.
pub fn test_funnel() -> (TempDir, Funnel<MockBackend>) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = FunnelConfig::new(dir.path().join("qfunnel.db"));
    config.lock_timeout = Duration::from_secs(5);
    (dir, Funnel::new(MockBackend::new(), config))
}

pub fn request(queues: &[&str], name: &str) -> SubmitRequest {
    SubmitRequest {
        queues: queues.iter().map(|q| q.to_string()).collect(),
        name: name.to_string(),
        command: vec!["script.bash".to_string()],
        deferred: false,
    }
}

pub async fn submit(funnel: &Funnel<MockBackend>, queues: &[&str], name: &str) -> SubmitOutcome {
    funnel.submit(request(queues, name)).await.unwrap()
}

/// Expected running jobs, grouped by queue.
pub fn by_queue(entries: &[(&str, &[&str])]) -> BTreeMap<String, BTreeSet<String>> {
    entries
        .iter()
        .map(|(queue, names)| {
            (
                queue.to_string(),
                names.iter().map(|n| n.to_string()).collect(),
            )
        })
        .collect()
}

/// Names of buffered jobs in priority order.
pub async fn buffered_names(funnel: &Funnel<MockBackend>) -> Vec<String> {
    funnel
        .list_own(&qfunnel_core::JobFilter::all())
        .await
        .unwrap()
        .jobs
        .into_iter()
        .filter(|job| job.is_buffered())
        .map(|job| job.name)
        .collect()
}
