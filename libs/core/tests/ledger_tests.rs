//! Integration tests for the ledger shared between invocations: limits,
//! locking, deletion, and bump.

mod common;

use std::time::Duration;

use qfunnel_core::{JobFilter, Limit, Store, StoreError};

use common::{buffered_names, submit, test_funnel};

#[tokio::test]
async fn test_limit_lifecycle() {
    let (_dir, funnel) = test_funnel();

    assert_eq!(funnel.get_limit("gpu@@a").unwrap(), None);
    assert!(funnel.all_limits().unwrap().is_empty());

    funnel.set_limit("gpu@@a", 5).unwrap();
    funnel.set_limit("gpu@@b", 3).unwrap();
    assert_eq!(
        funnel.all_limits().unwrap(),
        vec![
            Limit {
                queue: "gpu@@a".to_string(),
                value: 5
            },
            Limit {
                queue: "gpu@@b".to_string(),
                value: 3
            },
        ]
    );

    assert!(funnel.delete_limit("gpu@@a").unwrap());
    assert_eq!(funnel.get_limit("gpu@@a").unwrap(), None);
    assert_eq!(funnel.all_limits().unwrap().len(), 1);

    // Deleting twice is harmless.
    assert!(!funnel.delete_limit("gpu@@a").unwrap());
}

#[tokio::test]
async fn test_negative_limit_is_rejected() {
    let (_dir, funnel) = test_funnel();
    let err = funnel.set_limit("q", -3).unwrap_err();
    assert!(err.is_validation());
    assert_eq!(funnel.get_limit("q").unwrap(), None);
}

#[test]
fn test_exclusive_transaction_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");

    let mut holder = Store::open(&path, Duration::from_secs(5)).unwrap();
    let mut waiter = Store::open(&path, Duration::from_millis(100)).unwrap();

    let tx = holder.exclusive().unwrap();
    match waiter.exclusive() {
        Err(StoreError::Lock { timeout }) => assert_eq!(timeout, Duration::from_millis(100)),
        Err(other) => panic!("expected lock timeout, got {other}"),
        Ok(_) => panic!("second exclusive transaction should not start"),
    }

    // Readers wait on the writer too, for the same bounded time.
    assert!(matches!(
        waiter.get_limit("q"),
        Err(StoreError::Lock { .. })
    ));

    tx.commit().unwrap();
    assert_eq!(waiter.get_limit("q").unwrap(), None);
    assert!(waiter.exclusive().is_ok());
}

#[test]
fn test_uncommitted_writes_are_invisible() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");

    let mut writer = Store::open(&path, Duration::from_secs(5)).unwrap();
    writer.set_limit("q", 1).unwrap();
    let reader = Store::open(&path, Duration::from_millis(100)).unwrap();

    let tx = writer.exclusive().unwrap();
    tx.set_limit("q", 9).unwrap();
    assert!(reader.get_limit("q").is_err());
    drop(tx);

    assert_eq!(reader.get_limit("q").unwrap(), Some(1));
}

#[tokio::test]
async fn test_funnel_reports_lock_timeout() {
    let (dir, funnel) = test_funnel();
    funnel.set_limit("q", 1).unwrap();

    let mut holder = Store::open(dir.path().join("qfunnel.db"), Duration::from_secs(5)).unwrap();
    let _tx = holder.exclusive().unwrap();

    let mut config = funnel.config().clone();
    config.lock_timeout = Duration::from_millis(50);
    let impatient = qfunnel_core::Funnel::new(qfunnel_core::MockBackend::new(), config);

    let err = impatient.check().await.unwrap_err();
    assert!(err.is_lock_timeout());
}

#[tokio::test]
async fn test_delete_buffered_job_keeps_others_in_order() {
    let (_dir, funnel) = test_funnel();
    funnel.set_limit("q", 0).unwrap();
    funnel.set_limit("r", 0).unwrap();
    let a = submit(&funnel, &["q", "r"], "a").await.local_id;
    let b = submit(&funnel, &["q"], "b").await.local_id;
    let c = submit(&funnel, &["r", "q"], "c").await.local_id;

    let summary = funnel.delete(&[format!("x{b}")]).await.unwrap();

    assert_eq!(summary.removed, vec![b]);
    assert!(summary.forwarded.is_empty());
    assert_eq!(buffered_names(&funnel).await, vec!["a", "c"]);

    let own = funnel.list_own(&JobFilter::all()).await.unwrap();
    let ids: Vec<_> = own.jobs.iter().map(|j| j.id.clone()).collect();
    assert_eq!(ids, vec![format!("x{a}"), format!("x{c}")]);
    assert_eq!(own.jobs[1].queue, "r q");
}

#[tokio::test]
async fn test_delete_splits_local_and_backend_ids() {
    let (_dir, funnel) = test_funnel();
    funnel.set_limit("q", 1).unwrap();
    submit(&funnel, &["q"], "running").await;
    let held = submit(&funnel, &["q"], "held").await.local_id;

    let running_id = funnel
        .list_own(&JobFilter::all())
        .await
        .unwrap()
        .jobs
        .into_iter()
        .find(|j| j.name == "running")
        .map(|j| j.id)
        .unwrap();

    let summary = funnel
        .delete(&[running_id.clone(), format!("x{held}"), "x999".to_string()])
        .await
        .unwrap();

    assert_eq!(summary.removed, vec![held]);
    assert_eq!(summary.missing, vec![999]);
    assert_eq!(summary.forwarded, vec![running_id.clone()]);
    assert_eq!(funnel.backend().deleted(), vec![running_id]);
    assert!(funnel.backend().running_jobs().is_empty());
    assert!(buffered_names(&funnel).await.is_empty());
}

#[tokio::test]
async fn test_bump_moves_matches_ahead() {
    let (_dir, funnel) = test_funnel();
    funnel.set_limit("q", 0).unwrap();
    for name in ["a-1", "b-1", "a-2", "b-2", "a-3"] {
        submit(&funnel, &["q"], name).await;
    }

    let moved = funnel.bump(&JobFilter::by_name("^b-").unwrap()).unwrap();

    assert_eq!(moved, 3);
    assert_eq!(
        buffered_names(&funnel).await,
        vec!["b-1", "b-2", "a-1", "a-2", "a-3"]
    );

    // Already in order: nothing to do.
    assert_eq!(funnel.bump(&JobFilter::by_name("^b-").unwrap()).unwrap(), 0);
}

#[tokio::test]
async fn test_bump_changes_dispatch_order() {
    let (_dir, funnel) = test_funnel();
    funnel.set_limit("q", 0).unwrap();
    funnel.set_limit("r", 0).unwrap();
    submit(&funnel, &["q", "r"], "slow").await;
    submit(&funnel, &["q"], "urgent").await;

    funnel.bump(&JobFilter::by_name("urgent").unwrap()).unwrap();
    funnel.set_limit("q", 1).unwrap();
    let dispatched = funnel.check().await.unwrap();

    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].name, "urgent");

    // The renumbered job keeps its fallback list.
    let own = funnel.list_own(&JobFilter::all()).await.unwrap();
    let slow = own.jobs.iter().find(|j| j.name == "slow").unwrap();
    assert_eq!(slow.queue, "q r");
}

#[tokio::test]
async fn test_new_jobs_rank_after_bumped_ones() {
    let (_dir, funnel) = test_funnel();
    funnel.set_limit("q", 0).unwrap();
    submit(&funnel, &["q"], "old").await;
    submit(&funnel, &["q"], "vip").await;
    funnel.bump(&JobFilter::by_name("vip").unwrap()).unwrap();

    submit(&funnel, &["q"], "new").await;

    assert_eq!(buffered_names(&funnel).await, vec!["vip", "old", "new"]);
}
