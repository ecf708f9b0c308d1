//! Integration tests for job listings.

mod common;

use qfunnel_core::{Capacity, JobFilter, JobState};

use common::{submit, test_funnel};

#[tokio::test]
async fn test_list_own_backend_then_buffered() {
    let (_dir, funnel) = test_funnel();
    funnel.set_limit("gpu@@a", 6).unwrap();
    funnel.set_limit("gpu@@b", 0).unwrap();
    for i in 0..10 {
        submit(&funnel, &["gpu@@a", "gpu@@b"], &format!("job-{i}")).await;
    }

    let info = funnel.list_own(&JobFilter::all()).await.unwrap();

    assert_eq!(info.jobs.len(), 10);
    for job in &info.jobs[..6] {
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.queue, "gpu@@a");
        assert!(job.since.is_some());
    }
    for job in &info.jobs[6..] {
        assert_eq!(job.state, JobState::Buffered);
        assert_eq!(job.queue, "gpu@@a gpu@@b");
        assert_eq!(job.user, "alice");
        assert!(job.id.starts_with('x'));
        assert!(job.since.is_none());
    }

    assert_eq!(
        info.capacities,
        vec![
            Capacity {
                queue: "gpu@@a".to_string(),
                taken: 6,
                limit: Some(6)
            },
            Capacity {
                queue: "gpu@@b".to_string(),
                taken: 0,
                limit: Some(0)
            },
        ]
    );
}

#[tokio::test]
async fn test_list_own_counts_pending_jobs() {
    let (_dir, funnel) = test_funnel();
    funnel.set_limit("q", 3).unwrap();
    submit(&funnel, &["q"], "runs").await;
    funnel.backend().hold_submissions(true);
    submit(&funnel, &["q"], "waits").await;

    let calls_before = funnel.backend().listing_calls();
    let info = funnel.list_own(&JobFilter::all()).await.unwrap();

    assert_eq!(info.capacities[0].taken, 2);
    assert_eq!(info.capacities[0].available(), Some(1));
    // Capacity comes from the same snapshot as the job list.
    assert_eq!(funnel.backend().listing_calls(), calls_before + 1);
}

#[tokio::test]
async fn test_list_own_with_name_filter() {
    let (_dir, funnel) = test_funnel();
    funnel.set_limit("q", 1).unwrap();
    submit(&funnel, &["q"], "train-1").await;
    submit(&funnel, &["q"], "eval-1").await;
    submit(&funnel, &["q"], "train-2").await;

    let info = funnel
        .list_own(&JobFilter::by_name("^train").unwrap())
        .await
        .unwrap();

    let names: Vec<_> = info.jobs.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["train-1", "train-2"]);
    // The filter narrows jobs only; capacity still reflects everything.
    assert_eq!(info.capacities[0].taken, 1);
}

#[tokio::test]
async fn test_list_queue_all_users() {
    let (_dir, funnel) = test_funnel();
    let backend = funnel.backend();
    funnel.set_limit("a", 2).unwrap();
    funnel.set_limit("b", 0).unwrap();

    backend.add_foreign_job("bob", "theirs", "a", 2, JobState::Running);
    backend.add_foreign_job("bob", "their-pending", "a", 1, JobState::Pending);
    submit(&funnel, &["a"], "mine").await;
    backend.hold_submissions(true);
    submit(&funnel, &["a"], "mine-pending").await;
    submit(&funnel, &["a", "b"], "mine-buffered").await;
    submit(&funnel, &["b"], "elsewhere").await;

    let info = funnel.list_queue("a", &JobFilter::all()).await.unwrap();

    let rows: Vec<_> = info
        .jobs
        .iter()
        .map(|j| (j.name.as_str(), j.user.as_str(), j.state))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("theirs", "bob", JobState::Running),
            ("mine", "alice", JobState::Running),
            ("mine-pending", "alice", JobState::Pending),
            ("mine-buffered", "alice", JobState::Buffered),
        ]
    );
    assert_eq!(
        info.capacity,
        Capacity {
            queue: "a".to_string(),
            taken: 2,
            limit: Some(2)
        }
    );
}

#[tokio::test]
async fn test_list_queue_without_limit() {
    let (_dir, funnel) = test_funnel();
    submit(&funnel, &["a"], "one").await;

    let info = funnel.list_queue("a", &JobFilter::all()).await.unwrap();

    assert_eq!(info.jobs.len(), 1);
    assert_eq!(info.capacity.limit, None);
    assert_eq!(info.capacity.taken, 1);
    assert_eq!(info.capacity.available(), None);
}

#[tokio::test]
async fn test_list_queue_with_name_filter() {
    let (_dir, funnel) = test_funnel();
    funnel.set_limit("a", 1).unwrap();
    submit(&funnel, &["a"], "keep").await;
    submit(&funnel, &["a"], "drop").await;
    submit(&funnel, &["a"], "keep-too").await;

    let info = funnel
        .list_queue("a", &JobFilter::by_name("keep").unwrap())
        .await
        .unwrap();

    let names: Vec<_> = info.jobs.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["keep", "keep-too"]);
}

#[tokio::test]
async fn test_listing_empty_ledger_creates_nothing() {
    let (dir, funnel) = test_funnel();

    let info = funnel.list_own(&JobFilter::all()).await.unwrap();
    assert!(info.jobs.is_empty());
    assert!(info.capacities.is_empty());

    let store = qfunnel_core::Store::open(
        dir.path().join("qfunnel.db"),
        std::time::Duration::from_secs(1),
    )
    .unwrap();
    assert_eq!(store.schema_version().unwrap(), 0);
}
