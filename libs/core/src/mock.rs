//! In-process scheduler used by tests and demos.
//!
//! Jobs live in memory and change state only when the test says so, except
//! for one deliberate race: with [`MockBackend::promote_during_running_query`]
//! enabled, pending jobs become running at the moment a running-jobs query
//! arrives, after the pending snapshot was already taken.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use crate::backend::Backend;
use crate::job::{Job, JobState};

/// A job handed to the mock, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub queue: String,
    pub name: String,
    pub command: Vec<String>,
    pub cwd: String,
}

#[derive(Default)]
struct MockState {
    jobs: Vec<Job>,
    next_id: u64,
    submissions: Vec<Submission>,
    deleted: Vec<String>,
}

/// Mock scheduler backend.
pub struct MockBackend {
    user: String,
    cwd: String,
    state: Mutex<MockState>,
    hold_submissions: AtomicBool,
    promote_on_running_query: AtomicBool,
    fail_submit: AtomicBool,
    fail_listing: AtomicBool,
    listing_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_user("alice")
    }

    pub fn with_user(user: &str) -> Self {
        Self {
            user: user.to_string(),
            cwd: "/fake/directory".to_string(),
            state: Mutex::new(MockState {
                next_id: 1,
                ..Default::default()
            }),
            hold_submissions: AtomicBool::new(false),
            promote_on_running_query: AtomicBool::new(false),
            fail_submit: AtomicBool::new(false),
            fail_listing: AtomicBool::new(false),
            listing_calls: AtomicUsize::new(0),
        }
    }

    /// Submitted jobs start pending instead of running.
    pub fn hold_submissions(&self, hold: bool) {
        self.hold_submissions.store(hold, Ordering::SeqCst);
    }

    /// Promote the caller's pending jobs in a queue when that queue's
    /// running jobs are queried.
    pub fn promote_during_running_query(&self, enabled: bool) {
        self.promote_on_running_query.store(enabled, Ordering::SeqCst);
    }

    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_listings(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Number of listing calls served so far.
    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }

    /// Add a job owned by someone else.
    pub fn add_foreign_job(&self, user: &str, name: &str, queue: &str, slots: u32, state: JobState) {
        let mut st = self.lock();
        let id = st.next_id;
        st.next_id += 1;
        st.jobs.push(Job {
            id: id.to_string(),
            user: user.to_string(),
            name: name.to_string(),
            slots,
            state,
            queue: queue.to_string(),
            since: Some(fixed_time()),
            local_id: None,
        });
    }

    /// Set how many slots an active job of the caller takes.
    pub fn set_slots(&self, name: &str, slots: u32) {
        let mut st = self.lock();
        for job in st.jobs.iter_mut().filter(|j| j.name == name) {
            job.slots = slots;
        }
    }

    /// Remove an active job, freeing its slots. Returns whether it existed.
    pub fn finish_job(&self, name: &str) -> bool {
        let mut st = self.lock();
        let before = st.jobs.len();
        st.jobs.retain(|job| job.name != name);
        st.jobs.len() < before
    }

    /// Move a pending job to running.
    pub fn start_job(&self, name: &str) {
        let mut st = self.lock();
        for job in st.jobs.iter_mut().filter(|j| j.name == name) {
            job.state = JobState::Running;
        }
    }

    /// Names of the caller's running jobs, grouped by queue.
    pub fn running_jobs(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.jobs_by_queue(JobState::Running)
    }

    /// Names of the caller's pending jobs, grouped by queue.
    pub fn pending_jobs(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.jobs_by_queue(JobState::Pending)
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.lock().submissions.clone()
    }

    /// Backend ids passed to `delete_jobs`, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    fn jobs_by_queue(&self, state: JobState) -> BTreeMap<String, BTreeSet<String>> {
        let st = self.lock();
        let mut out: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for job in st
            .jobs
            .iter()
            .filter(|j| j.user == self.user && j.state == state)
        {
            out.entry(job.queue.clone())
                .or_default()
                .insert(job.name.clone());
        }
        out
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn listing(&self) -> Result<std::sync::MutexGuard<'_, MockState>> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            bail!("mock backend configured to fail listings");
        }
        Ok(self.lock())
    }

    fn select(&self, st: &MockState, pred: impl Fn(&Job) -> bool) -> Vec<Job> {
        st.jobs.iter().filter(|j| pred(j)).cloned().collect()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn fixed_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2022, 7, 9)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

#[async_trait]
impl Backend for MockBackend {
    fn cwd(&self) -> Result<String> {
        Ok(self.cwd.clone())
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
        if self.fail_submit.load(Ordering::SeqCst) {
            bail!("mock backend configured to reject submissions");
        }

        let mut st = self.lock();
        if st.jobs.iter().any(|j| j.user == self.user && j.name == name) {
            bail!("a job named {name} is already active");
        }

        let state = if self.hold_submissions.load(Ordering::SeqCst) {
            JobState::Pending
        } else {
            JobState::Running
        };
        let id = st.next_id;
        st.next_id += 1;
        st.jobs.push(Job {
            id: id.to_string(),
            user: self.user.clone(),
            name: name.to_string(),
            slots: 1,
            state,
            queue: queue.to_string(),
            since: Some(fixed_time()),
            local_id: None,
        });
        st.submissions.push(Submission {
            queue: queue.to_string(),
            name: name.to_string(),
            command: command.to_vec(),
            cwd: cwd.to_string(),
        });

        info!(id, queue, name, state = %state, "[MOCK] Job submitted");
        Ok(())
    }

    async fn delete_jobs(&self, ids: &[String]) -> Result<()> {
        let mut st = self.lock();
        st.jobs.retain(|job| !ids.contains(&job.id));
        st.deleted.extend(ids.iter().cloned());
        debug!(?ids, "[MOCK] Jobs deleted");
        Ok(())
    }

    async fn own_jobs(&self) -> Result<Vec<Job>> {
        let st = self.listing()?;
        Ok(self.select(&st, |j| j.user == self.user))
    }

    async fn own_pending_jobs(&self) -> Result<Vec<Job>> {
        let st = self.listing()?;
        Ok(self.select(&st, |j| j.user == self.user && j.state == JobState::Pending))
    }

    async fn own_running_jobs_in_queue(&self, queue: &str) -> Result<Vec<Job>> {
        let mut st = self.listing()?;
        if self.promote_on_running_query.load(Ordering::SeqCst) {
            for job in st
                .jobs
                .iter_mut()
                .filter(|j| j.user == self.user && j.queue == queue && j.state == JobState::Pending)
            {
                debug!(id = %job.id, "[MOCK] Pending job started between queries");
                job.state = JobState::Running;
            }
        }
        Ok(self.select(&st, |j| {
            j.user == self.user && j.queue == queue && j.state == JobState::Running
        }))
    }

    async fn running_jobs_in_queue(&self, queue: &str) -> Result<Vec<Job>> {
        let st = self.listing()?;
        Ok(self.select(&st, |j| j.queue == queue && j.state == JobState::Running))
    }
}
