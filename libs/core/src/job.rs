//! Plain value records shared by the ledger, the backend, and listings.

use chrono::NaiveDateTime;
use serde::Serialize;

/// Prefix of the synthetic ids given to locally buffered jobs.
pub const LOCAL_ID_PREFIX: char = 'x';

/// Scheduling state of a job as seen by the funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Executing in the backend.
    Running,
    /// Accepted by the backend but waiting for a slot there.
    Pending,
    /// Held in the local ledger; the backend has not seen it yet.
    Buffered,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Pending => "pending",
            Self::Buffered => "buffered",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job as reported by the backend, or a buffered job rendered for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    /// Backend-assigned id, or `x<local_id>` for buffered jobs.
    pub id: String,
    pub user: String,
    pub name: String,
    /// Concurrency units consumed; always at least 1.
    pub slots: u32,
    pub state: JobState,
    /// Queue name, or the space-joined candidate list for buffered jobs.
    pub queue: String,
    /// Start (running) or submission (pending) time. `None` for buffered jobs.
    pub since: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_id: Option<i64>,
}

impl Job {
    pub fn is_buffered(&self) -> bool {
        self.state == JobState::Buffered
    }
}

/// A job held in the local ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BufferedJob {
    /// Priority key; lower values are dequeued first.
    pub local_id: i64,
    pub name: String,
    pub command: Vec<String>,
    pub cwd: String,
    /// Candidate queues in fallback order. Never empty.
    pub queues: Vec<String>,
}

impl BufferedJob {
    /// The synthetic id under which this job is listed and deleted.
    pub fn display_id(&self) -> String {
        format!("{}{}", LOCAL_ID_PREFIX, self.local_id)
    }

    /// Whether `queue` is one of this job's candidates.
    pub fn targets(&self, queue: &str) -> bool {
        self.queues.iter().any(|q| q == queue)
    }

    /// Render as a listing row owned by `user`.
    pub fn to_job(&self, user: &str) -> Job {
        Job {
            id: self.display_id(),
            user: user.to_string(),
            name: self.name.clone(),
            slots: 1,
            state: JobState::Buffered,
            queue: self.queues.join(" "),
            since: None,
            local_id: Some(self.local_id),
        }
    }
}

/// A job about to be written into the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub name: String,
    pub command: Vec<String>,
    pub cwd: String,
    pub queues: Vec<String>,
}

/// An operator-configured concurrency limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Limit {
    pub queue: String,
    pub value: u32,
}

/// Slot usage of one queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capacity {
    pub queue: String,
    pub taken: u32,
    /// `None` means unlimited.
    pub limit: Option<u32>,
}

impl Capacity {
    /// Free slots, or `None` when the queue is unlimited.
    pub fn available(&self) -> Option<u32> {
        self.limit.map(|limit| limit.saturating_sub(self.taken))
    }
}

/// A buffered job that was moved to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dispatched {
    pub local_id: i64,
    pub queue: String,
    pub name: String,
}

/// Result of listing the current user's jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListOwnInfo {
    pub jobs: Vec<Job>,
    /// One entry per configured limit, ordered by queue.
    pub capacities: Vec<Capacity>,
}

/// Result of listing one queue across all users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListQueueInfo {
    pub jobs: Vec<Job>,
    pub capacity: Capacity,
}
