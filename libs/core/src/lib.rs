//! qfunnel core
//!
//! A local admission-control layer in front of a batch scheduler whose queues
//! are capacity-limited. Jobs are submitted against an ordered list of
//! candidate queues; when none has room under the operator's per-queue
//! limits, the job waits in a local ledger and is released automatically as
//! slots free up, in submission order.
//!
//! ## Architecture
//!
//! - **Store** (`store`): SQLite ledger of limits and buffered jobs. All
//!   writes run in exclusive transactions shared across processes.
//! - **Capacity** (`capacity`): per-queue slot usage from backend snapshots,
//!   merged so that jobs moving from pending to running are counted once.
//! - **Admission** (`admission`): the dequeue algorithm; one decision per
//!   transaction, repeated until no queue has room.
//! - **Directory** (`directory`): listings merging backend and buffered jobs.
//! - **Maintenance** (`maintenance`): delete and bump.
//! - **Backend** (`backend`): the scheduler interface; `mock` provides an
//!   in-process implementation for tests.
//!
//! [`Funnel`] ties these together behind one handle per backend.

pub mod admission;
pub mod backend;
pub mod capacity;
pub mod config;
pub mod directory;
pub mod error;
pub mod filter;
pub mod funnel;
pub mod job;
pub mod maintenance;
pub mod mock;
pub mod store;

pub use backend::Backend;
pub use config::FunnelConfig;
pub use error::FunnelError;
pub use filter::JobFilter;
pub use funnel::{Funnel, SubmitOutcome, SubmitRequest};
pub use job::{
    BufferedJob, Capacity, Dispatched, Job, JobState, Limit, ListOwnInfo, ListQueueInfo, NewJob,
};
pub use maintenance::DeleteSummary;
pub use mock::MockBackend;
pub use store::{Store, StoreError};
