//! SQLite-backed ledger of limits and buffered jobs.
//!
//! The ledger is shared by every funnel invocation on the host (interactive
//! commands, watch loops, cron checks), so all mutation happens inside
//! `BEGIN EXCLUSIVE` transactions. The ledger keeps SQLite's default
//! rollback journal, so the lock also holds across hosts sharing the file
//! over a network filesystem. While a writer holds it, readers wait too.
//! Every wait is bounded by SQLite's busy timeout and fails with
//! [`StoreError::Lock`] when it runs out.
//!
//! The schema is created lazily by the first exclusive transaction and is
//! versioned through `PRAGMA user_version`.

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior};
use thiserror::Error;
use tracing::debug;

use crate::job::{BufferedJob, Limit, NewJob};

/// Schema version written to `user_version` when the ledger is created.
pub const SCHEMA_VERSION: i64 = 1;

/// Errors from ledger operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("could not lock the job ledger within {timeout:?}")]
    Lock { timeout: Duration },

    #[error("ledger schema error: {0}")]
    Schema(String),

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("failed to prepare ledger directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to the ledger. Open one per logical operation.
pub struct Store {
    conn: Connection,
    lock_timeout: Duration,
}

impl Store {
    /// Open (creating the file if needed) the ledger at `path`.
    pub fn open<P: AsRef<Path>>(path: P, lock_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(lock_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        debug!(path = %path.display(), "Ledger opened");

        Ok(Self { conn, lock_timeout })
    }

    /// Open a private in-memory ledger.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn,
            lock_timeout: Duration::ZERO,
        })
    }

    /// Schema version on disk; 0 when the ledger has never been written.
    pub fn schema_version(&self) -> Result<i64, StoreError> {
        schema_version(&self.conn)
    }

    /// Start an exclusive transaction, creating the schema if it is absent.
    ///
    /// Dropping the returned transaction without calling
    /// [`LedgerTx::commit`] rolls back every change made through it.
    pub fn exclusive(&mut self) -> Result<LedgerTx<'_>, StoreError> {
        let timeout = self.lock_timeout;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Exclusive)
            .map_err(|e| lock_error(e, timeout))?;
        ensure_schema(&tx)?;
        Ok(LedgerTx { tx, timeout })
    }

    pub fn get_limit(&self, queue: &str) -> Result<Option<u32>, StoreError> {
        self.read(|conn| get_limit(conn, queue), None)
    }

    /// All configured limits, ordered by queue name.
    pub fn all_limits(&self) -> Result<Vec<Limit>, StoreError> {
        self.read(all_limits, Vec::new())
    }

    /// Set the limit for `queue`. Negative values are rejected.
    pub fn set_limit(&mut self, queue: &str, value: i64) -> Result<(), StoreError> {
        let value = validate_limit(value)?;
        let tx = self.exclusive()?;
        tx.set_limit(queue, value)?;
        tx.commit()
    }

    /// Remove the limit for `queue`, making it unlimited. Returns whether a
    /// limit existed.
    pub fn delete_limit(&mut self, queue: &str) -> Result<bool, StoreError> {
        let tx = self.exclusive()?;
        let existed = tx.delete_limit(queue)?;
        tx.commit()?;
        Ok(existed)
    }

    /// Buffer a job. Returns its newly allocated local id.
    pub fn enqueue(&mut self, job: &NewJob) -> Result<i64, StoreError> {
        let tx = self.exclusive()?;
        let local_id = tx.enqueue(job)?;
        tx.commit()?;
        Ok(local_id)
    }

    /// Remove a buffered job and its queue associations.
    pub fn dequeue(&mut self, local_id: i64) -> Result<bool, StoreError> {
        let tx = self.exclusive()?;
        let removed = tx.dequeue(local_id)?;
        tx.commit()?;
        Ok(removed)
    }

    /// All buffered jobs in priority order.
    pub fn list_buffered(&self) -> Result<Vec<BufferedJob>, StoreError> {
        self.read(list_buffered, Vec::new())
    }

    /// Buffered jobs naming `queue` as a candidate, in priority order.
    pub fn list_buffered_in_queue(&self, queue: &str) -> Result<Vec<BufferedJob>, StoreError> {
        Ok(self
            .list_buffered()?
            .into_iter()
            .filter(|job| job.targets(queue))
            .collect())
    }

    /// Run a read outside any transaction. A ledger that has never been
    /// written yields `empty` without creating the schema.
    fn read<T>(
        &self,
        query: impl FnOnce(&Connection) -> Result<T, StoreError>,
        empty: T,
    ) -> Result<T, StoreError> {
        let result = schema_version(&self.conn)
            .and_then(check_version)
            .and_then(|version| match version {
                0 => reject_unversioned(&self.conn).map(|()| empty),
                _ => query(&self.conn),
            });
        result.map_err(|e| match e {
            StoreError::Sqlite(e) => lock_error(e, self.lock_timeout),
            other => other,
        })
    }
}

/// An open exclusive transaction on the ledger.
pub struct LedgerTx<'a> {
    tx: Transaction<'a>,
    timeout: Duration,
}

impl LedgerTx<'_> {
    /// Make every change visible to other ledger users.
    pub fn commit(self) -> Result<(), StoreError> {
        let timeout = self.timeout;
        self.tx.commit().map_err(|e| lock_error(e, timeout))
    }

    pub fn get_limit(&self, queue: &str) -> Result<Option<u32>, StoreError> {
        get_limit(&self.tx, queue)
    }

    pub fn all_limits(&self) -> Result<Vec<Limit>, StoreError> {
        all_limits(&self.tx)
    }

    pub fn set_limit(&self, queue: &str, value: u32) -> Result<(), StoreError> {
        self.tx.execute(
            r#"
            INSERT INTO limits (queue, value) VALUES (?1, ?2)
            ON CONFLICT(queue) DO UPDATE SET value = excluded.value
            "#,
            params![queue, value],
        )?;
        debug!(queue, value, "Limit set");
        Ok(())
    }

    pub fn delete_limit(&self, queue: &str) -> Result<bool, StoreError> {
        let n = self
            .tx
            .execute("DELETE FROM limits WHERE queue = ?1", params![queue])?;
        Ok(n > 0)
    }

    /// Insert a job row and one association row per candidate queue.
    pub fn enqueue(&self, job: &NewJob) -> Result<i64, StoreError> {
        let queues = normalize_queues(&job.queues)?;
        let command = serde_json::to_string(&job.command)
            .map_err(|e| StoreError::Invalid(format!("unencodable command: {e}")))?;

        self.tx.execute(
            "INSERT INTO jobs (name, command, cwd) VALUES (?1, ?2, ?3)",
            params![job.name, command, job.cwd],
        )?;
        let local_id = self.tx.last_insert_rowid();

        let mut stmt = self
            .tx
            .prepare("INSERT INTO job_queues (local_id, queue, ordinal) VALUES (?1, ?2, ?3)")?;
        for (ordinal, queue) in queues.iter().enumerate() {
            stmt.execute(params![local_id, queue, ordinal as i64])?;
        }

        debug!(local_id, name = %job.name, queues = ?queues, "Job buffered");
        Ok(local_id)
    }

    pub fn dequeue(&self, local_id: i64) -> Result<bool, StoreError> {
        self.tx
            .execute("DELETE FROM job_queues WHERE local_id = ?1", params![local_id])?;
        let n = self
            .tx
            .execute("DELETE FROM jobs WHERE local_id = ?1", params![local_id])?;
        Ok(n > 0)
    }

    pub fn list_buffered(&self) -> Result<Vec<BufferedJob>, StoreError> {
        list_buffered(&self.tx)
    }

    /// Move a job to a new priority key. Its queue associations follow.
    pub fn renumber(&self, from: i64, to: i64) -> Result<(), StoreError> {
        let n = self.tx.execute(
            "UPDATE jobs SET local_id = ?1 WHERE local_id = ?2",
            params![to, from],
        )?;
        if n == 0 {
            return Err(StoreError::Invalid(format!("no buffered job x{from}")));
        }
        Ok(())
    }
}

fn validate_limit(value: i64) -> Result<u32, StoreError> {
    if value < 0 {
        return Err(StoreError::Invalid("limit cannot be negative".to_string()));
    }
    u32::try_from(value).map_err(|_| StoreError::Invalid(format!("limit {value} is too large")))
}

/// Candidate queues with duplicates removed, first occurrence kept.
fn normalize_queues(queues: &[String]) -> Result<Vec<&str>, StoreError> {
    let mut out: Vec<&str> = Vec::with_capacity(queues.len());
    for queue in queues {
        let queue = queue.as_str();
        if queue.is_empty() {
            return Err(StoreError::Invalid("queue name cannot be empty".to_string()));
        }
        if !out.contains(&queue) {
            out.push(queue);
        }
    }
    if out.is_empty() {
        return Err(StoreError::Invalid(
            "a job needs at least one candidate queue".to_string(),
        ));
    }
    Ok(out)
}

fn lock_error(err: rusqlite::Error, timeout: Duration) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            StoreError::Lock { timeout }
        }
        other => StoreError::Sqlite(other),
    }
}

fn schema_version(conn: &Connection) -> Result<i64, StoreError> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn check_version(version: i64) -> Result<i64, StoreError> {
    if version > SCHEMA_VERSION {
        return Err(StoreError::Schema(format!(
            "ledger schema version {version} is newer than supported version {SCHEMA_VERSION}"
        )));
    }
    Ok(version)
}

/// Fail when ledger tables exist without a schema version, as in a ledger
/// written by an older tool.
fn reject_unversioned(conn: &Connection) -> Result<(), StoreError> {
    let existing: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('limits', 'jobs', 'job_queues')",
        [],
        |row| row.get(0),
    )?;
    if existing > 0 {
        return Err(StoreError::Schema(
            "ledger contains unversioned tables; move it aside and retry".to_string(),
        ));
    }
    Ok(())
}

fn ensure_schema(tx: &Transaction<'_>) -> Result<(), StoreError> {
    if check_version(schema_version(tx)?)? == SCHEMA_VERSION {
        return Ok(());
    }
    reject_unversioned(tx)?;

    tx.execute_batch(
        r#"
        CREATE TABLE limits (
            queue TEXT PRIMARY KEY NOT NULL,
            value INTEGER NOT NULL CHECK (value >= 0)
        );

        CREATE TABLE jobs (
            local_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            command TEXT NOT NULL,
            cwd TEXT NOT NULL
        );

        CREATE TABLE job_queues (
            local_id INTEGER NOT NULL
                REFERENCES jobs(local_id) ON UPDATE CASCADE ON DELETE CASCADE,
            queue TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            PRIMARY KEY (local_id, ordinal)
        );

        CREATE INDEX idx_job_queues_queue ON job_queues(queue, local_id);
        "#,
    )?;
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    debug!(version = SCHEMA_VERSION, "Ledger schema created");
    Ok(())
}

fn get_limit(conn: &Connection, queue: &str) -> Result<Option<u32>, StoreError> {
    conn.query_row(
        "SELECT value FROM limits WHERE queue = ?1",
        params![queue],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

fn all_limits(conn: &Connection) -> Result<Vec<Limit>, StoreError> {
    let mut stmt = conn.prepare("SELECT queue, value FROM limits ORDER BY queue ASC")?;
    let limits = stmt
        .query_map([], |row| {
            Ok(Limit {
                queue: row.get(0)?,
                value: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(limits)
}

fn list_buffered(conn: &Connection) -> Result<Vec<BufferedJob>, StoreError> {
    let mut stmt = conn.prepare("SELECT local_id, name, command, cwd FROM jobs ORDER BY local_id ASC")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut jobs = Vec::with_capacity(rows.len());
    for (local_id, name, command, cwd) in rows {
        let command: Vec<String> = serde_json::from_str(&command).map_err(|e| {
            StoreError::Schema(format!("job x{local_id} has an unreadable command: {e}"))
        })?;
        jobs.push(BufferedJob {
            local_id,
            name,
            command,
            cwd,
            queues: Vec::new(),
        });
    }

    let mut stmt =
        conn.prepare("SELECT local_id, queue FROM job_queues ORDER BY local_id ASC, ordinal ASC")?;
    let associations = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    // Both result sets are sorted by local_id, so walk them together.
    let mut idx = 0;
    for (local_id, queue) in associations {
        while idx < jobs.len() && jobs[idx].local_id < local_id {
            idx += 1;
        }
        match jobs.get_mut(idx) {
            Some(job) if job.local_id == local_id => job.queues.push(queue),
            _ => {
                return Err(StoreError::Schema(format!(
                    "queue association for missing job x{local_id}"
                )))
            }
        }
    }

    if let Some(job) = jobs.iter().find(|job| job.queues.is_empty()) {
        return Err(StoreError::Schema(format!(
            "buffered job x{} has no candidate queues",
            job.local_id
        )));
    }

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job(name: &str, queues: &[&str]) -> NewJob {
        NewJob {
            name: name.to_string(),
            command: vec!["script.bash".to_string(), "--flag=1".to_string()],
            cwd: "/fake/directory".to_string(),
            queues: queues.iter().map(|q| q.to_string()).collect(),
        }
    }

    #[test]
    fn test_reads_before_first_write_do_not_create_schema() {
        let store = Store::open_in_memory().unwrap();

        assert_eq!(store.get_limit("gpu@@a").unwrap(), None);
        assert!(store.all_limits().unwrap().is_empty());
        assert!(store.list_buffered().unwrap().is_empty());
        assert_eq!(store.schema_version().unwrap(), 0);
    }

    #[test]
    fn test_first_write_creates_schema() {
        let mut store = Store::open_in_memory().unwrap();
        store.set_limit("gpu@@a", 2).unwrap();
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_limits() {
        let mut store = Store::open_in_memory().unwrap();

        store.set_limit("gpu@@b", 3).unwrap();
        store.set_limit("gpu@@a", 5).unwrap();
        assert_eq!(store.get_limit("gpu@@a").unwrap(), Some(5));
        assert_eq!(
            store.all_limits().unwrap(),
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

        store.set_limit("gpu@@a", 10).unwrap();
        assert_eq!(store.get_limit("gpu@@a").unwrap(), Some(10));

        assert!(store.delete_limit("gpu@@a").unwrap());
        assert_eq!(store.get_limit("gpu@@a").unwrap(), None);
        assert!(!store.delete_limit("gpu@@a").unwrap());
        assert_eq!(store.all_limits().unwrap().len(), 1);
    }

    #[test]
    fn test_negative_limit_rejected_without_change() {
        let mut store = Store::open_in_memory().unwrap();
        store.set_limit("gpu@@a", 4).unwrap();

        let err = store.set_limit("gpu@@a", -1).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert_eq!(store.get_limit("gpu@@a").unwrap(), Some(4));
    }

    #[test]
    fn test_zero_limit_is_not_unlimited() {
        let mut store = Store::open_in_memory().unwrap();
        store.set_limit("gpu@@a", 0).unwrap();
        assert_eq!(store.get_limit("gpu@@a").unwrap(), Some(0));
    }

    #[test]
    fn test_enqueue_and_list_preserves_order() {
        let mut store = Store::open_in_memory().unwrap();

        let a = store.enqueue(&new_job("a", &["q1", "q2"])).unwrap();
        let b = store.enqueue(&new_job("b", &["q2"])).unwrap();
        assert!(a < b);

        let jobs = store.list_buffered().unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].name, "a");
        assert_eq!(jobs[0].queues, vec!["q1", "q2"]);
        assert_eq!(jobs[0].command, vec!["script.bash", "--flag=1"]);
        assert_eq!(jobs[0].cwd, "/fake/directory");
        assert_eq!(jobs[1].queues, vec!["q2"]);

        let in_q1 = store.list_buffered_in_queue("q1").unwrap();
        assert_eq!(in_q1.len(), 1);
        assert_eq!(in_q1[0].local_id, a);
    }

    #[test]
    fn test_enqueue_deduplicates_queues() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .enqueue(&new_job("dup", &["q2", "q1", "q2"]))
            .unwrap();
        let jobs = store.list_buffered().unwrap();
        assert_eq!(jobs[0].queues, vec!["q2", "q1"]);
    }

    #[test]
    fn test_enqueue_requires_a_queue() {
        let mut store = Store::open_in_memory().unwrap();
        let err = store.enqueue(&new_job("none", &[])).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert!(store.list_buffered().unwrap().is_empty());
    }

    #[test]
    fn test_dequeue_removes_associations() {
        let mut store = Store::open_in_memory().unwrap();
        let a = store.enqueue(&new_job("a", &["q1", "q2"])).unwrap();
        let b = store.enqueue(&new_job("b", &["q1"])).unwrap();

        assert!(store.dequeue(a).unwrap());
        assert!(!store.dequeue(a).unwrap());

        let jobs = store.list_buffered().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].local_id, b);

        let orphans: i64 = store
            .conn
            .query_row(
                "SELECT COUNT(*) FROM job_queues WHERE local_id = ?1",
                params![a],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let mut store = Store::open_in_memory().unwrap();
        {
            let tx = store.exclusive().unwrap();
            tx.enqueue(&new_job("lost", &["q1"])).unwrap();
        }
        assert!(store.list_buffered().unwrap().is_empty());
    }

    #[test]
    fn test_renumber_moves_associations() {
        let mut store = Store::open_in_memory().unwrap();
        let a = store.enqueue(&new_job("a", &["q1", "q2"])).unwrap();

        let tx = store.exclusive().unwrap();
        tx.renumber(a, a + 10).unwrap();
        tx.commit().unwrap();

        let jobs = store.list_buffered().unwrap();
        assert_eq!(jobs[0].local_id, a + 10);
        assert_eq!(jobs[0].queues, vec!["q1", "q2"]);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .conn
            .pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();

        assert!(matches!(store.get_limit("q"), Err(StoreError::Schema(_))));
        assert!(matches!(store.exclusive(), Err(StoreError::Schema(_))));
    }

    #[test]
    fn test_unversioned_tables_are_rejected() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .conn
            .execute_batch(r#"CREATE TABLE "limits"("queue" TEXT, "value" INTEGER);"#)
            .unwrap();

        assert!(matches!(
            store.set_limit("q", 1),
            Err(StoreError::Schema(_))
        ));
    }

    #[test]
    fn test_reads_reject_unversioned_tables() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn
            .execute_batch(
                r#"
                CREATE TABLE "limits"("queue" TEXT, "value" INTEGER);
                CREATE TABLE "jobs"("id" INTEGER PRIMARY KEY, "name" TEXT, "command" TEXT, "cwd" TEXT);
                INSERT INTO "limits" VALUES ('q', 2);
                INSERT INTO "jobs" ("name", "command", "cwd") VALUES ('a', '["true"]', '/tmp');
                "#,
            )
            .unwrap();

        assert!(matches!(store.get_limit("q"), Err(StoreError::Schema(_))));
        assert!(matches!(store.all_limits(), Err(StoreError::Schema(_))));
        assert!(matches!(store.list_buffered(), Err(StoreError::Schema(_))));
        assert_eq!(store.schema_version().unwrap(), 0);
    }
}
