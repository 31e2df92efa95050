//! Distributed scheduler lock (spec §4.H: "single-instance via a
//! distributed lock keyed by job name, lock-until, locked-at, locked-by"),
//! shared by the psychometric job and the session-sweep task (SPEC_FULL.md
//! §2 expansion) so only one process instance runs either at a time.
//!
//! Grounded on the teacher's `rbp-workers::Pool`, which serializes a single
//! background job across worker threads via an in-process mutex; here the
//! same single-instance guarantee has to hold across process instances, so
//! the mutex becomes a row in Postgres instead.
use ac_core::AssessmentError;
use ac_pg::SCHEDULER_LOCKS;
use async_trait::async_trait;
use chrono::DateTime;
use chrono::Duration as ChronoDuration;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use tokio_postgres::Client;
use tokio_postgres::Row;

/// One named lock row (spec §6: "A distributed scheduler lock table with
/// `(name, lock_until, locked_at, locked_by)`").
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerLock {
    name: String,
    locked_by: String,
    locked_at: DateTime<Utc>,
    lock_until: DateTime<Utc>,
}

impl SchedulerLock {
    fn new(name: impl Into<String>, locked_by: impl Into<String>, now: DateTime<Utc>, hold_for: ChronoDuration) -> Self {
        Self {
            name: name.into(),
            locked_by: locked_by.into(),
            locked_at: now,
            lock_until: now + hold_for,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn locked_by(&self) -> &str {
        &self.locked_by
    }
    pub fn lock_until(&self) -> DateTime<Utc> {
        self.lock_until
    }

    fn is_held(&self, now: DateTime<Utc>) -> bool {
        self.lock_until > now
    }
}

#[async_trait]
pub trait SchedulerLockRepository: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<SchedulerLock>, AssessmentError>;

    /// Inserts or takes over the named lock only if it is absent or expired,
    /// atomically from the caller's point of view. Returns `true` if the
    /// caller now holds it.
    async fn try_acquire(
        &self,
        name: &str,
        locked_by: &str,
        now: DateTime<Utc>,
        hold_for: ChronoDuration,
    ) -> Result<bool, AssessmentError>;

    /// Releases the lock early (e.g. the job finished before `lock_until`);
    /// a no-op if the caller no longer holds it.
    async fn release(&self, name: &str, locked_by: &str) -> Result<(), AssessmentError>;
}

/// Runs `job` under the named lock if (and only if) it can be acquired,
/// releasing it on completion regardless of the job's outcome. Returns
/// `Ok(None)` when another holder already owns the lock — this is the
/// expected steady state across a multi-instance deployment, not an error.
pub async fn run_under_lock<T, F, Fut>(
    locks: &dyn SchedulerLockRepository,
    name: &str,
    locked_by: &str,
    now: DateTime<Utc>,
    hold_for: ChronoDuration,
    job: F,
) -> Result<Option<T>, AssessmentError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    if !locks.try_acquire(name, locked_by, now, hold_for).await? {
        return Ok(None);
    }
    let result = job().await;
    if let Err(err) = locks.release(name, locked_by).await {
        log::warn!("failed to release scheduler lock {name}: {err}");
    }
    Ok(Some(result))
}

#[derive(Default)]
pub struct InMemorySchedulerLockRepository {
    locks: RwLock<HashMap<String, SchedulerLock>>,
}

impl InMemorySchedulerLockRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SchedulerLockRepository for InMemorySchedulerLockRepository {
    async fn get(&self, name: &str) -> Result<Option<SchedulerLock>, AssessmentError> {
        Ok(self.locks.read().unwrap().get(name).cloned())
    }

    async fn try_acquire(
        &self,
        name: &str,
        locked_by: &str,
        now: DateTime<Utc>,
        hold_for: ChronoDuration,
    ) -> Result<bool, AssessmentError> {
        let mut locks = self.locks.write().unwrap();
        match locks.get(name) {
            Some(existing) if existing.is_held(now) => Ok(false),
            _ => {
                locks.insert(name.to_string(), SchedulerLock::new(name, locked_by, now, hold_for));
                Ok(true)
            }
        }
    }

    async fn release(&self, name: &str, locked_by: &str) -> Result<(), AssessmentError> {
        let mut locks = self.locks.write().unwrap();
        if locks.get(name).is_some_and(|l| l.locked_by == locked_by) {
            locks.remove(name);
        }
        Ok(())
    }
}

fn row_to_lock(row: &Row) -> SchedulerLock {
    SchedulerLock {
        name: row.get(0),
        locked_by: row.get(1),
        locked_at: row.get(2),
        lock_until: row.get(3),
    }
}

#[async_trait]
impl SchedulerLockRepository for Arc<Client> {
    async fn get(&self, name: &str) -> Result<Option<SchedulerLock>, AssessmentError> {
        let row = self
            .query_opt(
                const_format::concatcp!(
                    "SELECT name, locked_by, locked_at, lock_until FROM ",
                    SCHEDULER_LOCKS,
                    " WHERE name = $1"
                ),
                &[&name],
            )
            .await?;
        Ok(row.as_ref().map(row_to_lock))
    }

    async fn try_acquire(
        &self,
        name: &str,
        locked_by: &str,
        now: DateTime<Utc>,
        hold_for: ChronoDuration,
    ) -> Result<bool, AssessmentError> {
        let lock_until = now + hold_for;
        // A single statement: insert the row, or take it over if the
        // previous holder's `lock_until` has already passed. Either branch
        // is atomic under Postgres's row-level locking, so two instances
        // racing on the same name can never both succeed.
        let rows = self
            .execute(
                const_format::concatcp!(
                    "INSERT INTO ",
                    SCHEDULER_LOCKS,
                    " (name, locked_by, locked_at, lock_until) VALUES ($1,$2,$3,$4)
                     ON CONFLICT (name) DO UPDATE SET
                       locked_by = EXCLUDED.locked_by,
                       locked_at = EXCLUDED.locked_at,
                       lock_until = EXCLUDED.lock_until
                     WHERE ",
                    SCHEDULER_LOCKS,
                    ".lock_until <= EXCLUDED.locked_at"
                ),
                &[&name, &locked_by, &now, &lock_until],
            )
            .await?;
        Ok(rows == 1)
    }

    async fn release(&self, name: &str, locked_by: &str) -> Result<(), AssessmentError> {
        self.execute(
            const_format::concatcp!("DELETE FROM ", SCHEDULER_LOCKS, " WHERE name = $1 AND locked_by = $2"),
            &[&name, &locked_by],
        )
        .await?;
        Ok(())
    }
}

pub(crate) mod pg_schema {
    use ac_pg::SCHEDULER_LOCKS;
    use ac_pg::Schema;

    pub struct SchedulerLockTable;

    impl Schema for SchedulerLockTable {
        fn name() -> &'static str {
            SCHEDULER_LOCKS
        }
        fn creates() -> &'static str {
            const_format::concatcp!(
                "CREATE TABLE IF NOT EXISTS ",
                SCHEDULER_LOCKS,
                " (
                    name        VARCHAR(64) PRIMARY KEY,
                    locked_by   VARCHAR(128) NOT NULL,
                    locked_at   TIMESTAMPTZ NOT NULL,
                    lock_until  TIMESTAMPTZ NOT NULL
                );"
            )
        }
        fn indices() -> &'static str {
            ""
        }
    }
}

pub use pg_schema::SchedulerLockTable;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_while_first_holds_it() {
        let repo = InMemorySchedulerLockRepository::new();
        let now = DateTime::UNIX_EPOCH;
        assert!(repo.try_acquire("psychometric", "instance-a", now, ChronoDuration::minutes(10)).await.unwrap());
        assert!(!repo.try_acquire("psychometric", "instance-b", now, ChronoDuration::minutes(10)).await.unwrap());
    }

    #[tokio::test]
    async fn acquire_succeeds_again_once_expired() {
        let repo = InMemorySchedulerLockRepository::new();
        let now = DateTime::UNIX_EPOCH;
        assert!(repo.try_acquire("sweep", "instance-a", now, ChronoDuration::seconds(30)).await.unwrap());
        let later = now + ChronoDuration::seconds(31);
        assert!(repo.try_acquire("sweep", "instance-b", later, ChronoDuration::seconds(30)).await.unwrap());
    }

    #[tokio::test]
    async fn run_under_lock_skips_when_already_held() {
        let repo = InMemorySchedulerLockRepository::new();
        let now = DateTime::UNIX_EPOCH;
        repo.try_acquire("psychometric", "instance-a", now, ChronoDuration::minutes(10)).await.unwrap();
        let ran = run_under_lock(&repo, "psychometric", "instance-b", now, ChronoDuration::minutes(10), || async { 1 })
            .await
            .unwrap();
        assert!(ran.is_none());
    }

    #[tokio::test]
    async fn run_under_lock_releases_after_the_job_completes() {
        let repo = InMemorySchedulerLockRepository::new();
        let now = DateTime::UNIX_EPOCH;
        let ran = run_under_lock(&repo, "psychometric", "instance-a", now, ChronoDuration::minutes(10), || async { 42 })
            .await
            .unwrap();
        assert_eq!(ran, Some(42));
        assert!(repo.get("psychometric").await.unwrap().is_none());
    }
}
