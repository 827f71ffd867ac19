use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::schedule::error::Result;
use crate::schedule::types::{Job, JobPriority, NewJob};
use crate::web::Pagination;

pub mod entity;
pub mod mapping;
pub mod sqlite;

pub use sqlite::SqliteJobStorage;

/// Side effect committed together with a status transition. It is only
/// polled after the guarded update matched the job, and an error from it
/// rolls the transition back.
pub type StorageAction<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Durable job records. Every status change is a conditional update guarded
/// on the current status, so callers never read-then-write.
#[async_trait]
pub trait JobStorage: Send + Sync + 'static {
    /// Inserts a pending job, running `finalize` before the row becomes
    /// visible. A duplicate ulid fails with `DuplicateUlid` and never runs it.
    async fn create<'a>(&self, job: &NewJob, finalize: StorageAction<'a>) -> Result<Job>;
    async fn get(&self, ulid: &str) -> Result<Option<Job>>;
    async fn list(&self, pagination: &Pagination) -> Result<Vec<Job>>;

    /// Atomically moves the oldest claimable job of `priority` (restricted to
    /// `models` when non-empty) to transcribing and returns it.
    async fn claim_next(
        &self,
        priority: JobPriority,
        models: &[String],
        now: DateTime<Utc>,
    ) -> Result<Option<Job>>;
    async fn has_claimable(&self, priority: JobPriority, models: &[String]) -> Result<bool>;

    /// Sets `last_heartbeat_at` on a transcribing job. Returns rows touched.
    async fn touch_heartbeat(&self, ulid: &str, now: DateTime<Utc>) -> Result<u64>;
    /// Transcribing jobs whose last sign of life is older than `cutoff`.
    async fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>>;
    /// transcribing -> failed, only if still stale at `cutoff`.
    async fn fail_if_stale(&self, ulid: &str, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<bool>;
    /// transcribing -> failed.
    async fn mark_failed(&self, ulid: &str, now: DateTime<Utc>) -> Result<bool>;

    /// transcribing|failed -> completed, with `finalize` run inside the same
    /// transaction.
    async fn mark_completed<'a>(
        &self,
        ulid: &str,
        transcript_path: &str,
        now: DateTime<Utc>,
        finalize: StorageAction<'a>,
    ) -> Result<bool>;

    /// completed -> retrieved, with `release` run inside the same transaction.
    /// Only the caller that gets `true` performed the flip.
    async fn mark_retrieved<'a>(
        &self,
        ulid: &str,
        now: DateTime<Utc>,
        release: StorageAction<'a>,
    ) -> Result<bool>;

    /// Job count per stored status value.
    async fn status_counts(&self) -> Result<Vec<(String, u64)>>;
}
