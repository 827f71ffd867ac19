use std::str::FromStr;
use std::time::Duration;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    SqlxSqliteConnector,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::entity::{Column, Entity as JobEntity};
use super::mapping::row_to_job;
use super::{JobStorage, StorageAction};
use crate::schedule::error::{JobError, Result};
use crate::schedule::types::{Job, JobPriority, JobStatus, NewJob};
use crate::web::Pagination;

pub struct SqliteJobStorage {
    pool: SqlitePool,
    orm: DatabaseConnection,
}

impl SqliteJobStorage {
    pub async fn new(database_url: &str) -> AnyResult<Self> {
        info!("Initializing SQLite job storage at {}", database_url);
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        Self::create_schema(&pool).await?;

        let orm = SqlxSqliteConnector::from_sqlx_sqlite_pool(pool.clone());
        Ok(Self { pool, orm })
    }

    async fn create_schema(pool: &SqlitePool) -> AnyResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ulid TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                priority TEXT NOT NULL DEFAULT 'low',
                model_selector TEXT NOT NULL DEFAULT 'medium',
                file_name TEXT NOT NULL,
                file_path TEXT NOT NULL,
                transcript_path TEXT,
                last_heartbeat_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_ulid ON jobs (ulid)")
            .execute(pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_jobs_dispatch ON jobs (status, priority, created_at)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

}

/// `AND model_selector IN (?, ...)` when the worker restricts its models.
fn model_filter(models: &[String]) -> String {
    if models.is_empty() {
        return String::new();
    }
    let placeholders = vec!["?"; models.len()].join(", ");
    format!("AND model_selector IN ({})", placeholders)
}

#[async_trait]
impl JobStorage for SqliteJobStorage {
    async fn create<'a>(&self, job: &NewJob, finalize: StorageAction<'a>) -> Result<Job> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO jobs
            (ulid, status, priority, model_selector, file_name, file_path, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&job.ulid)
        .bind(JobStatus::Pending.as_str())
        .bind(job.priority.as_str())
        .bind(&job.model_selector)
        .bind(&job.file_name)
        .bind(&job.file_path)
        .bind(job.created_at)
        .bind(job.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                JobError::DuplicateUlid(job.ulid.clone())
            }
            other => JobError::Database(other),
        });

        let created = match row.and_then(|row| row_to_job(&row)) {
            Ok(created) => created,
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        };

        if let Err(e) = finalize.await {
            debug!("Rolling back creation of {}: {}", job.ulid, e);
            tx.rollback().await?;
            return Err(e);
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn get(&self, ulid: &str) -> Result<Option<Job>> {
        JobEntity::find()
            .filter(Column::Ulid.eq(ulid))
            .one(&self.orm)
            .await?
            .map(Job::try_from)
            .transpose()
    }

    async fn list(&self, pagination: &Pagination) -> Result<Vec<Job>> {
        let pagination = pagination.check();
        JobEntity::find()
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id)
            .offset(pagination.offset())
            .limit(pagination.limit())
            .all(&self.orm)
            .await?
            .into_iter()
            .map(Job::try_from)
            .collect()
    }

    async fn claim_next(
        &self,
        priority: JobPriority,
        models: &[String],
        now: DateTime<Utc>,
    ) -> Result<Option<Job>> {
        // selection and status flip are one statement, so two callers can
        // never both match the same row
        let sql = format!(
            r#"
            UPDATE jobs
            SET status = ?, updated_at = ?, last_heartbeat_at = NULL
            WHERE id = (
                SELECT id FROM jobs
                WHERE priority = ? AND status IN (?, ?) {}
                ORDER BY created_at ASC, id ASC
                LIMIT 1
            )
            AND status IN (?, ?)
            RETURNING *
            "#,
            model_filter(models)
        );

        let mut query = sqlx::query(&sql)
            .bind(JobStatus::Transcribing.as_str())
            .bind(now)
            .bind(priority.as_str())
            .bind(JobStatus::CLAIMABLE[0].as_str())
            .bind(JobStatus::CLAIMABLE[1].as_str());
        for model in models {
            query = query.bind(model);
        }
        let row = query
            .bind(JobStatus::CLAIMABLE[0].as_str())
            .bind(JobStatus::CLAIMABLE[1].as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    async fn has_claimable(&self, priority: JobPriority, models: &[String]) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM jobs WHERE priority = ? AND status IN (?, ?) {})",
            model_filter(models)
        );
        let mut query = sqlx::query_scalar::<_, i64>(&sql)
            .bind(priority.as_str())
            .bind(JobStatus::CLAIMABLE[0].as_str())
            .bind(JobStatus::CLAIMABLE[1].as_str());
        for model in models {
            query = query.bind(model);
        }
        Ok(query.fetch_one(&self.pool).await? != 0)
    }

    async fn touch_heartbeat(&self, ulid: &str, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE jobs SET last_heartbeat_at = ? WHERE ulid = ? AND status = ?",
        )
        .bind(now)
        .bind(ulid)
        .bind(JobStatus::Transcribing.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM jobs
            WHERE status = ?
            AND COALESCE(last_heartbeat_at, updated_at) < ?
            ORDER BY id ASC
            "#,
        )
        .bind(JobStatus::Transcribing.as_str())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_job).collect()
    }

    async fn fail_if_stale(
        &self,
        ulid: &str,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, updated_at = ?
            WHERE ulid = ? AND status = ?
            AND COALESCE(last_heartbeat_at, updated_at) < ?
            "#,
        )
        .bind(JobStatus::Failed.as_str())
        .bind(now)
        .bind(ulid)
        .bind(JobStatus::Transcribing.as_str())
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_failed(&self, ulid: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, updated_at = ? WHERE ulid = ? AND status = ?",
        )
        .bind(JobStatus::Failed.as_str())
        .bind(now)
        .bind(ulid)
        .bind(JobStatus::Transcribing.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_completed<'a>(
        &self,
        ulid: &str,
        transcript_path: &str,
        now: DateTime<Utc>,
        finalize: StorageAction<'a>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, transcript_path = ?, updated_at = ?
            WHERE ulid = ? AND status IN (?, ?)
            "#,
        )
        .bind(JobStatus::Completed.as_str())
        .bind(transcript_path)
        .bind(now)
        .bind(ulid)
        .bind(JobStatus::Transcribing.as_str())
        .bind(JobStatus::Failed.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if let Err(e) = finalize.await {
            debug!("Rolling back completion of {}: {}", ulid, e);
            tx.rollback().await?;
            return Err(e);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn mark_retrieved<'a>(
        &self,
        ulid: &str,
        now: DateTime<Utc>,
        release: StorageAction<'a>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE jobs SET status = ?, updated_at = ? WHERE ulid = ? AND status = ?",
        )
        .bind(JobStatus::Retrieved.as_str())
        .bind(now)
        .bind(ulid)
        .bind(JobStatus::Completed.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if let Err(e) = release.await {
            debug!("Rolling back retrieval of {}: {}", ulid, e);
            tx.rollback().await?;
            return Err(e);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn status_counts(&self) -> Result<Vec<(String, u64)>> {
        let rows: Vec<(String, i64)> = JobEntity::find()
            .select_only()
            .column(Column::Status)
            .column_as(Expr::col(Column::Id).count(), "count")
            .group_by(Column::Status)
            .into_tuple()
            .all(&self.orm)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(status, count)| (status, count.max(0) as u64))
            .collect())
    }
}
