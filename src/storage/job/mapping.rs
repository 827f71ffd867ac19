use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::schedule::error::{JobError, Result};
use crate::schedule::types::{Job, JobPriority, JobStatus};
use crate::storage::job::entity::Model as JobModel;

fn parse_status(ulid: &str, status: &str) -> Result<JobStatus> {
    status
        .parse()
        .map_err(|e| JobError::CorruptRow(format!("{}: {}", ulid, e)))
}

fn parse_priority(ulid: &str, priority: &str) -> Result<JobPriority> {
    priority
        .parse()
        .map_err(|e| JobError::CorruptRow(format!("{}: {}", ulid, e)))
}

impl TryFrom<JobModel> for Job {
    type Error = JobError;

    fn try_from(model: JobModel) -> Result<Self> {
        Ok(Job {
            status: parse_status(&model.ulid, &model.status)?,
            priority: parse_priority(&model.ulid, &model.priority)?,
            id: model.id,
            ulid: model.ulid,
            model_selector: model.model_selector,
            file_name: model.file_name,
            file_path: model.file_path,
            transcript_path: model.transcript_path,
            last_heartbeat_at: model.last_heartbeat_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

/// Maps a raw `jobs` row, as returned by `RETURNING *` statements.
pub fn row_to_job(row: &SqliteRow) -> Result<Job> {
    let ulid: String = row.try_get("ulid")?;
    let status: String = row.try_get("status")?;
    let priority: String = row.try_get("priority")?;

    Ok(Job {
        id: row.try_get("id")?,
        status: parse_status(&ulid, &status)?,
        priority: parse_priority(&ulid, &priority)?,
        model_selector: row.try_get("model_selector")?,
        file_name: row.try_get("file_name")?,
        file_path: row.try_get("file_path")?,
        transcript_path: row.try_get("transcript_path")?,
        last_heartbeat_at: row.try_get("last_heartbeat_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        ulid,
    })
}
