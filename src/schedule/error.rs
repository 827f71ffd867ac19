use std::path::PathBuf;

use thiserror::Error;

use crate::schedule::types::JobStatus;

/// Outcomes of job operations that are not a plain success.
///
/// `NotFound`, `InvalidTransition`, `NotReady` and `DuplicateUlid` are
/// expected answers callers branch on. `Storage` is transient and leaves the
/// job unchanged. `MissingArtifact` is a consistency violation and is never
/// repaired automatically.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {ulid} cannot {action} while {current}")]
    InvalidTransition {
        ulid: String,
        action: &'static str,
        current: JobStatus,
    },

    #[error("Transcript for job {ulid} is not ready, current status: {current}")]
    NotReady { ulid: String, current: JobStatus },

    #[error("Job ulid already exists: {0}")]
    DuplicateUlid(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage failure for {path:?}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Job {ulid} is {status} but its transcript is missing at '{path}'")]
    MissingArtifact {
        ulid: String,
        status: JobStatus,
        path: String,
    },

    #[error("Corrupt job row: {0}")]
    CorruptRow(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database error: {0}")]
    Orm(#[from] sea_orm::DbErr),
}

impl JobError {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        JobError::Storage {
            path: path.into(),
            source,
        }
    }

    /// Errors that indicate a bug or tampering rather than a caller mistake.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            JobError::Storage { .. }
                | JobError::MissingArtifact { .. }
                | JobError::CorruptRow(_)
                | JobError::Database(_)
                | JobError::Orm(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, JobError>;
