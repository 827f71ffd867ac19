use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle stage of a job. Stored as the lowercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Transcribing,
    Completed,
    Failed,
    Retrieved,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Transcribing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Retrieved,
    ];

    /// Only pending and failed jobs may be handed to a worker.
    pub const CLAIMABLE: [JobStatus; 2] = [JobStatus::Pending, JobStatus::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Transcribing => "transcribing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Retrieved => "retrieved",
        }
    }


    /// Statuses for which `transcript_path` must be set.
    pub fn has_transcript(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Retrieved)
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(status: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|s| s.as_str() == status)
            .ok_or_else(|| format!("Invalid job status: {}", status))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    #[default]
    Low,
    High,
}

impl JobPriority {
    /// Dispatch order: every high priority job is offered before any low one.
    pub const DISPATCH_ORDER: [JobPriority; 2] = [JobPriority::High, JobPriority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobPriority::Low => "low",
            JobPriority::High => "high",
        }
    }
}

impl Display for JobPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobPriority {
    type Err = String;

    fn from_str(priority: &str) -> Result<Self, Self::Err> {
        match priority.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(JobPriority::Low),
            "high" => Ok(JobPriority::High),
            other => Err(format!("Invalid priority level: {}", other)),
        }
    }
}

/// A job row as held by the store. `id` never leaves the crate's storage
/// and scheduling layers; use [`JobView`] or [`ClaimedJob`] externally.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: i64,
    pub ulid: String,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub model_selector: String,
    pub file_name: String,
    pub file_path: String,
    pub transcript_path: Option<String>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn view(&self) -> JobView {
        JobView {
            ulid: self.ulid.clone(),
            status: self.status,
            priority: self.priority,
            model_selector: self.model_selector.clone(),
            file_name: self.file_name.clone(),
            has_transcript: self.transcript_path.is_some(),
            last_heartbeat_at: self.last_heartbeat_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn claimed(&self) -> ClaimedJob {
        ClaimedJob {
            ulid: self.ulid.clone(),
            file_name: self.file_name.clone(),
            file_path: self.file_path.clone(),
            priority: self.priority,
            model_selector: self.model_selector.clone(),
        }
    }
}

/// Insert payload for a freshly submitted job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub ulid: String,
    pub priority: JobPriority,
    pub model_selector: String,
    pub file_name: String,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
}

/// What a worker receives from a successful claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimedJob {
    pub ulid: String,
    pub file_name: String,
    pub file_path: String,
    pub priority: JobPriority,
    pub model_selector: String,
}

/// Client and operator facing projection of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub ulid: String,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub model_selector: String,
    pub file_name: String,
    pub has_transcript: bool,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Describes the worker asking for work.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerCapabilities {
    pub worker_id: Option<String>,
    /// Model selectors the worker can serve. Empty means any.
    #[serde(default)]
    pub models: Vec<String>,
}

impl WorkerCapabilities {
    pub fn any(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: Some(worker_id.into()),
            models: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        self.worker_id.as_deref().unwrap_or("anonymous")
    }
}

#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub priority: JobPriority,
    pub model_selector: Option<String>,
    pub ulid: Option<String>,
    pub file_name: String,
    pub audio: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedJob {
    pub job_ulid: String,
    pub status: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingOutcome {
    Acknowledged,
    NotFound,
    /// The job exists but is no longer held by a worker, e.g. it was swept.
    NotTranscribing(JobStatus),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedJob {
    pub ulid: String,
    pub transcript_path: String,
    /// True when the result arrived after the claim had been swept to failed.
    pub salvaged: bool,
}

#[derive(Debug, Clone)]
pub struct Retrieved {
    pub transcript: Vec<u8>,
    pub job: JobView,
    /// Whether this call performed the completed -> retrieved flip and
    /// released the source audio.
    pub first_retrieval: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStats {
    pub by_status: BTreeMap<String, u64>,
    pub total: u64,
}

impl JobStats {
    pub fn from_counts(counts: impl IntoIterator<Item = (String, u64)>) -> Self {
        let mut stats = JobStats::default();
        for (status, count) in counts {
            stats.total += count;
            *stats.by_status.entry(status).or_insert(0) += count;
        }
        stats
    }

    pub fn count(&self, status: JobStatus) -> u64 {
        self.by_status.get(status.as_str()).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_its_own_name() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("processing".parse::<JobStatus>().is_err());
    }

    #[test]
    fn priority_defaults_to_low_and_is_case_insensitive() {
        assert_eq!(JobPriority::default(), JobPriority::Low);
        assert_eq!("HIGH".parse::<JobPriority>().unwrap(), JobPriority::High);
        assert!("medium".parse::<JobPriority>().is_err());
    }

    #[test]
    fn stats_total_is_sum_of_counts() {
        let stats = JobStats::from_counts(vec![
            ("pending".to_string(), 3),
            ("failed".to_string(), 2),
            ("retrieved".to_string(), 7),
        ]);
        assert_eq!(stats.total, 12);
        assert_eq!(stats.count(JobStatus::Failed), 2);
        assert_eq!(stats.count(JobStatus::Completed), 0);
    }
}
