pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod heartbeat;
pub mod ingester;
pub mod retrieval;
pub mod submit;
pub mod sweeper;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{EngineConfig, JobEngine};
pub use error::JobError;
pub use sweeper::SweepScheduler;
pub use types::{
    ClaimedJob, CompletedJob, Job, JobPriority, JobStats, JobStatus, JobView, PingOutcome,
    Retrieved, SubmitRequest, SubmittedJob, WorkerCapabilities,
};

// job store lives with the other storage backends
pub use crate::storage::job::JobStorage;
