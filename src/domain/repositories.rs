//! Repository trait definitions
//!
//! These traits define the contract for data access.
//! Implementations live in the infrastructure layer.

use async_trait::async_trait;

use super::{DomainError, JobStatus, LogJob, NewLogJob};

/// Write side of the log job store, as used by the relay and the intake.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Atomically select up to `limit` claimable jobs and mark them `Processing`.
    ///
    /// Claimable means `Created` or `Failed`, or `Processing` for longer than
    /// the store's reclaim window.
    async fn claim_pending(&self, limit: u64) -> Result<Vec<LogJob>, DomainError>;

    /// Persist a status transition.
    ///
    /// Returns `false` when the job does not exist or is already terminal;
    /// terminal jobs are never modified.
    async fn update_status(
        &self,
        id: i32,
        status: JobStatus,
        attempts_left: i32,
    ) -> Result<bool, DomainError>;

    /// Create a new job in `Created` status.
    async fn create_job(
        &self,
        record: NewLogJob,
        attempts_left: i32,
    ) -> Result<LogJob, DomainError>;
}

/// Filter criteria for job listings
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub limit: Option<u64>,
}

/// Read side of the log job store, used by the inspection endpoints.
#[async_trait]
pub trait JobQuery: Send + Sync {
    /// Find a job by ID
    async fn find_by_id(&self, id: i32) -> Result<Option<LogJob>, DomainError>;

    /// List jobs, newest first
    async fn list(&self, filter: JobFilter) -> Result<Vec<LogJob>, DomainError>;
}
