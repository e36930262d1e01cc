//! In-memory implementation of JobStore and JobQuery
//!
//! Used by tests and by local runs that don't need durable storage. Claims
//! are atomic because every operation holds the same lock.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    DeliveryOutcome, DomainError, JobFilter, JobQuery, JobStatus, JobStore, LogJob, NewLogJob,
    now_timestamp, timestamp_secs_ago,
};

#[derive(Default)]
struct MemoryState {
    jobs: BTreeMap<i32, LogJob>,
    last_id: i32,
    fail_claims: bool,
}

pub struct InMemoryJobStore {
    state: Mutex<MemoryState>,
    reclaim_after: Duration,
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl InMemoryJobStore {
    pub fn new(reclaim_after: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            reclaim_after,
        }
    }

    /// Store `job` as-is, keeping its id and status.
    pub async fn insert(&self, job: LogJob) {
        let mut state = self.state.lock().await;
        state.last_id = state.last_id.max(job.id);
        state.jobs.insert(job.id, job);
    }

    /// Copy of every stored job, ordered by id.
    pub async fn snapshot(&self) -> Vec<LogJob> {
        self.state.lock().await.jobs.values().cloned().collect()
    }

    /// Make every subsequent claim fail with a database error.
    pub async fn set_fail_claims(&self, fail: bool) {
        self.state.lock().await.fail_claims = fail;
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn claim_pending(&self, limit: u64) -> Result<Vec<LogJob>, DomainError> {
        let mut state = self.state.lock().await;
        if state.fail_claims {
            return Err(DomainError::Database("claim rejected".to_string()));
        }

        let cutoff = timestamp_secs_ago(self.reclaim_after.as_secs());
        let now = now_timestamp();
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);

        let mut claimed = Vec::new();

        for job in state.jobs.values_mut() {
            if claimed.len() >= limit {
                break;
            }

            match job.status {
                JobStatus::Created | JobStatus::Failed => {}
                JobStatus::Processing if job.updated_at < cutoff => {
                    // A stale Processing job is an echo that never arrived
                    let (status, attempts_left) = job.next_state(DeliveryOutcome::Failed);
                    job.attempts_left = attempts_left;
                    if status == JobStatus::NoAttemptsLeft {
                        job.status = status;
                        job.updated_at = now.clone();
                        tracing::warn!(
                            "⚠️ Log job {} was never confirmed and has no attempts left",
                            job.id
                        );
                        continue;
                    }
                }
                _ => continue,
            }

            job.status = JobStatus::Processing;
            job.updated_at = now.clone();
            claimed.push(job.clone());
        }

        Ok(claimed)
    }

    async fn update_status(
        &self,
        id: i32,
        status: JobStatus,
        attempts_left: i32,
    ) -> Result<bool, DomainError> {
        if attempts_left < 0 {
            return Err(DomainError::Validation(format!(
                "attempts_left must not be negative (job {})",
                id
            )));
        }

        let mut state = self.state.lock().await;
        match state.jobs.get_mut(&id) {
            Some(job) if !job.status.is_terminal() => {
                job.status = status;
                job.attempts_left = attempts_left;
                job.updated_at = now_timestamp();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_job(
        &self,
        record: NewLogJob,
        attempts_left: i32,
    ) -> Result<LogJob, DomainError> {
        if attempts_left < 0 {
            return Err(DomainError::Validation(
                "attempts_left must not be negative".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        state.last_id += 1;
        let now = now_timestamp();

        let job = LogJob {
            id: state.last_id,
            order_id: record.order_id,
            admin_id: record.admin_id,
            message: record.message,
            url: record.url,
            method: record.method,
            http_status: record.http_status,
            status: JobStatus::Created,
            attempts_left,
            created_at: now.clone(),
            updated_at: now,
        };
        state.jobs.insert(job.id, job.clone());

        Ok(job)
    }
}

#[async_trait]
impl JobQuery for InMemoryJobStore {
    async fn find_by_id(&self, id: i32) -> Result<Option<LogJob>, DomainError> {
        Ok(self.state.lock().await.jobs.get(&id).cloned())
    }

    async fn list(&self, filter: JobFilter) -> Result<Vec<LogJob>, DomainError> {
        let state = self.state.lock().await;
        let limit = filter
            .limit
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(100);

        Ok(state
            .jobs
            .values()
            .rev()
            .filter(|job| filter.status.is_none_or(|s| job.status == s))
            .take(limit)
            .cloned()
            .collect())
    }
}
