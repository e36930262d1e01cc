//! SeaORM implementation of JobStore and JobQuery

use std::time::Duration;

use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};

use crate::domain::{
    DeliveryOutcome, DomainError, JobFilter, JobQuery, JobStatus, JobStore, LogJob, NewLogJob,
    now_timestamp, timestamp_secs_ago,
};
use crate::models::log_job::{ActiveModel, Column, Entity as LogJobEntity};

const DEFAULT_LIST_LIMIT: u64 = 100;

/// SeaORM-based implementation of the log job store
pub struct SeaOrmJobStore {
    db: DatabaseConnection,
    reclaim_after: Duration,
}

impl SeaOrmJobStore {
    /// `reclaim_after` is how long a job may sit in `Processing` before a
    /// later claim takes it again.
    pub fn new(db: DatabaseConnection, reclaim_after: Duration) -> Self {
        Self { db, reclaim_after }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    fn claimable(&self) -> Condition {
        let cutoff = timestamp_secs_ago(self.reclaim_after.as_secs());

        Condition::any()
            .add(Column::Status.is_in([
                JobStatus::Created.as_str(),
                JobStatus::Failed.as_str(),
            ]))
            .add(
                Condition::all()
                    .add(Column::Status.eq(JobStatus::Processing.as_str()))
                    .add(Column::UpdatedAt.lt(cutoff)),
            )
    }
}

#[async_trait]
impl JobStore for SeaOrmJobStore {
    async fn claim_pending(&self, limit: u64) -> Result<Vec<LogJob>, DomainError> {
        let txn = self.db.begin().await?;

        let rows = LogJobEntity::find()
            .filter(self.claimable())
            .order_by_asc(Column::Id)
            .limit(limit)
            .all(&txn)
            .await?;

        if rows.is_empty() {
            txn.commit().await?;
            return Ok(Vec::new());
        }

        let now = now_timestamp();
        let mut fresh_ids = Vec::new();
        let mut claimed = Vec::with_capacity(rows.len());

        for row in rows {
            let mut job = LogJob::try_from(row)?;

            // A stale Processing row is an echo that never arrived
            if job.status == JobStatus::Processing {
                let (status, attempts_left) = job.next_state(DeliveryOutcome::Failed);
                let status = match status {
                    JobStatus::NoAttemptsLeft => status,
                    _ => JobStatus::Processing,
                };

                LogJobEntity::update_many()
                    .col_expr(Column::Status, Expr::value(status.as_str()))
                    .col_expr(Column::AttemptsLeft, Expr::value(attempts_left))
                    .col_expr(Column::UpdatedAt, Expr::value(now.clone()))
                    .filter(Column::Id.eq(job.id))
                    .exec(&txn)
                    .await?;

                if status == JobStatus::NoAttemptsLeft {
                    tracing::warn!(
                        "⚠️ Log job {} was never confirmed and has no attempts left",
                        job.id
                    );
                    continue;
                }
                job.attempts_left = attempts_left;
            } else {
                fresh_ids.push(job.id);
            }

            job.status = JobStatus::Processing;
            job.updated_at = now.clone();
            claimed.push(job);
        }

        if !fresh_ids.is_empty() {
            LogJobEntity::update_many()
                .col_expr(Column::Status, Expr::value(JobStatus::Processing.as_str()))
                .col_expr(Column::UpdatedAt, Expr::value(now))
                .filter(Column::Id.is_in(fresh_ids))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;

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

        let result = LogJobEntity::update_many()
            .col_expr(Column::Status, Expr::value(status.as_str()))
            .col_expr(Column::AttemptsLeft, Expr::value(attempts_left))
            .col_expr(Column::UpdatedAt, Expr::value(now_timestamp()))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.is_not_in(JobStatus::TERMINAL.map(|s| s.as_str())))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
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

        let now = now_timestamp();

        let job = ActiveModel {
            order_id: Set(record.order_id),
            admin_id: Set(record.admin_id),
            message: Set(record.message),
            url: Set(record.url),
            method: Set(record.method),
            http_status: Set(record.http_status),
            status: Set(JobStatus::Created.as_str().to_string()),
            attempts_left: Set(attempts_left),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let result = job.insert(&self.db).await?;

        LogJob::try_from(result)
    }
}

#[async_trait]
impl JobQuery for SeaOrmJobStore {
    async fn find_by_id(&self, id: i32) -> Result<Option<LogJob>, DomainError> {
        let job = LogJobEntity::find_by_id(id).one(&self.db).await?;

        job.map(LogJob::try_from).transpose()
    }

    async fn list(&self, filter: JobFilter) -> Result<Vec<LogJob>, DomainError> {
        let mut query = LogJobEntity::find();

        if let Some(status) = filter.status {
            query = query.filter(Column::Status.eq(status.as_str()));
        }

        let jobs = query
            .order_by_desc(Column::Id)
            .limit(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .all(&self.db)
            .await?;

        jobs.into_iter().map(LogJob::try_from).collect()
    }
}
