//! Log job model and its delivery state machine

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::DomainError;

/// Delivery status of a log job.
///
/// `Done` and `NoAttemptsLeft` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Processing,
    Failed,
    NoAttemptsLeft,
    Done,
}

impl JobStatus {
    pub const TERMINAL: [JobStatus; 2] = [JobStatus::Done, JobStatus::NoAttemptsLeft];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Processing => "processing",
            JobStatus::Failed => "failed",
            JobStatus::NoAttemptsLeft => "no_attempts_left",
            JobStatus::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(JobStatus::Created),
            "processing" => Ok(JobStatus::Processing),
            "failed" => Ok(JobStatus::Failed),
            "no_attempts_left" => Ok(JobStatus::NoAttemptsLeft),
            "done" => Ok(JobStatus::Done),
            other => Err(DomainError::Validation(format!(
                "unknown job status '{}'",
                other
            ))),
        }
    }
}

/// A persisted record of one administrative action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LogJob {
    pub id: i32,
    pub order_id: Option<i32>,
    pub admin_id: Option<i32>,
    pub message: String,
    pub url: String,
    pub method: String,
    pub http_status: i32,
    pub status: JobStatus,
    pub attempts_left: i32,
    pub created_at: String,
    pub updated_at: String,
}

/// A finished log record offered to ingestion, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLogJob {
    pub order_id: Option<i32>,
    pub admin_id: Option<i32>,
    pub message: String,
    pub url: String,
    pub method: String,
    pub http_status: i32,
}

impl NewLogJob {
    /// Case-insensitive keyword match on the message.
    pub fn mentions(&self, keyword: &str) -> bool {
        self.message
            .to_lowercase()
            .contains(&keyword.to_lowercase())
    }
}

/// What the relay learned about one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The message was read back from the broker.
    Confirmed,
    /// Publishing failed.
    Failed,
}

impl LogJob {
    /// Compute the `(status, attempts_left)` pair that follows `outcome`.
    pub fn next_state(&self, outcome: DeliveryOutcome) -> (JobStatus, i32) {
        match outcome {
            DeliveryOutcome::Confirmed => (JobStatus::Done, self.attempts_left.max(0)),
            DeliveryOutcome::Failed if self.attempts_left > 0 => {
                (JobStatus::Failed, self.attempts_left - 1)
            }
            DeliveryOutcome::Failed => (JobStatus::NoAttemptsLeft, 0),
        }
    }
}

/// Current UTC time in a fixed-width RFC 3339 form.
///
/// Stored timestamps must compare lexicographically in time order, so every
/// writer goes through this helper.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Timestamp `secs` seconds before now, in the same form as [`now_timestamp`].
pub fn timestamp_secs_ago(secs: u64) -> String {
    let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000);
    let delta = chrono::Duration::seconds(secs);
    Utc::now()
        .checked_sub_signed(delta)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
        .to_rfc3339_opts(SecondsFormat::Micros, true)
}
