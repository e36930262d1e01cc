//! Inspection of stored log jobs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use utoipa::IntoParams;

use super::audit::AuditMessage;
use crate::domain::{DomainError, JobFilter, JobStatus};
use crate::infrastructure::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListLogsQuery {
    /// One of `created`, `processing`, `failed`, `no_attempts_left`, `done`
    pub status: Option<String>,
    /// Maximum number of jobs returned (default 100)
    pub limit: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/api/logs",
    params(ListLogsQuery),
    responses(
        (status = 200, description = "Log jobs, newest first", body = [crate::domain::LogJob]),
        (status = 400, description = "Unknown status filter")
    )
)]
pub async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<ListLogsQuery>,
) -> Response {
    let status = match query.status.as_deref().map(str::parse::<JobStatus>).transpose() {
        Ok(status) => status,
        Err(e) => return error_response(e),
    };

    let filter = JobFilter {
        status,
        limit: query.limit,
    };

    match state.jobs.list(filter).await {
        Ok(jobs) => {
            let audit = AuditMessage(format!("listed {} log jobs", jobs.len()));
            (StatusCode::OK, Extension(audit), Json(jobs)).into_response()
        }
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    get,
    path = "/api/logs/{id}",
    params(("id" = i32, Path, description = "Log job id")),
    responses(
        (status = 200, description = "The log job", body = crate::domain::LogJob),
        (status = 404, description = "No such log job")
    )
)]
pub async fn get_log(State(state): State<AppState>, Path(id): Path<i32>) -> Response {
    match state.jobs.find_by_id(id).await {
        Ok(Some(job)) => {
            let audit = AuditMessage(format!("viewed log job {}", id));
            (StatusCode::OK, Extension(audit), Json(job)).into_response()
        }
        Ok(None) => error_response(DomainError::NotFound),
        Err(e) => error_response(e),
    }
}

fn error_response(e: DomainError) -> Response {
    let status = match &e {
        DomainError::NotFound => StatusCode::NOT_FOUND,
        DomainError::Validation(_) => StatusCode::BAD_REQUEST,
        DomainError::Database(_) | DomainError::Corrupted(_) => {
            tracing::error!("Log job query failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (status, Json(json!({ "error": e.to_string() }))).into_response()
}
