use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, JobStatus, LogJob};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "log_jobs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub order_id: Option<i32>,
    pub admin_id: Option<i32>,
    pub message: String,
    pub url: String,
    pub method: String,
    pub http_status: i32,
    #[sea_orm(default_value = "created")]
    pub status: String, // created, processing, failed, no_attempts_left, done
    pub attempts_left: i32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for LogJob {
    type Error = DomainError;

    fn try_from(m: Model) -> Result<Self, Self::Error> {
        let status = m.status.parse::<JobStatus>().map_err(|_| {
            DomainError::Corrupted(format!("job {} has status '{}'", m.id, m.status))
        })?;

        Ok(LogJob {
            id: m.id,
            order_id: m.order_id,
            admin_id: m.admin_id,
            message: m.message,
            url: m.url,
            method: m.method,
            http_status: m.http_status,
            status,
            attempts_left: m.attempts_left,
            created_at: m.created_at,
            updated_at: m.updated_at,
        })
    }
}
