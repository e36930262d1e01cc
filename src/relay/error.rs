use thiserror::Error;

use crate::broker::BrokerError;
use crate::domain::DomainError;

/// Errors that stop the relay task group.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The job store rejected a claim or a status write.
    #[error("job store error: {0}")]
    Store(#[from] DomainError),

    /// The broker connection or subscription failed.
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// A relay task panicked or was aborted.
    #[error("relay task '{task}' failed: {message}")]
    Task { task: &'static str, message: String },
}
