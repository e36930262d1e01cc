//! Domain layer - Pure business abstractions
//!
//! This layer contains no HTTP or broker dependencies.
//! Only the log job model, the store contracts and domain error types.

pub mod errors;
pub mod log_job;
pub mod repositories;

pub use errors::DomainError;
pub use log_job::*;
pub use repositories::*;
