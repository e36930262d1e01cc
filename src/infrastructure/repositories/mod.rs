//! Repository implementations

pub mod log_job_repository;
pub mod memory_job_repository;

pub use log_job_repository::SeaOrmJobStore;
pub use memory_job_repository::InMemoryJobStore;
