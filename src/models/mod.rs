pub mod log_job;
