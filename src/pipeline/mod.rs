//! Local log pipeline: batching primitives, sinks and the ingestion entry point

pub mod batch;
pub mod filter;
pub mod intake;
pub mod sinks;

pub use batch::{batched, run_batcher};
pub use filter::{filtered, run_filter};
pub use intake::{IntakeOptions, LogIngestor, spawn_intake};
pub use sinks::{DbSink, PrintSink};
