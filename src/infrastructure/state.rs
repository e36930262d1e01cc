//! Application state shared by the HTTP handlers

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::domain::JobQuery;
use crate::pipeline::LogIngestor;

#[derive(Clone)]
pub struct AppState {
    /// Read side of the job store
    pub jobs: Arc<dyn JobQuery>,
    /// Where the audit middleware hands finished records
    pub ingestor: LogIngestor,
    /// Fires on shutdown; records offered afterwards are dropped
    pub shutdown: CancellationToken,
    /// Whether log jobs are relayed through a broker
    pub relay_enabled: bool,
}

impl AppState {
    pub fn new(
        jobs: Arc<dyn JobQuery>,
        ingestor: LogIngestor,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            jobs,
            ingestor,
            shutdown,
            relay_enabled: false,
        }
    }

    pub fn with_relay(mut self, enabled: bool) -> Self {
        self.relay_enabled = enabled;
        self
    }
}
