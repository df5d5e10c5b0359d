use async_trait::async_trait;
use thiserror::Error;

use crate::action::RunStatus;

#[derive(Debug, Error)]
#[error("failed to report {status} for run {run_id}: {source}")]
pub struct ReportError {
    pub run_id: String,
    pub status: RunStatus,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl ReportError {
    pub fn new(
        run_id: impl Into<String>,
        status: RunStatus,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            status,
            source: source.into(),
        }
    }
}

/// Sends the terminal status of a run back to the system that triggered it.
///
/// One call per run; implementations must treat a non-affirmative
/// acknowledgement as an error.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, run_id: &str, status: RunStatus) -> Result<(), ReportError>;
}
