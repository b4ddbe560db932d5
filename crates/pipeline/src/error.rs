use hoit_core::types::JobId;
use hoit_db::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: JobId },

    /// A worker rejected or never received a dispatch. The job has already
    /// been marked failed with `code`.
    #[error("{code}: {message}")]
    Dispatch { code: String, message: String },

    /// The job kept changing status underneath a conditional update.
    #[error("Job {0} changed concurrently, giving up")]
    Contended(JobId),

    #[error("Dispatch queue is closed")]
    QueueClosed,
}
