use crate::sender::SinkError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BufferError {
    #[error("Buffer is closed")]
    Closed,

    #[error("Invalid buffer capacity: {capacity}")]
    InvalidCapacity { capacity: usize },

    #[error("Invalid flush delay: {reason}")]
    InvalidDelay { reason: String },

    #[error("Downstream sink failed: {0}")]
    Sink(#[from] SinkError),

    #[error("Failed to spawn flush worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("Flush worker panicked")]
    WorkerPanicked,
}

impl BufferError {
    /// Configuration errors are fatal to construction; everything else is a
    /// runtime condition the caller may report and move past.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            BufferError::InvalidCapacity { .. } | BufferError::InvalidDelay { .. }
        )
    }
}
