//! Ingestion error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Catalogue error: {0}")]
    Catalogue(#[from] catalogue::CatalogueError),

    #[error("Download manager error: {0}")]
    Dm(#[from] dm_client::DmError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Coastline mask error: {0}")]
    Mask(#[from] coastline::MaskError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The task was stopped by request; not a failure.
    #[error("Stop request")]
    Stopped,

    #[error("Ingestion failed: {0}")]
    Failed(String),
}

impl IngestError {
    /// True when the error is a stop request rather than a failure.
    pub fn is_stop(&self) -> bool {
        matches!(self, IngestError::Stopped)
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
