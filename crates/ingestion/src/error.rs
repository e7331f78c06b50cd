//! Ingestion error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestionError {
    /// Consumer side was released
    #[error("frame queue closed for device {device}")]
    QueueClosed { device: String },

    /// Producer is paused on backpressure
    #[error("ingestion paused for device {device}: queue at {depth}/{capacity}")]
    Paused {
        device: String,
        depth: usize,
        capacity: usize,
    },
}

/// Ingestion Result alias
pub type Result<T> = std::result::Result<T, IngestionError>;
