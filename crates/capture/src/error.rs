//! Capture error types

use contracts::{ContractError, DeviceId};
use sraw::SrawError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to spawn capture worker for device '{device}': {source}")]
    Spawn {
        device: DeviceId,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Sraw(#[from] SrawError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias
pub type Result<T> = std::result::Result<T, CaptureError>;
