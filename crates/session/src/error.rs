//! Session error types

use std::path::PathBuf;

use capture::CaptureError;
use contracts::{ContractError, DeviceId};
use sync_engine::SyncError;
use thiserror::Error;

use crate::state::SessionState;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("operation '{op}' not allowed in state {state}")]
    InvalidState { op: &'static str, state: SessionState },

    #[error("device '{device}' is not part of the session blueprint")]
    UnknownDevice { device: DeviceId },

    #[error("blueprint device '{serial}' was not provided")]
    MissingDevice { serial: String },

    #[error("failed to create session directory {path}: {source}")]
    SessionDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("setup failed for device '{device}' at {step}: {message}")]
    DeviceSetup {
        device: DeviceId,
        step: &'static str,
        message: String,
    },

    #[error("session monitor thread panicked")]
    MonitorPanicked,

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl SessionError {
    pub fn device_setup(device: &DeviceId, step: &'static str, message: impl ToString) -> Self {
        Self::DeviceSetup {
            device: device.clone(),
            step,
            message: message.to_string(),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, SessionError>;
