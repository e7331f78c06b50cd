//! Device layer error types

use contracts::ContractError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device not found: {serial}")]
    NotFound { serial: String },

    #[error("failed to open device '{serial}': {message}")]
    OpenFailed { serial: String, message: String },

    /// No alias of a required capability is exposed by the device
    #[error("device '{serial}' does not expose {capability} (tried {tried:?})")]
    CapabilityMissing {
        serial: String,
        capability: String,
        tried: Vec<&'static str>,
    },

    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl DeviceError {
    pub fn open_failed(serial: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OpenFailed {
            serial: serial.into(),
            message: message.into(),
        }
    }
}

impl From<DeviceError> for ContractError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::NotFound { serial } => ContractError::DeviceNotFound { serial },
            DeviceError::CapabilityMissing {
                serial, capability, ..
            } => ContractError::CapabilityMissing {
                device: serial,
                capability,
            },
            DeviceError::Contract(inner) => inner,
            other => ContractError::Other(other.to_string()),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, DeviceError>;
