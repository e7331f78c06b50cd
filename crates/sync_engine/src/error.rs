//! Sync engine error types

use contracts::{ContractError, DeviceId};
use thiserror::Error;

use crate::role::RoleCensus;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Rejected before any device was touched
    #[error("invalid {field}: {message}")]
    InvalidParameter { field: String, message: String },

    #[error(
        "devices did not reach role '{expected}' within {waited_ms}ms \
         (followers={}, leaders={}, unknown={})",
        .census.followers,
        .census.leaders,
        .census.unknown
    )]
    RoleTimeout {
        expected: contracts::SyncRole,
        waited_ms: u64,
        census: RoleCensus,
    },

    #[error("clock offset estimation failed for device '{device}' at {op}")]
    Estimation {
        device: DeviceId,
        op: &'static str,
        #[source]
        source: ContractError,
    },

    #[error("scheduling failed for device '{device}' at {step}")]
    Schedule {
        device: DeviceId,
        step: &'static str,
        #[source]
        source: ContractError,
    },

    #[error("no clock offset estimated for device '{device}'")]
    MissingOffset { device: DeviceId },
}

impl SyncError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Device the error is attributed to, if any
    pub fn device(&self) -> Option<&DeviceId> {
        match self {
            Self::Estimation { device, .. }
            | Self::Schedule { device, .. }
            | Self::MissingOffset { device } => Some(device),
            Self::InvalidParameter { .. } | Self::RoleTimeout { .. } => None,
        }
    }
}

impl From<SyncError> for ContractError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::InvalidParameter { field, message } => {
                ContractError::ConfigValidation { field, message }
            }
            SyncError::RoleTimeout {
                waited_ms, census, ..
            } => ContractError::SyncRoleTimeout {
                waited_ms,
                followers: census.followers,
                leaders: census.leaders,
                unknown: census.unknown,
            },
            SyncError::Estimation { source, .. } | SyncError::Schedule { source, .. } => source,
            other @ SyncError::MissingOffset { .. } => ContractError::Other(other.to_string()),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, SyncError>;
