//! Validation error types
//!
//! Only conditions that prevent a check from running at all end up here.
//! Per-file format problems are reported as check results instead.

use std::path::PathBuf;

use contracts::ContractError;
use sraw::SrawError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    #[error("no recordings found in {}", path.display())]
    NoRecordings { path: PathBuf },

    #[error("no raw files found for device '{serial}'")]
    NoRawFiles { serial: String },

    #[error("no frames found for device '{serial}'")]
    NoFrames { serial: String },

    #[error("sync-check needs at least 2 devices with metadata logs, found {found}")]
    InsufficientDevices { found: usize },

    #[error("no frame numbers common to all devices")]
    NoCommonFrames,

    #[error("invalid {field}: {message}")]
    InvalidParameter { field: &'static str, message: String },

    #[error("unsupported pixel format code {code}; only BayerGR8 can be encoded")]
    UnsupportedPixelFormat { code: u16 },

    #[error("output file already exists: {}", path.display())]
    OutputExists { path: PathBuf },

    #[error(transparent)]
    Sraw(#[from] SrawError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ValidationError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field,
            message: message.into(),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, ValidationError>;
