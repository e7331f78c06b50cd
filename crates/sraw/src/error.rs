//! SRAW error types

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SrawError>;

#[derive(Debug, Error)]
pub enum SrawError {
    /// File shorter than a file header
    #[error("file too small: {got} bytes, need at least {need}")]
    FileTooSmall { got: u64, need: u64 },

    /// Stream ended inside a frame header
    #[error("truncated frame header at offset {offset}: {got} of {need} bytes")]
    TruncatedFrameHeader { offset: u64, got: usize, need: usize },

    /// Stream ended inside a frame payload
    #[error("truncated payload for frame {frame_index}: {got} of {expected} bytes")]
    TruncatedPayload {
        frame_index: u64,
        got: u64,
        expected: u64,
    },

    #[error("bad file magic {found:?}")]
    BadMagic { found: [u8; 4] },

    #[error("unsupported format version {version}")]
    UnsupportedVersion { version: u32 },

    #[error("unknown pixel format code {code}")]
    UnknownPixelFormat { code: u16 },

    #[error("frame position {position} out of range ({count} frames)")]
    FrameOutOfRange { position: usize, count: usize },

    #[error("payload of {size} bytes does not fit a frame header")]
    PayloadTooLarge { size: usize },

    #[error("file header already written")]
    HeaderAlreadyWritten,

    #[error("frame written before file header")]
    MissingFileHeader,

    /// Metadata log row that does not parse
    #[error("{path}: malformed metadata row {line}: {message}")]
    MalformedLogRow {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
