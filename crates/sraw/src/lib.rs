//! # SRAW
//!
//! Split raw recording format.
//!
//! A recording is a sequence of files per device, each starting with a
//! 40-byte file header followed by frames (24-byte frame header plus
//! payload). All integers are little-endian.
//!
//! ```text
//! file header : magic "SRAW" | version u32 | serial [u8;16] | start_ns i64
//!               | width u16 | height u16 | pixel_format u16 | reserved u16
//! frame header: magic "FRAM" | payload_size u32 | frame_index u64 | timestamp_ns i64
//! ```
//!
//! Alongside the raw files each device has a plain-text metadata log with
//! one `frame_number,device_timestamp_ns` row per captured frame.

mod error;
mod format;
mod metadata;
mod naming;
mod reader;
mod recording;
mod writer;

pub use error::{Result, SrawError};
pub use format::*;
pub use metadata::{
    create_metadata_log, read_metadata_log, MetadataLogEntry, MetadataLogWriter,
    METADATA_LOG_HEADER,
};
pub use naming::*;
pub use reader::{FrameInfo, FrameIter, SrawReader};
pub use recording::{RecordingLayout, RecordingWriter};
pub use writer::SrawWriter;
