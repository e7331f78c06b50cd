//! Frame records produced by devices and pixel format codes

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel layout of a frame payload.
///
/// The numeric code is what gets persisted in recording file headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 8-bit Bayer GR mosaic
    BayerGr8,
    /// 16-bit Bayer GR mosaic
    BayerGr16,
    /// Packed 8-bit BGR
    Bgr8,
}

impl PixelFormat {
    pub const fn code(self) -> u16 {
        match self {
            Self::BayerGr8 => 0,
            Self::BayerGr16 => 1,
            Self::Bgr8 => 2,
        }
    }

    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::BayerGr8),
            1 => Some(Self::BayerGr16),
            2 => Some(Self::Bgr8),
            _ => None,
        }
    }

    pub const fn bytes_per_pixel(self) -> u64 {
        match self {
            Self::BayerGr8 => 1,
            Self::BayerGr16 => 2,
            Self::Bgr8 => 3,
        }
    }

    /// Payload size of one frame at the given resolution
    pub const fn frame_size(self, width: u16, height: u16) -> u64 {
        width as u64 * height as u64 * self.bytes_per_pixel()
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BayerGr8 => "BayerGR8",
            Self::BayerGr16 => "BayerGR16",
            Self::Bgr8 => "BGR8",
        };
        f.write_str(name)
    }
}

/// One captured frame as handed over by a device stream.
///
/// `frame_index` is the device's own frame counter and `timestamp_ns`
/// is the device-clock time of exposure. The payload is shared, so
/// clones do not copy pixel data.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub frame_index: u64,
    pub timestamp_ns: i64,
    pub payload: Bytes,
}

impl FrameRecord {
    pub fn new(frame_index: u64, timestamp_ns: i64, payload: Bytes) -> Self {
        Self {
            frame_index,
            timestamp_ns,
            payload,
        }
    }

    #[inline]
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}
