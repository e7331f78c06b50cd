//! Fixed-size headers

use bytes::{Buf, BufMut};
use contracts::PixelFormat;
use serde::Serialize;

use crate::error::{Result, SrawError};

pub const FILE_MAGIC: [u8; 4] = *b"SRAW";
pub const FRAME_MAGIC: [u8; 4] = *b"FRAM";
pub const FORMAT_VERSION: u32 = 1;

pub const FILE_HEADER_SIZE: usize = 40;
pub const FRAME_HEADER_SIZE: usize = 24;

/// Serial field width including the terminating NUL
pub const SERIAL_FIELD_SIZE: usize = 16;
pub const MAX_SERIAL_LEN: usize = SERIAL_FIELD_SIZE - 1;

/// Header at offset 0 of every raw file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub camera_serial: String,
    /// Device timestamp of the first frame in this file
    pub recording_start_ns: i64,
    pub width: u16,
    pub height: u16,
    /// Raw code; see `PixelFormat::from_code`
    pub pixel_format: u16,
    pub reserved: u16,
}

impl FileHeader {
    pub fn new(
        camera_serial: &str,
        recording_start_ns: i64,
        width: u16,
        height: u16,
        pixel_format: PixelFormat,
    ) -> Self {
        Self {
            magic: FILE_MAGIC,
            version: FORMAT_VERSION,
            camera_serial: camera_serial.to_string(),
            recording_start_ns,
            width,
            height,
            pixel_format: pixel_format.code(),
            reserved: 0,
        }
    }

    pub fn encode(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut out = [0u8; FILE_HEADER_SIZE];
        let mut buf = &mut out[..];
        buf.put_slice(&self.magic);
        buf.put_u32_le(self.version);
        buf.put_slice(&encode_serial(&self.camera_serial));
        buf.put_i64_le(self.recording_start_ns);
        buf.put_u16_le(self.width);
        buf.put_u16_le(self.height);
        buf.put_u16_le(self.pixel_format);
        buf.put_u16_le(self.reserved);
        out
    }

    pub fn decode(raw: &[u8; FILE_HEADER_SIZE]) -> Self {
        let mut buf = &raw[..];
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        let version = buf.get_u32_le();
        let mut serial = [0u8; SERIAL_FIELD_SIZE];
        buf.copy_to_slice(&mut serial);
        Self {
            magic,
            version,
            camera_serial: decode_serial(&serial),
            recording_start_ns: buf.get_i64_le(),
            width: buf.get_u16_le(),
            height: buf.get_u16_le(),
            pixel_format: buf.get_u16_le(),
            reserved: buf.get_u16_le(),
        }
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic == FILE_MAGIC
    }

    pub fn pixel_format(&self) -> Option<PixelFormat> {
        PixelFormat::from_code(self.pixel_format)
    }

    /// Reject headers a reader cannot decode frames against
    pub fn check(&self) -> Result<PixelFormat> {
        if !self.has_valid_magic() {
            return Err(SrawError::BadMagic { found: self.magic });
        }
        if self.version != FORMAT_VERSION {
            return Err(SrawError::UnsupportedVersion {
                version: self.version,
            });
        }
        self.pixel_format()
            .ok_or(SrawError::UnknownPixelFormat {
                code: self.pixel_format,
            })
    }

    /// width * height * bytes_per_pixel, if the pixel format is known
    pub fn expected_payload_size(&self) -> Option<u64> {
        self.pixel_format()
            .map(|pf| pf.frame_size(self.width, self.height))
    }
}

/// Header in front of every frame payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameHeader {
    pub magic: [u8; 4],
    pub payload_size: u32,
    /// Position of the frame within the recording, starting at 0
    pub frame_index: u64,
    /// Device timestamp
    pub timestamp_ns: i64,
}

impl FrameHeader {
    pub fn new(payload_size: u32, frame_index: u64, timestamp_ns: i64) -> Self {
        Self {
            magic: FRAME_MAGIC,
            payload_size,
            frame_index,
            timestamp_ns,
        }
    }

    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut out = [0u8; FRAME_HEADER_SIZE];
        let mut buf = &mut out[..];
        buf.put_slice(&self.magic);
        buf.put_u32_le(self.payload_size);
        buf.put_u64_le(self.frame_index);
        buf.put_i64_le(self.timestamp_ns);
        out
    }

    pub fn decode(raw: &[u8; FRAME_HEADER_SIZE]) -> Self {
        let mut buf = &raw[..];
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        Self {
            magic,
            payload_size: buf.get_u32_le(),
            frame_index: buf.get_u64_le(),
            timestamp_ns: buf.get_i64_le(),
        }
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic == FRAME_MAGIC
    }
}

/// ASCII, truncated to 15 bytes, NUL padded to 16
fn encode_serial(serial: &str) -> [u8; SERIAL_FIELD_SIZE] {
    let mut field = [0u8; SERIAL_FIELD_SIZE];
    for (dst, ch) in field.iter_mut().zip(serial.chars().take(MAX_SERIAL_LEN)) {
        *dst = if ch.is_ascii() { ch as u8 } else { b'?' };
    }
    field
}

fn decode_serial(field: &[u8; SERIAL_FIELD_SIZE]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_header_layout() {
        let header = FileHeader::new("40123456", -5, 1920, 1080, PixelFormat::BayerGr16);
        let raw = header.encode();
        assert_eq!(&raw[0..4], b"SRAW");
        assert_eq!(&raw[4..8], &1u32.to_le_bytes());
        assert_eq!(&raw[8..16], b"40123456");
        assert!(raw[16..24].iter().all(|&b| b == 0));
        assert_eq!(&raw[24..32], &(-5i64).to_le_bytes());
        assert_eq!(&raw[32..34], &1920u16.to_le_bytes());
        assert_eq!(&raw[34..36], &1080u16.to_le_bytes());
        assert_eq!(&raw[36..38], &1u16.to_le_bytes());
        assert_eq!(&raw[38..40], &[0, 0]);
        assert_eq!(FileHeader::decode(&raw), header);
    }

    #[test]
    fn test_long_serial_truncated() {
        let header = FileHeader::new("0123456789abcdefXYZ", 0, 1, 1, PixelFormat::BayerGr8);
        let raw = header.encode();
        assert_eq!(raw[23], 0);
        let decoded = FileHeader::decode(&raw);
        assert_eq!(decoded.camera_serial, "0123456789abcde");
    }

    #[test]
    fn test_frame_header_layout() {
        let header = FrameHeader::new(2_073_600, 7, 1_700_000_000_000_000_123);
        let raw = header.encode();
        assert_eq!(&raw[0..4], b"FRAM");
        assert_eq!(&raw[4..8], &2_073_600u32.to_le_bytes());
        assert_eq!(&raw[8..16], &7u64.to_le_bytes());
        assert_eq!(FrameHeader::decode(&raw), header);
    }

    #[test]
    fn test_expected_payload_size() {
        let mut header = FileHeader::new("1", 0, 1920, 1080, PixelFormat::BayerGr8);
        assert_eq!(header.expected_payload_size(), Some(2_073_600));
        header.pixel_format = 42;
        assert_eq!(header.expected_payload_size(), None);
        assert!(matches!(
            header.check(),
            Err(SrawError::UnknownPixelFormat { code: 42 })
        ));
        header.magic = *b"XRAW";
        assert!(matches!(header.check(), Err(SrawError::BadMagic { .. })));
    }
}
