//! Single-file SRAW writer

use std::io::Write;

use crate::error::{Result, SrawError};
use crate::format::{FileHeader, FrameHeader, FILE_HEADER_SIZE, FRAME_HEADER_SIZE};

/// Writes one raw file: a file header, then frames.
pub struct SrawWriter<W: Write> {
    inner: W,
    header_written: bool,
    frames_written: u64,
    bytes_written: u64,
}

impl<W: Write> SrawWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            header_written: false,
            frames_written: 0,
            bytes_written: 0,
        }
    }

    pub fn write_file_header(&mut self, header: &FileHeader) -> Result<()> {
        if self.header_written {
            return Err(SrawError::HeaderAlreadyWritten);
        }
        self.inner.write_all(&header.encode())?;
        self.header_written = true;
        self.bytes_written += FILE_HEADER_SIZE as u64;
        Ok(())
    }

    pub fn write_frame(&mut self, payload: &[u8], frame_index: u64, timestamp_ns: i64) -> Result<()> {
        if !self.header_written {
            return Err(SrawError::MissingFileHeader);
        }
        let size = u32::try_from(payload.len())
            .map_err(|_| SrawError::PayloadTooLarge { size: payload.len() })?;
        let header = FrameHeader::new(size, frame_index, timestamp_ns);
        self.inner.write_all(&header.encode())?;
        self.inner.write_all(payload)?;
        self.frames_written += 1;
        self.bytes_written += (FRAME_HEADER_SIZE + payload.len()) as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flush and hand back the underlying writer
    pub fn into_inner(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::PixelFormat;

    #[test]
    fn test_frame_before_header_rejected() {
        let mut w = SrawWriter::new(Vec::new());
        assert!(matches!(
            w.write_frame(&[1, 2], 0, 0),
            Err(SrawError::MissingFileHeader)
        ));
    }

    #[test]
    fn test_byte_layout() {
        let mut w = SrawWriter::new(Vec::new());
        w.write_file_header(&FileHeader::new("9", 100, 2, 2, PixelFormat::BayerGr8))
            .unwrap();
        w.write_frame(&[1, 2, 3, 4], 0, 100).unwrap();
        w.write_frame(&[5, 6, 7, 8], 1, 200).unwrap();
        assert_eq!(w.frames_written(), 2);
        assert_eq!(w.bytes_written(), 40 + 2 * 28);

        let bytes = w.into_inner().unwrap();
        assert_eq!(bytes.len(), 96);
        assert_eq!(&bytes[40..44], b"FRAM");
        assert_eq!(&bytes[64..68], &[1, 2, 3, 4]);
        assert_eq!(&bytes[92..96], &[5, 6, 7, 8]);
    }

    #[test]
    fn test_second_header_rejected() {
        let mut w = SrawWriter::new(Vec::new());
        let h = FileHeader::new("9", 0, 1, 1, PixelFormat::BayerGr8);
        w.write_file_header(&h).unwrap();
        assert!(w.write_file_header(&h).is_err());
    }
}
