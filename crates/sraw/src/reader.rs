//! SRAW reader
//!
//! Frames are scanned header by header; payloads are only read on demand.
//! A clean end of stream ends iteration, a stream that stops inside a
//! header or payload yields an error instead.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use serde::Serialize;

use crate::error::{Result, SrawError};
use crate::format::{FileHeader, FrameHeader, FILE_HEADER_SIZE, FRAME_HEADER_SIZE};

/// Location and header fields of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameInfo {
    pub frame_index: u64,
    pub timestamp_ns: i64,
    pub payload_size: u32,
    /// Byte offset of the frame header
    pub offset: u64,
    pub magic_ok: bool,
}

impl FrameInfo {
    pub fn payload_offset(&self) -> u64 {
        self.offset + FRAME_HEADER_SIZE as u64
    }
}

pub struct SrawReader<R> {
    inner: R,
    len: u64,
}

impl SrawReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> SrawReader<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        Ok(Self { inner, len })
    }

    /// Total stream length in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn read_file_header(&mut self) -> Result<FileHeader> {
        if self.len < FILE_HEADER_SIZE as u64 {
            return Err(SrawError::FileTooSmall {
                got: self.len,
                need: FILE_HEADER_SIZE as u64,
            });
        }
        let mut raw = [0u8; FILE_HEADER_SIZE];
        self.inner.seek(SeekFrom::Start(0))?;
        self.inner.read_exact(&mut raw)?;
        Ok(FileHeader::decode(&raw))
    }

    /// Iterate frame headers from the start of the frame area.
    ///
    /// Each call restarts from the first frame.
    pub fn iter_frames(&mut self) -> Result<FrameIter<'_, R>> {
        if self.len < FILE_HEADER_SIZE as u64 {
            return Err(SrawError::FileTooSmall {
                got: self.len,
                need: FILE_HEADER_SIZE as u64,
            });
        }
        self.inner.seek(SeekFrom::Start(FILE_HEADER_SIZE as u64))?;
        Ok(FrameIter {
            reader: self,
            offset: FILE_HEADER_SIZE as u64,
            done: false,
        })
    }

    /// Read the payload of a previously scanned frame
    pub fn read_payload(&mut self, info: &FrameInfo) -> Result<Vec<u8>> {
        let mut payload = vec![0u8; info.payload_size as usize];
        self.inner.seek(SeekFrom::Start(info.payload_offset()))?;
        let got = read_full(&mut self.inner, &mut payload)?;
        if got < payload.len() {
            return Err(SrawError::TruncatedPayload {
                frame_index: info.frame_index,
                got: got as u64,
                expected: payload.len() as u64,
            });
        }
        Ok(payload)
    }

    /// Header and payload of the frame at `position` (0-based, in file order)
    pub fn read_frame(&mut self, position: usize) -> Result<(FrameInfo, Vec<u8>)> {
        let mut count = 0;
        let mut found = None;
        for info in self.iter_frames()? {
            let info = info?;
            if count == position {
                found = Some(info);
                break;
            }
            count += 1;
        }
        match found {
            Some(info) => {
                let payload = self.read_payload(&info)?;
                Ok((info, payload))
            }
            None => Err(SrawError::FrameOutOfRange { position, count }),
        }
    }
}

/// Iterator over frame headers; see `SrawReader::iter_frames`
pub struct FrameIter<'a, R> {
    reader: &'a mut SrawReader<R>,
    offset: u64,
    done: bool,
}

impl<R: Read + Seek> FrameIter<'_, R> {
    fn next_frame(&mut self) -> Result<Option<FrameInfo>> {
        let mut raw = [0u8; FRAME_HEADER_SIZE];
        let got = read_full(&mut self.reader.inner, &mut raw)?;
        if got == 0 {
            return Ok(None);
        }
        if got < FRAME_HEADER_SIZE {
            return Err(SrawError::TruncatedFrameHeader {
                offset: self.offset,
                got,
                need: FRAME_HEADER_SIZE,
            });
        }

        let header = FrameHeader::decode(&raw);
        let payload_start = self.offset + FRAME_HEADER_SIZE as u64;
        let end = payload_start + header.payload_size as u64;
        if end > self.reader.len {
            return Err(SrawError::TruncatedPayload {
                frame_index: header.frame_index,
                got: self.reader.len.saturating_sub(payload_start),
                expected: header.payload_size as u64,
            });
        }
        self.reader.inner.seek(SeekFrom::Start(end))?;

        let info = FrameInfo {
            frame_index: header.frame_index,
            timestamp_ns: header.timestamp_ns,
            payload_size: header.payload_size,
            offset: self.offset,
            magic_ok: header.has_valid_magic(),
        };
        self.offset = end;
        Ok(Some(info))
    }
}

impl<R: Read + Seek> Iterator for FrameIter<'_, R> {
    type Item = Result<FrameInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_frame() {
            Ok(Some(info)) => Some(Ok(info)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Read until `buf` is full or the stream ends; returns bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
