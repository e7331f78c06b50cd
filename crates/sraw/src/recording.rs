//! Split-aware recording writer
//!
//! Frames are numbered continuously from 0. A new file is opened before
//! the first frame and before every frame whose index is a positive
//! multiple of `frames_per_file`; the new file is named after that index
//! and its header carries that frame's timestamp.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use contracts::PixelFormat;
use tracing::debug;

use crate::error::{Result, SrawError};
use crate::format::FileHeader;
use crate::naming::raw_file_name;
use crate::writer::SrawWriter;

const WRITE_BUFFER_SIZE: usize = 1 << 20;

/// Where and how a device's raw files are written
#[derive(Debug, Clone)]
pub struct RecordingLayout {
    pub dir: PathBuf,
    pub serial: String,
    pub width: u16,
    pub height: u16,
    pub pixel_format: PixelFormat,
    pub frames_per_file: u32,
}

pub struct RecordingWriter {
    layout: RecordingLayout,
    current: Option<SrawWriter<BufWriter<File>>>,
    next_index: u64,
    files: Vec<PathBuf>,
}

impl RecordingWriter {
    pub fn new(layout: RecordingLayout) -> Self {
        Self {
            layout,
            current: None,
            next_index: 0,
            files: Vec::new(),
        }
    }

    /// Append a frame; returns its recording index
    pub fn write_frame(&mut self, payload: &[u8], timestamp_ns: i64) -> Result<u64> {
        if self.needs_split() {
            self.open_next_file(timestamp_ns)?;
        }
        let index = self.next_index;
        let writer = self.current.as_mut().ok_or(SrawError::MissingFileHeader)?;
        writer.write_frame(payload, index, timestamp_ns)?;
        self.next_index += 1;
        Ok(index)
    }

    pub fn flush(&mut self) -> Result<()> {
        match self.current.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    /// Flush and close the open file
    pub fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.current.take() {
            writer.into_inner()?;
        }
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.next_index
    }

    /// Files created so far, in creation order
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    fn needs_split(&self) -> bool {
        let per_file = self.layout.frames_per_file as u64;
        self.current.is_none()
            || (per_file > 0 && self.next_index > 0 && self.next_index % per_file == 0)
    }

    fn open_next_file(&mut self, start_ns: i64) -> Result<()> {
        self.finish()?;

        let layout = &self.layout;
        let path = layout.dir.join(raw_file_name(&layout.serial, self.next_index));
        let file = File::create(&path)?;
        let mut writer = SrawWriter::new(BufWriter::with_capacity(WRITE_BUFFER_SIZE, file));
        writer.write_file_header(&FileHeader::new(
            &layout.serial,
            start_ns,
            layout.width,
            layout.height,
            layout.pixel_format,
        ))?;

        debug!(
            serial = %layout.serial,
            path = %path.display(),
            first_frame = self.next_index,
            "opened raw file"
        );
        self.current = Some(writer);
        self.files.push(path);
        Ok(())
    }
}

impl Drop for RecordingWriter {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::SrawReader;
    use crate::naming::parse_raw_file_name;

    fn layout(dir: &std::path::Path, frames_per_file: u32) -> RecordingLayout {
        RecordingLayout {
            dir: dir.to_path_buf(),
            serial: "40123456".into(),
            width: 4,
            height: 2,
            pixel_format: PixelFormat::BayerGr8,
            frames_per_file,
        }
    }

    #[test]
    fn test_split_into_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = RecordingWriter::new(layout(dir.path(), 1000));
        let payload = [0xABu8; 8];
        for i in 0..2500i64 {
            writer.write_frame(&payload, 5_000 + i * 33_333_333).unwrap();
        }
        writer.finish().unwrap();

        let files = writer.files().to_vec();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            [
                "cam40123456_000000.raw",
                "cam40123456_001000.raw",
                "cam40123456_002000.raw"
            ]
        );

        let mut indices = Vec::new();
        for path in &files {
            let (_, first) = parse_raw_file_name(&path.file_name().unwrap().to_string_lossy())
                .unwrap();
            let mut reader = SrawReader::open(path).unwrap();
            let header = reader.read_file_header().unwrap();
            assert_eq!(header.recording_start_ns, 5_000 + first as i64 * 33_333_333);
            for frame in reader.iter_frames().unwrap() {
                indices.push(frame.unwrap().frame_index);
            }
        }
        assert_eq!(indices, (0..2500).collect::<Vec<u64>>());
    }

    #[test]
    fn test_split_recording_reads_back_frame_for_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = RecordingWriter::new(layout(dir.path(), 7));

        let mut written = Vec::new();
        for i in 0..25u64 {
            let payload: Vec<u8> = (0..8).map(|j| (i * 8 + j) as u8).collect();
            // uneven spacing so a timestamp mix-up cannot go unnoticed
            let timestamp_ns = 1_000_000 + (i * i * 7 + i * 1_000) as i64;
            assert_eq!(writer.write_frame(&payload, timestamp_ns).unwrap(), i);
            written.push((i, timestamp_ns, payload));
        }
        writer.finish().unwrap();
        assert_eq!(writer.files().len(), 4);

        let mut read = Vec::new();
        for path in writer.files() {
            let mut reader = SrawReader::open(path).unwrap();
            let infos: Vec<_> = reader
                .iter_frames()
                .unwrap()
                .collect::<Result<Vec<_>>>()
                .unwrap();
            for info in infos {
                let payload = reader.read_payload(&info).unwrap();
                read.push((info.frame_index, info.timestamp_ns, payload));
            }
        }
        assert_eq!(read, written);
    }

    #[test]
    fn test_no_frames_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = RecordingWriter::new(layout(dir.path(), 10));
        writer.finish().unwrap();
        assert!(writer.files().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_exact_multiple_does_not_open_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = RecordingWriter::new(layout(dir.path(), 5));
        for i in 0..10 {
            writer.write_frame(&[0u8; 8], i).unwrap();
        }
        writer.finish().unwrap();
        assert_eq!(writer.files().len(), 2);
        assert_eq!(writer.frames_written(), 10);
    }
}
