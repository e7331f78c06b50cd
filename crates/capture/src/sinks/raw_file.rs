//! SrawSink - frames into split SRAW files

use std::path::PathBuf;

use contracts::FrameRecord;
use sraw::{RecordingLayout, RecordingWriter};

use super::FrameSink;
use crate::error::Result;

pub struct SrawSink {
    name: String,
    writer: RecordingWriter,
}

impl SrawSink {
    pub fn new(layout: RecordingLayout) -> Self {
        Self {
            name: format!("sraw-{}", layout.serial),
            writer: RecordingWriter::new(layout),
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.writer.frames_written()
    }
}

impl FrameSink for SrawSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, frame: &FrameRecord) -> Result<()> {
        self.writer.write_frame(&frame.payload, frame.timestamp_ns)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.writer.finish()?;
        Ok(())
    }

    fn files(&self) -> Vec<PathBuf> {
        self.writer.files().to_vec()
    }
}
