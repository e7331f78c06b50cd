//! TranscoderSink - raw payload bytes into an external encoder

use std::path::PathBuf;

use contracts::{ByteSink, FrameRecord};

use super::FrameSink;
use crate::error::Result;

pub struct TranscoderSink {
    inner: Box<dyn ByteSink>,
    output: PathBuf,
}

impl TranscoderSink {
    pub fn new(inner: Box<dyn ByteSink>, output: PathBuf) -> Self {
        Self { inner, output }
    }
}

impl FrameSink for TranscoderSink {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn write(&mut self, frame: &FrameRecord) -> Result<()> {
        self.inner.write(&frame.payload)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        self.inner.is_alive()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()?;
        Ok(())
    }

    fn files(&self) -> Vec<PathBuf> {
        if self.output.exists() {
            vec![self.output.clone()]
        } else {
            Vec::new()
        }
    }
}
