//! Output sinks
//!
//! Contains SrawSink (split raw files) and TranscoderSink (payload bytes
//! piped into an external encoder through a `ByteSink`).

mod process;
mod raw_file;
mod transcoder;

use std::path::{Path, PathBuf};

use contracts::{DeviceConfig, FrameRecord, OutputFormat, SessionConfig, TranscoderConfig};
use sraw::{transcoded_file_name, RecordingLayout};
use tracing::{info, instrument};

use crate::error::Result;

pub use self::process::ProcessByteSink;
pub use self::raw_file::SrawSink;
pub use self::transcoder::TranscoderSink;

/// Destination of one device's frame payloads.
///
/// Owned by exactly one capture worker.
pub trait FrameSink: Send {
    fn name(&self) -> &str;

    fn write(&mut self, frame: &FrameRecord) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    /// False once the sink can no longer accept frames
    fn is_alive(&mut self) -> bool {
        true
    }

    /// Flush and release; safe to call more than once
    fn close(&mut self) -> Result<()>;

    /// Files produced so far
    fn files(&self) -> Vec<PathBuf>;
}

/// Open the configured sink for one device inside `session_dir`
#[instrument(
    name = "capture_open_sink",
    skip(session, transcoder, device),
    fields(device = %device.serial, format = ?session.output_format)
)]
pub fn open_sink(
    session_dir: &Path,
    session: &SessionConfig,
    transcoder: &TranscoderConfig,
    device: &DeviceConfig,
) -> Result<Box<dyn FrameSink>> {
    match session.output_format {
        OutputFormat::Raw => {
            let sink = SrawSink::new(RecordingLayout {
                dir: session_dir.to_path_buf(),
                serial: device.serial.clone(),
                width: device.width,
                height: device.height,
                pixel_format: device.pixel_format,
                frames_per_file: session.frames_per_file,
            });
            Ok(Box::new(sink))
        }
        OutputFormat::Transcoded => {
            let output = session_dir.join(transcoded_file_name(&device.serial));
            let args = transcoder.render_args(
                device.width,
                device.height,
                device.trigger_interval_fps,
                &output,
            );
            let process = ProcessByteSink::spawn(
                format!("transcoder-{}", device.serial),
                &transcoder.program,
                &args,
                transcoder.close_timeout(),
            )?;
            info!(program = %transcoder.program, output = %output.display(), "transcoder launched");
            Ok(Box::new(TranscoderSink::new(Box::new(process), output)))
        }
    }
}
