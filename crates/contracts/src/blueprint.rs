//! SessionBlueprint - Config Loader output
//!
//! Describes a complete recording session: output policy, timing,
//! transcoder invocation and the participating devices.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

use crate::{PixelFormat, SyncRole};

/// Frames per raw file before a split
pub const DEFAULT_FRAMES_PER_FILE: u32 = 1000;
/// Per-device queue cap before ingestion pauses
pub const DEFAULT_QUEUE_CAPACITY: usize = 500;

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete session configuration blueprint
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SessionBlueprint {
    #[serde(default)]
    pub version: ConfigVersion,

    #[validate(nested)]
    pub session: SessionConfig,

    /// Only consulted for `OutputFormat::Transcoded`
    #[serde(default)]
    pub transcoder: TranscoderConfig,

    #[validate(length(min = 1, message = "at least one device is required"), nested)]
    pub devices: Vec<DeviceConfig>,
}

/// How frames are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Split SRAW files plus a metadata log
    #[default]
    Raw,
    /// Piped into an external encoder process plus a metadata log
    Transcoded,
}

/// Session timing and output policy
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SessionConfig {
    /// Parent directory; each session creates a timestamped child
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Seconds between scheduling and the first trigger
    #[validate(range(exclusive_min = 0.0, message = "must be > 0"))]
    pub start_delay_s: f64,

    /// Recording length in seconds, counted from the scheduled start
    #[validate(range(exclusive_min = 0.0, message = "must be > 0"))]
    pub duration_s: f64,

    #[serde(default)]
    pub output_format: OutputFormat,

    #[serde(default = "default_frames_per_file")]
    #[validate(range(min = 1, message = "must be >= 1"))]
    pub frames_per_file: u32,

    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1, message = "must be >= 1"))]
    pub queue_capacity: usize,

    /// Role every device must report before scheduling
    #[serde(default = "default_expected_role")]
    pub expected_role: SyncRole,

    #[serde(default = "default_role_timeout_s")]
    #[validate(range(exclusive_min = 0.0, message = "must be > 0"))]
    pub role_timeout_s: f64,

    #[serde(default = "default_role_poll_interval_s")]
    #[validate(range(exclusive_min = 0.0, message = "must be > 0"))]
    pub role_poll_interval_s: f64,

    /// Metadata log rows buffered between flushes
    #[serde(default = "default_metadata_flush_every")]
    #[validate(range(min = 1, message = "must be >= 1"))]
    pub metadata_flush_every: usize,

    /// Frames written between sink flushes
    #[serde(default = "default_sink_flush_every")]
    #[validate(range(min = 1, message = "must be >= 1"))]
    pub sink_flush_every: u64,
}

impl SessionConfig {
    pub fn role_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.role_timeout_s)
    }

    pub fn role_poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.role_poll_interval_s)
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("captures")
}

fn default_frames_per_file() -> u32 {
    DEFAULT_FRAMES_PER_FILE
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_expected_role() -> SyncRole {
    SyncRole::Follower
}

fn default_role_timeout_s() -> f64 {
    30.0
}

fn default_role_poll_interval_s() -> f64 {
    1.0
}

fn default_metadata_flush_every() -> usize {
    10
}

fn default_sink_flush_every() -> u64 {
    30
}

/// External encoder invocation.
///
/// `args` may contain `{width}`, `{height}`, `{fps}` and `{output}`
/// placeholders, substituted per device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    #[serde(default = "default_transcoder_program")]
    pub program: String,

    #[serde(default = "default_transcoder_args")]
    pub args: Vec<String>,

    /// Seconds to wait for the encoder to exit after its input is closed
    #[serde(default = "default_close_timeout_s")]
    pub close_timeout_s: f64,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: default_transcoder_program(),
            args: default_transcoder_args(),
            close_timeout_s: default_close_timeout_s(),
        }
    }
}

impl TranscoderConfig {
    /// Substitute placeholders for one device
    pub fn render_args(&self, width: u16, height: u16, fps: f64, output: &Path) -> Vec<String> {
        let output = output.display().to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{width}", &width.to_string())
                    .replace("{height}", &height.to_string())
                    .replace("{fps}", &format_fps(fps))
                    .replace("{output}", &output)
            })
            .collect()
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.close_timeout_s.max(0.0))
    }
}

fn format_fps(fps: f64) -> String {
    if fps.fract() == 0.0 {
        format!("{}", fps as i64)
    } else {
        format!("{fps}")
    }
}

fn default_transcoder_program() -> String {
    "ffmpeg".to_string()
}

fn default_transcoder_args() -> Vec<String> {
    [
        "-hide_banner",
        "-nostats",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "bayer_grbg8",
        "-s",
        "{width}x{height}",
        "-framerate",
        "{fps}",
        "-i",
        "-",
        "-vf",
        "format=yuv420p",
        "-c:v",
        "hevc_nvenc",
        "-b:v",
        "2200k",
        "-maxrate",
        "2200k",
        "-bufsize",
        "4400k",
        "-preset",
        "p4",
        "{output}",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_close_timeout_s() -> f64 {
    10.0
}

/// One participating camera
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DeviceConfig {
    /// Device serial; persisted into file headers (max 15 ASCII bytes)
    #[validate(length(min = 1, max = 15, message = "must be 1..=15 characters"))]
    pub serial: String,

    #[validate(range(min = 1, message = "must be >= 1"))]
    pub width: u16,

    #[validate(range(min = 1, message = "must be >= 1"))]
    pub height: u16,

    #[serde(default = "default_pixel_format")]
    pub pixel_format: PixelFormat,

    /// Sensor frame rate limit
    #[validate(range(exclusive_min = 0.0, message = "must be > 0"))]
    pub acquisition_fps: f64,

    /// Hardware trigger rate
    #[validate(range(exclusive_min = 0.0, message = "must be > 0"))]
    pub trigger_interval_fps: f64,
}

impl DeviceConfig {
    pub fn frame_size(&self) -> u64 {
        self.pixel_format.frame_size(self.width, self.height)
    }
}

fn default_pixel_format() -> PixelFormat {
    PixelFormat::BayerGr8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(serial: &str) -> DeviceConfig {
        DeviceConfig {
            serial: serial.to_string(),
            width: 64,
            height: 48,
            pixel_format: PixelFormat::BayerGr8,
            acquisition_fps: 30.0,
            trigger_interval_fps: 30.0,
        }
    }

    #[test]
    fn test_render_args() {
        let cfg = TranscoderConfig::default();
        let args = cfg.render_args(1920, 1080, 30.0, Path::new("out/cam1.mp4"));
        assert!(args.contains(&"1920x1080".to_string()));
        assert!(args.contains(&"30".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("out/cam1.mp4"));
    }

    #[test]
    fn test_device_validation() {
        assert!(device("40123456").validate().is_ok());
        assert!(device("").validate().is_err());
        assert!(device("0123456789abcdef").validate().is_err());

        let mut d = device("1");
        d.trigger_interval_fps = 0.0;
        assert!(d.validate().is_err());
    }
}
