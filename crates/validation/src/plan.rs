//! Constant-rate frame plan for re-encoding a raw recording
//!
//! Output frame `k` shows the last recorded frame whose timestamp is at or
//! before `t_first + k * 1e9 / fps`. The plan ends with one extra frame
//! once that instant passes the last timestamp.

use std::fmt;
use std::path::{Path, PathBuf};

use contracts::{ByteSink, PixelFormat};
use serde::Serialize;
use sraw::{transcoded_file_name, FileHeader, FrameInfo, SrawReader};
use tracing::{debug, info, instrument};

use crate::discover::SessionFiles;
use crate::error::{Result, ValidationError};

/// Mismatch ratio under which deviations count as jitter
const JITTER_MISMATCH_RATIO: f64 = 0.02;
/// Relative rate difference under which the rates count as equal
const SIMILAR_FPS_RATIO: f64 = 0.10;

/// A frame and the raw file holding it
#[derive(Debug, Clone, Serialize)]
pub struct FrameLocation {
    pub path: PathBuf,
    pub info: FrameInfo,
}

/// Scan every file of a split sequence; returns the first file header
pub fn scan_locations(raw_files: &[PathBuf]) -> Result<(FileHeader, Vec<FrameLocation>)> {
    let mut first_header = None;
    let mut locations = Vec::new();
    for path in raw_files {
        let mut reader = SrawReader::open(path)?;
        let header = reader.read_file_header()?;
        if first_header.is_none() {
            first_header = Some(header);
        }
        for info in reader.iter_frames()? {
            locations.push(FrameLocation {
                path: path.clone(),
                info: info?,
            });
        }
    }
    let header = first_header.ok_or_else(|| ValidationError::invalid("raw_files", "empty"))?;
    Ok((header, locations))
}

/// Indices into `timestamps` for each output frame
pub fn build_frame_plan(timestamps: &[i64], fps: f64) -> Vec<usize> {
    let (Some(&t_first), Some(&t_last)) = (timestamps.first(), timestamps.last()) else {
        return Vec::new();
    };
    if !(fps.is_finite() && fps > 0.0) {
        return Vec::new();
    }
    let interval_ns = 1e9 / fps;

    let mut plan = Vec::new();
    let mut raw_idx = 0;
    for k in 0u64.. {
        let t_target = t_first.saturating_add((k as f64 * interval_ns).round() as i64);
        while raw_idx + 1 < timestamps.len() && timestamps[raw_idx + 1] <= t_target {
            raw_idx += 1;
        }
        plan.push(raw_idx);
        if t_target > t_last {
            break;
        }
    }
    plan
}

/// How the output rate relates to the recorded one
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "raw_fps", rename_all = "snake_case")]
pub enum PlanNote {
    ExactMatch,
    TimestampJitter,
    Downsampled(f64),
    Upsampled(f64),
    SignificantMismatch,
}

impl fmt::Display for PlanNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExactMatch => f.write_str("exact match"),
            Self::TimestampJitter => f.write_str("timestamp jitter"),
            Self::Downsampled(fps) => write!(f, "downsampled from {fps:.1} fps"),
            Self::Upsampled(fps) => write!(f, "upsampled from {fps:.1} fps"),
            Self::SignificantMismatch => f.write_str("WARNING: significant mismatch"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanStats {
    pub raw_frames: usize,
    pub output_frames: usize,
    /// Output frames repeating the previous raw frame
    pub duplicated: usize,
    /// Raw frames never shown
    pub skipped: usize,
    pub time_span_s: f64,
    pub raw_fps: f64,
    pub output_fps: f64,
    pub note: PlanNote,
}

impl PlanStats {
    pub fn new(timestamps: &[i64], plan: &[usize], output_fps: f64) -> Self {
        let time_span_s = match (timestamps.first(), timestamps.last()) {
            (Some(first), Some(last)) => (last - first) as f64 / 1e9,
            _ => 0.0,
        };
        let raw_fps = if time_span_s > 0.0 {
            (timestamps.len() - 1) as f64 / time_span_s
        } else {
            0.0
        };

        // plans are non-decreasing, so distinct entries are the run starts
        let unique = plan
            .iter()
            .enumerate()
            .filter(|(i, idx)| *i == 0 || plan[i - 1] != **idx)
            .count();
        let duplicated = plan.len() - unique;
        let skipped = timestamps.len() - unique;

        Self {
            raw_frames: timestamps.len(),
            output_frames: plan.len(),
            duplicated,
            skipped,
            time_span_s,
            raw_fps,
            output_fps,
            note: classify(raw_fps, output_fps, duplicated, skipped, plan.len()),
        }
    }
}

fn classify(
    raw_fps: f64,
    output_fps: f64,
    duplicated: usize,
    skipped: usize,
    output_frames: usize,
) -> PlanNote {
    if duplicated == 0 && skipped == 0 {
        return PlanNote::ExactMatch;
    }
    let mismatch_ratio = if output_frames > 0 {
        (duplicated + skipped) as f64 / output_frames as f64
    } else {
        0.0
    };
    let fps_similar = output_fps > 0.0 && (raw_fps - output_fps).abs() / output_fps < SIMILAR_FPS_RATIO;

    if fps_similar && mismatch_ratio < JITTER_MISMATCH_RATIO {
        PlanNote::TimestampJitter
    } else if raw_fps > output_fps && skipped > duplicated {
        PlanNote::Downsampled(raw_fps)
    } else if raw_fps < output_fps && duplicated > skipped {
        PlanNote::Upsampled(raw_fps)
    } else if mismatch_ratio >= JITTER_MISMATCH_RATIO {
        PlanNote::SignificantMismatch
    } else {
        PlanNote::TimestampJitter
    }
}

/// Everything needed to re-encode one device
#[derive(Debug, Clone, Serialize)]
pub struct EncodeJob {
    pub serial: String,
    pub header: FileHeader,
    pub raw_files: Vec<PathBuf>,
    #[serde(skip)]
    pub locations: Vec<FrameLocation>,
    #[serde(skip)]
    pub plan: Vec<usize>,
    pub stats: PlanStats,
    pub output: PathBuf,
}

impl EncodeJob {
    /// Scan a device's raw files and build its frame plan.
    ///
    /// Fails if the output file already exists.
    #[instrument(name = "validation_prepare_encode", skip(session), fields(device = %serial))]
    pub fn prepare(session: &SessionFiles, serial: &str, fps: f64) -> Result<Self> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(ValidationError::invalid("fps", format!("must be > 0, got {fps}")));
        }
        let files = session
            .device(serial)
            .filter(|d| !d.raw_files.is_empty())
            .ok_or_else(|| ValidationError::NoRawFiles {
                serial: serial.to_string(),
            })?;

        let output = session.dir.join(transcoded_file_name(serial));
        if output.exists() {
            return Err(ValidationError::OutputExists { path: output });
        }

        let (header, locations) = scan_locations(&files.raw_files)?;
        if header.pixel_format() != Some(PixelFormat::BayerGr8) {
            return Err(ValidationError::UnsupportedPixelFormat {
                code: header.pixel_format,
            });
        }
        if locations.is_empty() {
            return Err(ValidationError::NoFrames {
                serial: serial.to_string(),
            });
        }

        let timestamps: Vec<i64> = locations.iter().map(|l| l.info.timestamp_ns).collect();
        let plan = build_frame_plan(&timestamps, fps);
        let stats = PlanStats::new(&timestamps, &plan, fps);
        info!(
            raw_frames = stats.raw_frames,
            output_frames = stats.output_frames,
            duplicated = stats.duplicated,
            skipped = stats.skipped,
            note = %stats.note,
            "frame plan built"
        );

        Ok(Self {
            serial: serial.to_string(),
            header,
            raw_files: files.raw_files.clone(),
            locations,
            plan,
            stats,
            output,
        })
    }

    /// Frame count per raw file, in sequence order
    pub fn frames_per_file(&self) -> Vec<(PathBuf, usize)> {
        let mut out: Vec<(PathBuf, usize)> = Vec::new();
        for loc in &self.locations {
            match out.last_mut() {
                Some((path, count)) if *path == loc.path => *count += 1,
                _ => out.push((loc.path.clone(), 1)),
            }
        }
        out
    }

    /// Pipe the planned payloads into `sink`; returns repeated writes
    pub fn encode(&self, sink: &mut dyn ByteSink) -> Result<u64> {
        encode_frames(&self.plan, &self.locations, sink)
    }
}

/// Write the payload of every planned frame to `sink`.
///
/// A repeated entry rewrites the previous payload without reading it again.
pub fn encode_frames(
    plan: &[usize],
    locations: &[FrameLocation],
    sink: &mut dyn ByteSink,
) -> Result<u64> {
    let mut reader: Option<(&Path, SrawReader<_>)> = None;
    let mut last: Option<(usize, Vec<u8>)> = None;
    let mut duplicated = 0;

    for &idx in plan {
        if let Some((last_idx, payload)) = &last {
            if *last_idx == idx {
                sink.write(payload)?;
                duplicated += 1;
                continue;
            }
        }

        let loc = locations
            .get(idx)
            .ok_or_else(|| ValidationError::invalid("plan", format!("index {idx} out of range")))?;
        let file = match &mut reader {
            Some((path, file)) if *path == loc.path.as_path() => file,
            slot => {
                debug!(path = %loc.path.display(), "reading payloads");
                &mut slot.insert((loc.path.as_path(), SrawReader::open(&loc.path)?)).1
            }
        };
        let payload = file.read_payload(&loc.info)?;
        sink.write(&payload)?;
        last = Some((idx, payload));
    }
    sink.flush()?;
    Ok(duplicated)
}
