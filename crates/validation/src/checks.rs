//! Per-device recording checks
//!
//! | id | check |
//! |----|-------|
//! | V1 | file header magic |
//! | V2 | format version |
//! | V3 | every frame header magic, no truncated frames |
//! | V4 | payload size matches width x height x bytes per pixel |
//! | V5 | frame_index is exactly `0..N-1` across the split sequence |
//! | V6 | timestamp_ns strictly increasing across the recording |
//! | V7 | metadata log row count equals frame count |
//! | V8 | metadata log timestamps equal frame timestamps |
//!
//! Every check runs regardless of the outcome of the others.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sraw::{read_metadata_log, FileHeader, FrameInfo, SrawReader, FORMAT_VERSION};
use tracing::{debug, info, instrument, warn};

use crate::discover::{DeviceFiles, SessionFiles};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum CheckId {
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
    V7,
    V8,
}

impl CheckId {
    pub const ALL: [CheckId; 8] = [
        Self::V1,
        Self::V2,
        Self::V3,
        Self::V4,
        Self::V5,
        Self::V6,
        Self::V7,
        Self::V8,
    ];

    pub fn description(self) -> &'static str {
        match self {
            Self::V1 => "file magic",
            Self::V2 => "format version",
            Self::V3 => "frame magic",
            Self::V4 => "payload size",
            Self::V5 => "frame index continuity",
            Self::V6 => "timestamp monotonicity",
            Self::V7 => "metadata row count",
            Self::V8 => "metadata timestamps",
        }
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Pass,
    Fail,
    /// Input for the check is absent
    Skip,
    /// Input for the check could not be read
    Error,
}

impl CheckStatus {
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Fail | Self::Error)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub id: CheckId,
    pub status: CheckStatus,
    pub detail: String,
    /// First offending frame, when the check points at one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_index: Option<u64>,
}

impl CheckResult {
    fn pass(id: CheckId, detail: impl Into<String>) -> Self {
        Self::new(id, CheckStatus::Pass, detail)
    }

    fn fail(id: CheckId, detail: impl Into<String>) -> Self {
        Self::new(id, CheckStatus::Fail, detail)
    }

    fn skip(id: CheckId, detail: impl Into<String>) -> Self {
        Self::new(id, CheckStatus::Skip, detail)
    }

    fn error(id: CheckId, detail: impl Into<String>) -> Self {
        Self::new(id, CheckStatus::Error, detail)
    }

    fn new(id: CheckId, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            id,
            status,
            detail: detail.into(),
            frame_index: None,
        }
    }

    fn at(mut self, frame_index: u64) -> Self {
        self.frame_index = Some(frame_index);
        self
    }
}

/// Check results for one device
#[derive(Debug, Clone, Serialize)]
pub struct DeviceValidation {
    pub serial: String,
    pub raw_files: usize,
    pub frames: u64,
    pub metadata_rows: Option<u64>,
    pub checks: Vec<CheckResult>,
}

impl DeviceValidation {
    pub fn passed(&self) -> bool {
        !self.checks.iter().any(|c| c.status.is_failure())
    }

    pub fn check(&self, id: CheckId) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.id == id)
    }

    pub fn failures(&self) -> usize {
        self.checks.iter().filter(|c| c.status.is_failure()).count()
    }
}

/// Check results for a whole session directory
#[derive(Debug, Clone, Serialize)]
pub struct SessionValidation {
    pub session_dir: PathBuf,
    pub devices: Vec<DeviceValidation>,
    pub passed: bool,
}

impl SessionValidation {
    pub fn device(&self, serial: &str) -> Option<&DeviceValidation> {
        self.devices.iter().find(|d| d.serial == serial)
    }
}

/// Run all checks for every device of a discovered session
#[instrument(name = "validation_validate_session", skip(session), fields(dir = %session.dir.display()))]
pub fn validate_session(session: &SessionFiles) -> SessionValidation {
    let devices: Vec<_> = session.devices.values().map(validate_device).collect();
    let passed = !devices.is_empty() && devices.iter().all(DeviceValidation::passed);
    info!(devices = devices.len(), passed, "session validated");
    SessionValidation {
        session_dir: session.dir.clone(),
        devices,
        passed,
    }
}

/// Run all checks for one device
pub fn validate_device(files: &DeviceFiles) -> DeviceValidation {
    let mut result = DeviceValidation {
        serial: files.serial.clone(),
        raw_files: files.raw_files.len(),
        frames: 0,
        metadata_rows: None,
        checks: Vec::with_capacity(CheckId::ALL.len()),
    };

    if files.raw_files.is_empty() {
        result.checks = CheckId::ALL
            .iter()
            .map(|&id| CheckResult::skip(id, "no raw files"))
            .collect();
        return result;
    }

    let scans: Vec<FileScan> = files.raw_files.iter().map(|p| FileScan::run(p)).collect();
    let frames: Vec<FrameInfo> = scans.iter().flat_map(|s| s.frames.iter().copied()).collect();
    result.frames = frames.len() as u64;

    result.checks.push(check_file_magic(&scans));
    result.checks.push(check_version(&scans));
    result.checks.push(check_frame_magic(&scans, &frames));
    result.checks.push(check_payload_size(&scans, &frames));
    result.checks.push(check_index_continuity(&frames));
    result.checks.push(check_monotonic(&frames));

    match files.metadata_log.as_deref() {
        None => {
            result.checks.push(CheckResult::skip(CheckId::V7, "no metadata log"));
            result.checks.push(CheckResult::skip(CheckId::V8, "no metadata log"));
        }
        Some(path) => match read_metadata_log(path) {
            Ok(rows) => {
                let timestamps: Vec<i64> = rows.iter().map(|r| r.timestamp_ns).collect();
                result.metadata_rows = Some(timestamps.len() as u64);
                result.checks.push(check_row_count(timestamps.len(), frames.len()));
                result.checks.push(check_log_timestamps(&timestamps, &frames));
            }
            Err(e) => {
                let detail = format!("{}: {e}", file_name(path));
                result.checks.push(CheckResult::error(CheckId::V7, detail.clone()));
                result.checks.push(CheckResult::error(CheckId::V8, detail));
            }
        },
    }

    if result.passed() {
        debug!(serial = %result.serial, frames = result.frames, "device passed");
    } else {
        warn!(serial = %result.serial, failures = result.failures(), "device failed validation");
    }
    result
}

/// Headers of one raw file
struct FileScan {
    name: String,
    header: Option<FileHeader>,
    frames: Vec<FrameInfo>,
    /// Failure that ended the scan early
    error: Option<String>,
}

impl FileScan {
    fn run(path: &Path) -> Self {
        let mut scan = Self {
            name: file_name(path),
            header: None,
            frames: Vec::new(),
            error: None,
        };
        if let Err(e) = scan.read(path) {
            scan.error = Some(e.to_string());
        }
        scan
    }

    fn read(&mut self, path: &Path) -> sraw::Result<()> {
        let mut reader = SrawReader::open(path)?;
        self.header = Some(reader.read_file_header()?);
        for info in reader.iter_frames()? {
            self.frames.push(info?);
        }
        Ok(())
    }

    /// Scan failed after the header was read
    fn truncated(&self) -> Option<&str> {
        self.header.as_ref().and(self.error.as_deref())
    }
}

fn check_file_magic(scans: &[FileScan]) -> CheckResult {
    header_check(CheckId::V1, scans, |h| {
        (!h.has_valid_magic()).then(|| format!("magic {:?}", String::from_utf8_lossy(&h.magic)))
    })
}

fn check_version(scans: &[FileScan]) -> CheckResult {
    header_check(CheckId::V2, scans, |h| {
        (h.version != FORMAT_VERSION)
            .then(|| format!("version {} (expected {FORMAT_VERSION})", h.version))
    })
}

/// Shared shape of V1/V2: any bad header fails, otherwise unreadable files error
fn header_check(
    id: CheckId,
    scans: &[FileScan],
    bad: impl Fn(&FileHeader) -> Option<String>,
) -> CheckResult {
    let mut failures = Vec::new();
    let mut unreadable = Vec::new();
    for scan in scans {
        match &scan.header {
            Some(header) => {
                if let Some(why) = bad(header) {
                    failures.push(format!("{}: {why}", scan.name));
                }
            }
            None => unreadable.push(format!(
                "{}: {}",
                scan.name,
                scan.error.as_deref().unwrap_or("unreadable")
            )),
        }
    }

    if !failures.is_empty() {
        CheckResult::fail(id, failures.join("; "))
    } else if !unreadable.is_empty() {
        CheckResult::error(id, unreadable.join("; "))
    } else {
        CheckResult::pass(id, format!("{} file(s)", scans.len()))
    }
}

fn check_frame_magic(scans: &[FileScan], frames: &[FrameInfo]) -> CheckResult {
    let truncated: Vec<String> = scans
        .iter()
        .filter_map(|s| s.truncated().map(|e| format!("{}: {e}", s.name)))
        .collect();
    let bad: Vec<&FrameInfo> = frames.iter().filter(|f| !f.magic_ok).collect();

    match bad.first() {
        Some(first) => {
            let mut detail = format!(
                "bad frame magic at frame_index={}{}",
                first.frame_index,
                more(bad.len())
            );
            if !truncated.is_empty() {
                detail.push_str("; ");
                detail.push_str(&truncated.join("; "));
            }
            CheckResult::fail(CheckId::V3, detail).at(first.frame_index)
        }
        None if !truncated.is_empty() => CheckResult::fail(CheckId::V3, truncated.join("; ")),
        None => CheckResult::pass(CheckId::V3, format!("{} frame(s)", frames.len())),
    }
}

fn check_payload_size(scans: &[FileScan], frames: &[FrameInfo]) -> CheckResult {
    let Some(header) = scans.iter().find_map(|s| s.header.as_ref()) else {
        return CheckResult::error(CheckId::V4, "no readable file header");
    };
    let Some(expected) = header.expected_payload_size() else {
        return CheckResult::fail(
            CheckId::V4,
            format!("unknown pixel format code {}", header.pixel_format),
        );
    };

    let bad: Vec<&FrameInfo> = frames
        .iter()
        .filter(|f| f.payload_size as u64 != expected)
        .collect();
    match bad.first() {
        Some(first) => CheckResult::fail(
            CheckId::V4,
            format!(
                "frame_index={} payload_size={} (expected {expected}){}",
                first.frame_index,
                first.payload_size,
                more(bad.len())
            ),
        )
        .at(first.frame_index),
        None => CheckResult::pass(
            CheckId::V4,
            format!(
                "{expected} bytes ({}x{} {})",
                header.width,
                header.height,
                header
                    .pixel_format()
                    .map(|pf| pf.to_string())
                    .unwrap_or_default()
            ),
        ),
    }
}

fn check_index_continuity(frames: &[FrameInfo]) -> CheckResult {
    let gaps: Vec<(usize, u64)> = frames
        .iter()
        .enumerate()
        .filter(|(pos, f)| f.frame_index != *pos as u64)
        .map(|(pos, f)| (pos, f.frame_index))
        .collect();
    match gaps.first() {
        Some(&(pos, found)) => CheckResult::fail(
            CheckId::V5,
            format!(
                "expected frame_index={pos}, found {found}{}",
                more(gaps.len())
            ),
        )
        .at(found),
        None => CheckResult::pass(
            CheckId::V5,
            format!("0..{}", frames.len().saturating_sub(1)),
        ),
    }
}

fn check_monotonic(frames: &[FrameInfo]) -> CheckResult {
    let first_bad = frames
        .windows(2)
        .find(|pair| pair[1].timestamp_ns <= pair[0].timestamp_ns);
    match first_bad {
        Some(pair) => CheckResult::fail(
            CheckId::V6,
            format!(
                "frame_index={} timestamp_ns={} <= previous {}",
                pair[1].frame_index, pair[1].timestamp_ns, pair[0].timestamp_ns
            ),
        )
        .at(pair[1].frame_index),
        None => CheckResult::pass(CheckId::V6, "strictly increasing"),
    }
}

fn check_row_count(rows: usize, frames: usize) -> CheckResult {
    if rows == frames {
        CheckResult::pass(CheckId::V7, format!("{rows} row(s)"))
    } else {
        CheckResult::fail(CheckId::V7, format!("{rows} row(s) for {frames} frame(s)"))
    }
}

fn check_log_timestamps(timestamps: &[i64], frames: &[FrameInfo]) -> CheckResult {
    let mismatches: Vec<usize> = timestamps
        .iter()
        .zip(frames)
        .enumerate()
        .filter(|(_, (ts, frame))| **ts != frame.timestamp_ns)
        .map(|(pos, _)| pos)
        .collect();
    let compared = timestamps.len().min(frames.len());

    match mismatches.first() {
        Some(&pos) => CheckResult::fail(
            CheckId::V8,
            format!(
                "row {pos}: log {} != frame {}{}",
                timestamps[pos],
                frames[pos].timestamp_ns,
                more(mismatches.len())
            ),
        )
        .at(frames[pos].frame_index),
        None => CheckResult::pass(CheckId::V8, format!("{compared} row(s) compared")),
    }
}

fn more(total: usize) -> String {
    if total > 1 {
        format!(" (+{} more)", total - 1)
    } else {
        String::new()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
