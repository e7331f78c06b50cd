//! Header dump of a single raw file

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sraw::{FileHeader, FrameInfo, SrawReader};

use crate::error::Result;

/// Files with at most this many frames are always listed in full
pub const FULL_LISTING_LIMIT: usize = 20;
/// Frames listed at each end of a longer file
pub const EDGE_FRAMES: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct RawDump {
    pub path: PathBuf,
    pub file_size: u64,
    pub header: FileHeader,
    pub frames: Vec<FrameInfo>,
    /// Scan error that ended the frame listing early
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Read the file header and every frame header of `path`
pub fn dump_raw_file(path: &Path) -> Result<RawDump> {
    let mut reader = SrawReader::open(path)?;
    let header = reader.read_file_header()?;
    let mut frames = Vec::new();
    let mut error = None;
    for info in reader.iter_frames()? {
        match info {
            Ok(info) => frames.push(info),
            Err(e) => {
                error = Some(e.to_string());
                break;
            }
        }
    }
    Ok(RawDump {
        path: path.to_path_buf(),
        file_size: reader.len(),
        header,
        frames,
        error,
    })
}

impl RawDump {
    /// Human-readable listing; long files are elided in the middle unless `all`
    pub fn render(&self, all: bool) -> String {
        let h = &self.header;
        let mut out = String::new();
        let pixel_format = h
            .pixel_format()
            .map(|pf| pf.to_string())
            .unwrap_or_else(|| "Unknown".to_string());

        let _ = writeln!(out, "=== {} ({} bytes) ===", self.path.display(), self.file_size);
        let _ = writeln!(out, "  magic:              {}", String::from_utf8_lossy(&h.magic));
        let _ = writeln!(out, "  version:            {}", h.version);
        let _ = writeln!(out, "  camera_serial:      {}", h.camera_serial);
        let _ = writeln!(out, "  recording_start_ns: {}", h.recording_start_ns);
        let _ = writeln!(out, "  width x height:     {}x{}", h.width, h.height);
        let _ = writeln!(out, "  pixel_format:       {pixel_format} ({})", h.pixel_format);
        let _ = writeln!(out, "  frames:             {}", self.frames.len());

        let total = self.frames.len();
        if total > 0 {
            let _ = writeln!(out, "  {:>8}  {:>12}  {:>22}  {:>10}", "index", "offset", "timestamp_ns", "size");
            if all || total <= FULL_LISTING_LIMIT {
                self.frames.iter().for_each(|f| frame_row(&mut out, f));
            } else {
                self.frames[..EDGE_FRAMES].iter().for_each(|f| frame_row(&mut out, f));
                let _ = writeln!(out, "  ... ({} frames omitted) ...", total - 2 * EDGE_FRAMES);
                self.frames[total - EDGE_FRAMES..]
                    .iter()
                    .for_each(|f| frame_row(&mut out, f));
            }
        }
        if let Some(error) = &self.error {
            let _ = writeln!(out, "  error: {error}");
        }
        out
    }
}

fn frame_row(out: &mut String, f: &FrameInfo) {
    let flag = if f.magic_ok { "" } else { "  BAD MAGIC" };
    let _ = writeln!(
        out,
        "  {:>8}  {:>12}  {:>22}  {:>10}{flag}",
        f.frame_index, f.offset, f.timestamp_ns, f.payload_size
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::PixelFormat;
    use sraw::SrawWriter;
    use std::fs::File;
    use std::io::BufWriter;

    fn write(dir: &Path, frames: u64) -> PathBuf {
        let path = dir.join("cam7_000000.raw");
        let mut w = SrawWriter::new(BufWriter::new(File::create(&path).unwrap()));
        w.write_file_header(&FileHeader::new("7", 500, 2, 2, PixelFormat::BayerGr8))
            .unwrap();
        for i in 0..frames {
            w.write_frame(&[0; 4], i, 500 + i as i64).unwrap();
        }
        w.into_inner().unwrap();
        path
    }

    #[test]
    fn test_short_file_listed_in_full() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dump_raw_file(&write(dir.path(), 3)).unwrap();
        assert_eq!(dump.frames.len(), 3);
        assert_eq!(dump.file_size, 40 + 3 * 28);
        let text = dump.render(false);
        assert!(text.contains("camera_serial:      7"));
        assert!(text.contains("BayerGR8 (0)"));
        assert!(!text.contains("omitted"));
    }

    #[test]
    fn test_long_file_elided_unless_all() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dump_raw_file(&write(dir.path(), 25)).unwrap();

        let text = dump.render(false);
        assert!(text.contains("(5 frames omitted)"));
        assert!(!text.contains(" 512 "));

        let text = dump.render(true);
        assert!(!text.contains("omitted"));
        assert_eq!(text.lines().filter(|l| l.contains("  500")).count(), 1);
    }

    #[test]
    fn test_truncated_file_keeps_complete_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), 4);
        let len = std::fs::metadata(&path).unwrap().len();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(len - 20)
            .unwrap();

        let dump = dump_raw_file(&path).unwrap();
        assert_eq!(dump.frames.len(), 3);
        assert!(dump.error.as_deref().unwrap().contains("truncated frame header"));
    }
}
