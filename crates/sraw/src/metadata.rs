//! Per-device metadata log
//!
//! Plain text, one header row then `frame_number,device_timestamp_ns`
//! rows. Frame numbers are zero padded to five digits.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::{Result, SrawError};

pub const METADATA_LOG_HEADER: &str = "frame_number,device_timestamp_ns";

/// One metadata log row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataLogEntry {
    /// Device frame number as written (e.g. `"00042"`)
    pub frame_number: String,
    pub timestamp_ns: i64,
}

impl MetadataLogEntry {
    /// Numeric frame number, if the field is numeric
    pub fn frame_number_value(&self) -> Option<u64> {
        self.frame_number.parse().ok()
    }
}

/// Buffered metadata log writer
///
/// Rows are buffered and pushed to the underlying writer every
/// `flush_every` rows and on `finish`.
pub struct MetadataLogWriter<W: Write> {
    inner: W,
    pending: String,
    pending_rows: usize,
    flush_every: usize,
    rows: u64,
}

impl<W: Write> MetadataLogWriter<W> {
    pub fn new(mut inner: W, flush_every: usize) -> Result<Self> {
        writeln!(inner, "{METADATA_LOG_HEADER}")?;
        Ok(Self {
            inner,
            pending: String::new(),
            pending_rows: 0,
            flush_every: flush_every.max(1),
            rows: 0,
        })
    }

    pub fn append(&mut self, frame_number: u64, timestamp_ns: i64) -> Result<()> {
        self.pending
            .push_str(&format!("{frame_number:05},{timestamp_ns}\n"));
        self.pending_rows += 1;
        self.rows += 1;
        if self.pending_rows >= self.flush_every {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            self.inner.write_all(self.pending.as_bytes())?;
            self.pending.clear();
            self.pending_rows = 0;
        }
        self.inner.flush()?;
        Ok(())
    }

    /// Flush remaining rows; the writer stays usable
    pub fn finish(&mut self) -> Result<()> {
        self.flush()
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.inner)
    }
}

pub fn create_metadata_log(
    path: &Path,
    flush_every: usize,
) -> Result<MetadataLogWriter<BufWriter<File>>> {
    MetadataLogWriter::new(BufWriter::new(File::create(path)?), flush_every)
}

/// Read all rows; the header row and rows with fewer than two columns are
/// skipped.
pub fn read_metadata_log(path: &Path) -> Result<Vec<MetadataLogEntry>> {
    let content = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || (idx == 0 && line.starts_with("frame_number")) {
            continue;
        }
        let mut cols = line.split(',');
        let (Some(frame), Some(ts)) = (cols.next(), cols.next()) else {
            continue;
        };
        let timestamp_ns = ts.trim().parse().map_err(|e| SrawError::MalformedLogRow {
            path: path.to_path_buf(),
            line: idx + 1,
            message: format!("bad timestamp {ts:?}: {e}"),
        })?;
        entries.push(MetadataLogEntry {
            frame_number: frame.trim().to_string(),
            timestamp_ns,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_buffered_until_threshold() {
        let mut log = MetadataLogWriter::new(Vec::new(), 3).unwrap();
        log.append(1, 100).unwrap();
        log.append(2, 200).unwrap();
        assert_eq!(log.inner, format!("{METADATA_LOG_HEADER}\n").into_bytes());
        log.append(3, 300).unwrap();
        let text = String::from_utf8(log.into_inner().unwrap()).unwrap();
        assert_eq!(
            text,
            "frame_number,device_timestamp_ns\n00001,100\n00002,200\n00003,300\n"
        );
    }

    #[test]
    fn test_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cam1.csv");
        let mut log = create_metadata_log(&path, 10).unwrap();
        for i in 0..25 {
            log.append(i, 1_000 + i as i64).unwrap();
        }
        log.finish().unwrap();
        drop(log);

        let rows = read_metadata_log(&path).unwrap();
        assert_eq!(rows.len(), 25);
        assert_eq!(rows[7].frame_number, "00007");
        assert_eq!(rows[7].frame_number_value(), Some(7));
        assert_eq!(rows[24].timestamp_ns, 1_024);
    }

    #[test]
    fn test_short_rows_skipped_bad_timestamp_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cam2.csv");
        std::fs::write(&path, "frame_number,device_timestamp_ns\n00001\n00002,5\n").unwrap();
        assert_eq!(read_metadata_log(&path).unwrap().len(), 1);

        std::fs::write(&path, "frame_number,device_timestamp_ns\n00001,abc\n").unwrap();
        assert!(matches!(
            read_metadata_log(&path),
            Err(SrawError::MalformedLogRow { line: 2, .. })
        ));
    }
}
