//! Session directory discovery
//!
//! Groups the files of a finished session by device serial using the
//! recording file names (`cam{serial}_{first:06}.raw`, `cam{serial}.csv`,
//! `cam{serial}.mp4`). Anything else in the directory is ignored.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sraw::{parse_metadata_log_name, parse_raw_file_name, transcoded_file_name};
use tracing::debug;

use crate::error::{Result, ValidationError};

/// Files belonging to one device
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceFiles {
    pub serial: String,
    /// Split files ordered by their first frame index
    pub raw_files: Vec<PathBuf>,
    pub metadata_log: Option<PathBuf>,
    pub transcoded: Option<PathBuf>,
}

impl DeviceFiles {
    fn new(serial: &str) -> Self {
        Self {
            serial: serial.to_string(),
            ..Default::default()
        }
    }
}

/// All recognised files of a session directory
#[derive(Debug, Clone, Serialize)]
pub struct SessionFiles {
    pub dir: PathBuf,
    pub devices: BTreeMap<String, DeviceFiles>,
}

impl SessionFiles {
    pub fn device(&self, serial: &str) -> Option<&DeviceFiles> {
        self.devices.get(serial)
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Scan `dir` (non-recursive)
pub fn discover(dir: &Path) -> Result<SessionFiles> {
    if !dir.is_dir() {
        return Err(ValidationError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let mut raw: BTreeMap<String, Vec<(u64, PathBuf)>> = BTreeMap::new();
    let mut devices: BTreeMap<String, DeviceFiles> = BTreeMap::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };

        if let Some((serial, first)) = parse_raw_file_name(name) {
            raw.entry(serial).or_default().push((first, entry.path()));
        } else if let Some(serial) = parse_metadata_log_name(name) {
            devices
                .entry(serial.clone())
                .or_insert_with(|| DeviceFiles::new(&serial))
                .metadata_log = Some(entry.path());
        } else if let Some(serial) = name
            .strip_prefix("cam")
            .and_then(|rest| rest.strip_suffix(".mp4"))
            .filter(|serial| name == transcoded_file_name(serial))
        {
            devices
                .entry(serial.to_string())
                .or_insert_with(|| DeviceFiles::new(serial))
                .transcoded = Some(entry.path());
        }
    }

    for (serial, mut files) in raw {
        files.sort();
        devices
            .entry(serial.clone())
            .or_insert_with(|| DeviceFiles::new(&serial))
            .raw_files = files.into_iter().map(|(_, path)| path).collect();
    }

    debug!(dir = %dir.display(), devices = devices.len(), "session files discovered");
    Ok(SessionFiles {
        dir: dir.to_path_buf(),
        devices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_groups_by_serial_and_orders_splits() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "camA_002000.raw",
            "camA_000000.raw",
            "camA_001000.raw",
            "camA.csv",
            "camB_000000.raw",
            "camC.mp4",
            "camC.csv",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("camD_000000.raw")).unwrap();

        let session = discover(dir.path()).unwrap();
        assert_eq!(
            session.devices.keys().collect::<Vec<_>>(),
            vec!["A", "B", "C"]
        );

        let a = session.device("A").unwrap();
        let names: Vec<_> = a
            .raw_files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["camA_000000.raw", "camA_001000.raw", "camA_002000.raw"]
        );
        assert!(a.metadata_log.is_some());

        let b = session.device("B").unwrap();
        assert!(b.metadata_log.is_none());

        let c = session.device("C").unwrap();
        assert!(c.raw_files.is_empty());
        assert!(c.transcoded.is_some());
    }

    #[test]
    fn test_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            discover(&missing),
            Err(ValidationError::NotADirectory { .. })
        ));
    }
}
