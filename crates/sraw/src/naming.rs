//! Recording file names
//!
//! - raw:        `cam{serial}_{first_frame:06}.raw`
//! - metadata:   `cam{serial}.csv`
//! - transcoded: `cam{serial}.mp4`

const PREFIX: &str = "cam";

pub fn raw_file_name(serial: &str, first_frame: u64) -> String {
    format!("{PREFIX}{serial}_{first_frame:06}.raw")
}

pub fn metadata_log_name(serial: &str) -> String {
    format!("{PREFIX}{serial}.csv")
}

pub fn transcoded_file_name(serial: &str) -> String {
    format!("{PREFIX}{serial}.mp4")
}

/// `(serial, first_frame)` of a raw file name
pub fn parse_raw_file_name(name: &str) -> Option<(String, u64)> {
    let stem = name.strip_prefix(PREFIX)?.strip_suffix(".raw")?;
    let (serial, first) = stem.rsplit_once('_')?;
    if serial.is_empty() || first.is_empty() || !first.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((serial.to_string(), first.parse().ok()?))
}

/// Serial of a metadata log file name
pub fn parse_metadata_log_name(name: &str) -> Option<String> {
    let serial = name.strip_prefix(PREFIX)?.strip_suffix(".csv")?;
    if serial.is_empty() {
        return None;
    }
    Some(serial.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_name_padding() {
        assert_eq!(raw_file_name("40123456", 0), "cam40123456_000000.raw");
        assert_eq!(raw_file_name("40123456", 2000), "cam40123456_002000.raw");
        assert_eq!(raw_file_name("1", 1_234_567), "cam1_1234567.raw");
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(
            parse_raw_file_name("cam40123456_001000.raw"),
            Some(("40123456".to_string(), 1000))
        );
        assert_eq!(parse_raw_file_name("cam40123456.raw"), None);
        assert_eq!(parse_raw_file_name("cam_000001.raw"), None);
        assert_eq!(parse_raw_file_name("cam1_00a.raw"), None);
        assert_eq!(parse_metadata_log_name("cam40123456.csv"), Some("40123456".into()));
        assert_eq!(parse_metadata_log_name("notes.csv"), None);
    }
}
