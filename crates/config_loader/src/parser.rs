//! Config parsing
//!
//! TOML is the primary format, JSON is accepted as well.

use contracts::{ContractError, SessionBlueprint};

/// Config file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Infer format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn parse_toml(content: &str) -> Result<SessionBlueprint, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse_json(content: &str) -> Result<SessionBlueprint, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse(content: &str, format: ConfigFormat) -> Result<SessionBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{OutputFormat, PixelFormat, SyncRole};

    #[test]
    fn test_parse_toml_defaults() {
        let content = r#"
[session]
start_delay_s = 5.0
duration_s = 10.0

[[devices]]
serial = "40123456"
width = 1920
height = 1080
acquisition_fps = 30.0
trigger_interval_fps = 30.0
"#;
        let bp = parse_toml(content).unwrap();
        assert_eq!(bp.session.output_format, OutputFormat::Raw);
        assert_eq!(bp.session.frames_per_file, 1000);
        assert_eq!(bp.session.queue_capacity, 500);
        assert_eq!(bp.session.expected_role, SyncRole::Follower);
        assert_eq!(bp.devices[0].pixel_format, PixelFormat::BayerGr8);
        assert_eq!(bp.transcoder.program, "ffmpeg");
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "session": { "start_delay_s": 2.0, "duration_s": 1.0, "output_format": "transcoded" },
            "devices": [{
                "serial": "1", "width": 64, "height": 48,
                "pixel_format": "bgr8",
                "acquisition_fps": 60.0, "trigger_interval_fps": 30.0
            }]
        }"#;
        let bp = parse_json(content).unwrap();
        assert_eq!(bp.session.output_format, OutputFormat::Transcoded);
        assert_eq!(bp.devices[0].pixel_format, PixelFormat::Bgr8);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let err = parse_toml("invalid toml [[[").unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
