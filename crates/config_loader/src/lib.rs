//! # Config Loader
//!
//! Session configuration loading.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Apply command-line overrides
//! - Generate `SessionBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("session.toml")).unwrap();
//! println!("devices: {}", blueprint.devices.len());
//! ```

mod parser;
mod validator;

pub use contracts::SessionBlueprint;
pub use parser::ConfigFormat;

use contracts::{ContractError, OutputFormat};
use std::path::{Path, PathBuf};

/// Values that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct SessionOverrides {
    pub duration_s: Option<f64>,
    pub start_delay_s: Option<f64>,
    pub output_format: Option<OutputFormat>,
    pub output_dir: Option<PathBuf>,
}

impl SessionOverrides {
    pub fn is_empty(&self) -> bool {
        self.duration_s.is_none()
            && self.start_delay_s.is_none()
            && self.output_format.is_none()
            && self.output_dir.is_none()
    }
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Detects format from the file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<SessionBlueprint, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<SessionBlueprint, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Apply overrides and re-validate
    pub fn apply_overrides(
        mut blueprint: SessionBlueprint,
        overrides: &SessionOverrides,
    ) -> Result<SessionBlueprint, ContractError> {
        if let Some(duration) = overrides.duration_s {
            blueprint.session.duration_s = duration;
        }
        if let Some(delay) = overrides.start_delay_s {
            blueprint.session.start_delay_s = delay;
        }
        if let Some(format) = overrides.output_format {
            blueprint.session.output_format = format;
        }
        if let Some(dir) = &overrides.output_dir {
            blueprint.session.output_dir = dir.clone();
        }
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Serialize SessionBlueprint to TOML string
    pub fn to_toml(blueprint: &SessionBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize SessionBlueprint to JSON string
    pub fn to_json(blueprint: &SessionBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<SessionBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }
}
