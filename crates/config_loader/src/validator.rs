//! Config validation
//!
//! Field-level rules are declared on the blueprint types (`validator`
//! derive). Cross-field rules live here:
//! - device serials unique and ASCII
//! - timing values finite
//! - trigger rate not above the acquisition rate
//! - transcoder program set when transcoding

use std::collections::HashSet;

use contracts::{ContractError, OutputFormat, SessionBlueprint};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// Validate a SessionBlueprint
///
/// Returns the first violation found.
pub fn validate(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    validate_fields(blueprint)?;
    validate_serials(blueprint)?;
    validate_timing(blueprint)?;
    validate_rates(blueprint)?;
    validate_transcoder(blueprint)?;
    Ok(())
}

fn validate_fields(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    match blueprint.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let (field, message) = first_violation("", &errors)
                .unwrap_or_else(|| ("blueprint".to_string(), errors.to_string()));
            Err(ContractError::config_validation(field, message))
        }
    }
}

/// Walk nested validation errors in a stable order
fn first_violation(prefix: &str, errors: &ValidationErrors) -> Option<(String, String)> {
    let mut entries: Vec<_> = errors.errors().iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    for (field, kind) in entries {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(errs) => {
                if let Some(e) = errs.first() {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    return Some((path, message));
                }
            }
            ValidationErrorsKind::Struct(inner) => {
                if let Some(found) = first_violation(&path, inner) {
                    return Some(found);
                }
            }
            ValidationErrorsKind::List(items) => {
                for (idx, inner) in items {
                    if let Some(found) = first_violation(&format!("{path}[{idx}]"), inner) {
                        return Some(found);
                    }
                }
            }
        }
    }
    None
}

fn validate_serials(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for device in &blueprint.devices {
        if !device.serial.is_ascii() {
            return Err(ContractError::config_validation(
                format!("devices[serial={}]", device.serial),
                "serial must be ASCII",
            ));
        }
        if !seen.insert(&device.serial) {
            return Err(ContractError::config_validation(
                format!("devices[serial={}]", device.serial),
                "duplicate serial",
            ));
        }
    }
    Ok(())
}

fn validate_timing(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    let s = &blueprint.session;
    let fields = [
        ("session.start_delay_s", s.start_delay_s),
        ("session.duration_s", s.duration_s),
        ("session.role_timeout_s", s.role_timeout_s),
        ("session.role_poll_interval_s", s.role_poll_interval_s),
    ];
    for (field, value) in fields {
        if !value.is_finite() || value <= 0.0 {
            return Err(ContractError::config_validation(
                field,
                format!("must be a finite value > 0, got {value}"),
            ));
        }
    }
    Ok(())
}

fn validate_rates(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    for device in &blueprint.devices {
        let field = format!("devices[serial={}]", device.serial);
        if !device.acquisition_fps.is_finite() || !device.trigger_interval_fps.is_finite() {
            return Err(ContractError::config_validation(field, "frame rates must be finite"));
        }
        if device.trigger_interval_fps > device.acquisition_fps {
            return Err(ContractError::config_validation(
                field,
                format!(
                    "trigger_interval_fps ({}) exceeds acquisition_fps ({})",
                    device.trigger_interval_fps, device.acquisition_fps
                ),
            ));
        }
    }
    Ok(())
}

fn validate_transcoder(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    if blueprint.session.output_format != OutputFormat::Transcoded {
        return Ok(());
    }
    if blueprint.transcoder.program.trim().is_empty() {
        return Err(ContractError::config_validation(
            "transcoder.program",
            "required when output_format = \"transcoded\"",
        ));
    }
    if !blueprint.transcoder.close_timeout_s.is_finite() || blueprint.transcoder.close_timeout_s < 0.0
    {
        return Err(ContractError::config_validation(
            "transcoder.close_timeout_s",
            "must be a finite value >= 0",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        ConfigVersion, DeviceConfig, PixelFormat, SessionConfig, SyncRole, TranscoderConfig,
    };
    use std::path::PathBuf;

    fn device(serial: &str) -> DeviceConfig {
        DeviceConfig {
            serial: serial.into(),
            width: 64,
            height: 48,
            pixel_format: PixelFormat::BayerGr8,
            acquisition_fps: 30.0,
            trigger_interval_fps: 30.0,
        }
    }

    fn minimal_blueprint() -> SessionBlueprint {
        SessionBlueprint {
            version: ConfigVersion::V1,
            session: SessionConfig {
                output_dir: PathBuf::from("captures"),
                start_delay_s: 5.0,
                duration_s: 10.0,
                output_format: OutputFormat::Raw,
                frames_per_file: 1000,
                queue_capacity: 500,
                expected_role: SyncRole::Follower,
                role_timeout_s: 30.0,
                role_poll_interval_s: 1.0,
                metadata_flush_every: 10,
                sink_flush_every: 30,
            },
            transcoder: TranscoderConfig::default(),
            devices: vec![device("111"), device("222")],
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&minimal_blueprint()).is_ok());
    }

    #[test]
    fn test_duplicate_serial() {
        let mut bp = minimal_blueprint();
        bp.devices[1].serial = "111".into();
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("duplicate serial"));
    }

    #[test]
    fn test_no_devices() {
        let mut bp = minimal_blueprint();
        bp.devices.clear();
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("devices"), "{err}");
    }

    #[test]
    fn test_nested_field_path() {
        let mut bp = minimal_blueprint();
        bp.devices[1].acquisition_fps = 0.0;
        match validate(&bp).unwrap_err() {
            ContractError::ConfigValidation { field, .. } => {
                assert_eq!(field, "devices[1].acquisition_fps");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_positive_delay() {
        let mut bp = minimal_blueprint();
        bp.session.start_delay_s = 0.0;
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_nan_duration() {
        let mut bp = minimal_blueprint();
        bp.session.duration_s = f64::NAN;
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_trigger_above_acquisition() {
        let mut bp = minimal_blueprint();
        bp.devices[0].trigger_interval_fps = 60.0;
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("exceeds acquisition_fps"));
    }

    #[test]
    fn test_transcoder_program_required() {
        let mut bp = minimal_blueprint();
        bp.session.output_format = OutputFormat::Transcoded;
        bp.transcoder.program = "  ".into();
        assert!(validate(&bp).is_err());
    }
}
